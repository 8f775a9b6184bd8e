//! Load orchestration.
//!
//! Drives the session through its lifecycle: resolve location, fetch
//! events, show the skeleton if the first load runs long, retry in the
//! background while the skeleton is up, and reveal arriving events one
//! at a time. All timers are owned here and removed on teardown so no
//! callback outlives the session.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use gtk::glib;

use crate::data::{EventItem, LoadPhase};
use crate::events::EventSource;
use crate::geo::GeoResolver;
use crate::state::Session;

/// The skeleton appears if the initial load is still pending after this.
const SKELETON_DEADLINE: Duration = Duration::from_secs(2);

/// Background retry cadence and cap while the skeleton is showing.
const RETRY_INTERVAL: Duration = Duration::from_secs(3);
const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Gap between staggered insertions.
const STAGGER_DELAY: Duration = Duration::from_millis(200);

pub struct LoadController {
    session: Rc<Session>,
    geo: GeoResolver,
    source: Rc<EventSource>,
    deadline: Rc<RefCell<Option<glib::SourceId>>>,
    retry: Rc<RefCell<Option<glib::SourceId>>>,
    stagger: Rc<RefCell<Option<glib::SourceId>>>,
    retry_in_flight: Rc<Cell<bool>>,
}

impl LoadController {
    pub fn new(session: Rc<Session>, source: Rc<EventSource>) -> Rc<Self> {
        Rc::new(Self {
            session,
            geo: GeoResolver::new(),
            source,
            deadline: Rc::new(RefCell::new(None)),
            retry: Rc::new(RefCell::new(None)),
            stagger: Rc::new(RefCell::new(None)),
            retry_in_flight: Rc::new(Cell::new(false)),
        })
    }

    /// Begin a load. Also serves the manual retry: the whole session
    /// state is reset and both collaborators run again.
    pub fn start(self: &Rc<Self>) {
        self.cancel_timers();
        self.retry_in_flight.set(false);
        self.session.reset_for_load();
        self.arm_deadline();

        let ctrl = self.clone();
        glib::spawn_future_local(async move {
            // Location strictly precedes the first fetch.
            let location = ctrl.geo.resolve().await;
            ctrl.session.set_location(location.clone());

            // The deadline may already have fired during the lookup; the
            // retry loop was waiting on a location.
            if ctrl.session.phase() == LoadPhase::Skeleton {
                ctrl.ensure_background_retry();
            }

            let events = ctrl.source.fetch(&location).await;
            ctrl.on_initial_result(events);
        });
    }

    /// Drop every pending timer. Call on window close; state mutated
    /// after this point would belong to a dead view.
    pub fn teardown(&self) {
        self.cancel_timers();
    }

    fn cancel_timers(&self) {
        for slot in [&self.deadline, &self.retry, &self.stagger] {
            if let Some(id) = slot.borrow_mut().take() {
                id.remove();
            }
        }
    }

    fn arm_deadline(self: &Rc<Self>) {
        let ctrl = self.clone();
        let slot = self.deadline.clone();
        let id = glib::timeout_add_local_once(SKELETON_DEADLINE, move || {
            slot.borrow_mut().take();
            ctrl.on_deadline();
        });
        *self.deadline.borrow_mut() = Some(id);
    }

    fn cancel_deadline(&self) {
        if let Some(id) = self.deadline.borrow_mut().take() {
            id.remove();
        }
    }

    /// The initial load ran past the deadline. Not an error: placeholder
    /// cards go up and the in-flight work keeps going.
    fn on_deadline(self: &Rc<Self>) {
        if self.session.phase() != LoadPhase::Loading {
            return;
        }
        tracing::info!("initial load past {SKELETON_DEADLINE:?}, showing skeleton");
        self.session.set_phase(LoadPhase::Skeleton);
        self.ensure_background_retry();
    }

    fn on_initial_result(self: &Rc<Self>, events: Vec<EventItem>) {
        self.cancel_deadline();

        // A background retry may have won the race while the initial
        // fetch was still in flight; its list stays.
        if self.session.phase() == LoadPhase::Ready {
            tracing::debug!("discarding late initial result, list already populated");
            return;
        }

        if events.is_empty() {
            self.on_initial_failure("No events available");
            return;
        }

        self.stop_background_retry();
        if events[0].is_fallback() {
            tracing::info!("showing demo events (live data unavailable)");
        }
        let first = events[0].id.clone();
        self.session.replace_events(events);
        self.session.set_phase(LoadPhase::Ready);
        self.session.select(&first);
    }

    fn on_initial_failure(self: &Rc<Self>, message: &str) {
        // Phase is read *now*, not captured earlier: an error landing
        // while the skeleton is up is suppressed and the background loop
        // keeps trying.
        if !should_surface_error(self.session.phase(), self.session.events_is_empty()) {
            tracing::warn!("initial load failed, skeleton stays up: {message}");
            return;
        }
        tracing::error!("initial load failed: {message}");
        self.session.set_error(Some(message.to_string()));
        self.session.set_phase(LoadPhase::Error);
    }

    /// Start the background retry loop if it is not already running.
    /// Runs only while the skeleton is up, at most once every 3 s, at
    /// most 5 attempts, one fetch in flight at a time.
    fn ensure_background_retry(self: &Rc<Self>) {
        if self.retry.borrow().is_some() {
            return;
        }
        let Some(location) = self.session.location() else {
            return;
        };

        let ctrl = self.clone();
        let slot = self.retry.clone();
        let attempts = Cell::new(0u32);
        let id = glib::timeout_add_local(RETRY_INTERVAL, move || {
            if ctrl.session.phase() != LoadPhase::Skeleton {
                slot.borrow_mut().take();
                return glib::ControlFlow::Break;
            }
            if ctrl.retry_in_flight.get() {
                return glib::ControlFlow::Continue;
            }

            let attempt = attempts.get() + 1;
            attempts.set(attempt);
            tracing::info!("background retry {attempt}/{MAX_RETRY_ATTEMPTS}");

            ctrl.retry_in_flight.set(true);
            let fetcher = ctrl.clone();
            let location = location.clone();
            glib::spawn_future_local(async move {
                let events = fetcher.source.fetch(&location).await;
                fetcher.retry_in_flight.set(false);
                if events.is_empty() {
                    tracing::warn!("background retry produced no events");
                } else {
                    fetcher.on_background_success(events);
                }
            });

            if attempt >= MAX_RETRY_ATTEMPTS {
                tracing::info!("background retry limit reached");
                slot.borrow_mut().take();
                glib::ControlFlow::Break
            } else {
                glib::ControlFlow::Continue
            }
        });
        *self.retry.borrow_mut() = Some(id);
    }

    fn stop_background_retry(&self) {
        if let Some(id) = self.retry.borrow_mut().take() {
            id.remove();
        }
    }

    /// A background fetch came back with data: clear the skeleton and
    /// reveal the list one event at a time.
    fn on_background_success(self: &Rc<Self>, events: Vec<EventItem>) {
        if self.session.phase() != LoadPhase::Skeleton {
            return;
        }
        self.stop_background_retry();
        let first_population = self.session.events_is_empty();
        self.session.set_phase(LoadPhase::Ready);
        self.reveal_staggered(events, first_population);
    }

    fn reveal_staggered(self: &Rc<Self>, events: Vec<EventItem>, first_population: bool) {
        if let Some(id) = self.stagger.borrow_mut().take() {
            id.remove();
        }
        let pending = Rc::new(RefCell::new(VecDeque::from(events)));
        let inserted = Rc::new(Cell::new(0usize));

        // First insertion lands immediately; the rest follow on the timer.
        if !reveal_step(
            &self.session,
            &mut pending.borrow_mut(),
            first_population,
            &inserted,
        ) {
            return;
        }

        let ctrl = self.clone();
        let slot = self.stagger.clone();
        let id = glib::timeout_add_local(STAGGER_DELAY, move || {
            let more = reveal_step(
                &ctrl.session,
                &mut pending.borrow_mut(),
                first_population,
                &inserted,
            );
            if more {
                glib::ControlFlow::Continue
            } else {
                slot.borrow_mut().take();
                glib::ControlFlow::Break
            }
        });
        *self.stagger.borrow_mut() = Some(id);
    }
}

/// Whether an initial-load failure becomes a visible error. Suppressed
/// once any data is shown, and while the skeleton (with its background
/// loop) is up.
fn should_surface_error(phase: LoadPhase, events_empty: bool) -> bool {
    events_empty && phase != LoadPhase::Skeleton
}

/// Append the next pending event. On the first population of an empty
/// list the second arrival (index 1) is auto-selected — checked against
/// the selection at this very moment, so a user click in the gap wins.
/// Returns whether more insertions remain.
fn reveal_step(
    session: &Rc<Session>,
    pending: &mut VecDeque<EventItem>,
    first_population: bool,
    inserted: &Cell<usize>,
) -> bool {
    let Some(event) = pending.pop_front() else {
        return false;
    };
    let id = event.id.clone();
    let index = inserted.get();
    session.append_event(event);
    inserted.set(index + 1);

    if first_population && index == 1 && session.selected().is_none() {
        session.select(&id);
    }

    !pending.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EventItem;

    fn event(id: &str) -> EventItem {
        EventItem {
            id: id.into(),
            title: format!("Event {id}"),
            description: "desc".into(),
            full_description: "full".into(),
            highlights: vec!["CITY".into()],
            latitude: 34.0,
            longitude: 33.0,
            rating: 4.2,
            distance: "Nearby".into(),
            location_name: "Venue".into(),
            image_url: "https://example.com/a.jpg".into(),
        }
    }

    fn drain_reveal(
        session: &Rc<Session>,
        events: Vec<EventItem>,
        first_population: bool,
    ) {
        let mut pending: VecDeque<EventItem> = events.into();
        let inserted = Cell::new(0usize);
        while reveal_step(session, &mut pending, first_population, &inserted) {}
    }

    #[test]
    fn test_staggered_reveal_keeps_order_and_selects_second() {
        let session = Session::new();
        let incoming: Vec<EventItem> =
            (0..6).map(|i| event(&format!("evt_{i}"))).collect();

        drain_reveal(&session, incoming, true);

        let ids: Vec<String> = session.events().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["evt_0", "evt_1", "evt_2", "evt_3", "evt_4", "evt_5"]);
        assert_eq!(session.selected().as_deref(), Some("evt_1"));
    }

    #[test]
    fn test_user_selection_beats_auto_select() {
        let session = Session::new();
        let mut pending: VecDeque<EventItem> =
            (0..4).map(|i| event(&format!("evt_{i}"))).collect();
        let inserted = Cell::new(0usize);

        // First insertion lands, then the user clicks it before the
        // second insertion fires.
        reveal_step(&session, &mut pending, true, &inserted);
        session.select("evt_0");
        while reveal_step(&session, &mut pending, true, &inserted) {}

        assert_eq!(session.selected().as_deref(), Some("evt_0"));
        assert_eq!(session.events().len(), 4);
    }

    #[test]
    fn test_no_auto_select_on_repopulation() {
        let session = Session::new();
        session.append_event(event("old"));

        drain_reveal(&session, vec![event("new_0"), event("new_1")], false);
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn test_single_event_reveal_selects_nothing() {
        // Index 1 never arrives; the list still shows the one event.
        let session = Session::new();
        drain_reveal(&session, vec![event("only")], true);
        assert_eq!(session.events().len(), 1);
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn test_error_suppressed_while_skeleton() {
        assert!(should_surface_error(LoadPhase::Loading, true));
        assert!(!should_surface_error(LoadPhase::Skeleton, true));
        // Data on screen always suppresses the error state.
        assert!(!should_surface_error(LoadPhase::Ready, false));
        assert!(!should_surface_error(LoadPhase::Loading, false));
    }
}
