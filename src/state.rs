//! Shared session state.
//!
//! One [`Session`] per app run holds the resolved location, the load
//! phase, the event list and the current selection, and notifies
//! registered observers on change. It is the single writer's view of the
//! world: every mutation happens on the main loop, and the selection is
//! the single source of truth that both the card list and the map react
//! to — observers must never write back into it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::data::{EventItem, GeoLocation, LoadPhase};

type LocationObserver = Box<dyn Fn(&GeoLocation)>;
type PhaseObserver = Box<dyn Fn(LoadPhase)>;
type EventsObserver = Box<dyn Fn(&[EventItem])>;
type SelectionObserver = Box<dyn Fn(&EventItem)>;

pub struct Session {
    location: RefCell<Option<GeoLocation>>,
    phase: Cell<LoadPhase>,
    events: RefCell<Vec<EventItem>>,
    selected: RefCell<Option<String>>,
    error: RefCell<Option<String>>,

    location_observers: RefCell<Vec<LocationObserver>>,
    phase_observers: RefCell<Vec<PhaseObserver>>,
    events_observers: RefCell<Vec<EventsObserver>>,
    selection_observers: RefCell<Vec<SelectionObserver>>,
}

impl Session {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            location: RefCell::new(None),
            phase: Cell::new(LoadPhase::Initial),
            events: RefCell::new(Vec::new()),
            selected: RefCell::new(None),
            error: RefCell::new(None),
            location_observers: RefCell::new(Vec::new()),
            phase_observers: RefCell::new(Vec::new()),
            events_observers: RefCell::new(Vec::new()),
            selection_observers: RefCell::new(Vec::new()),
        })
    }

    pub fn location(&self) -> Option<GeoLocation> {
        self.location.borrow().clone()
    }

    /// Record the resolved location. Done once per session, before the
    /// first event fetch.
    pub fn set_location(&self, location: GeoLocation) {
        *self.location.borrow_mut() = Some(location.clone());
        for observer in self.location_observers.borrow().iter() {
            observer(&location);
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase.get()
    }

    pub fn set_phase(&self, phase: LoadPhase) {
        if self.phase.get() == phase {
            return;
        }
        self.phase.set(phase);
        for observer in self.phase_observers.borrow().iter() {
            observer(phase);
        }
    }

    pub fn events(&self) -> Vec<EventItem> {
        self.events.borrow().clone()
    }

    pub fn events_is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn event_by_id(&self, id: &str) -> Option<EventItem> {
        self.events.borrow().iter().find(|e| e.id == id).cloned()
    }

    /// Replace the whole list. A selection pointing at a vanished id is
    /// cleared so it never dangles.
    pub fn replace_events(&self, events: Vec<EventItem>) {
        let stale_selection = {
            let selected = self.selected.borrow();
            match selected.as_deref() {
                Some(id) => !events.iter().any(|e| e.id == id),
                None => false,
            }
        };
        if stale_selection {
            *self.selected.borrow_mut() = None;
        }
        *self.events.borrow_mut() = events;
        self.notify_events();
    }

    /// Append a single event (staggered reveal). Appends keep insertion
    /// order; display order is list order.
    pub fn append_event(&self, event: EventItem) {
        self.events.borrow_mut().push(event);
        self.notify_events();
    }

    pub fn selected(&self) -> Option<String> {
        self.selected.borrow().clone()
    }

    /// Point the shared selection at `id`. No-ops when `id` is already
    /// selected (idempotence: no duplicate scroll or fly) or names no
    /// current event. Returns whether anything changed.
    pub fn select(&self, id: &str) -> bool {
        if self.selected.borrow().as_deref() == Some(id) {
            return false;
        }
        let Some(event) = self.event_by_id(id) else {
            tracing::debug!("ignoring selection of unknown event {id}");
            return false;
        };
        *self.selected.borrow_mut() = Some(id.to_string());
        for observer in self.selection_observers.borrow().iter() {
            observer(&event);
        }
        true
    }

    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn set_error(&self, message: Option<String>) {
        *self.error.borrow_mut() = message;
    }

    /// Reset for a fresh load (session start or manual retry).
    pub fn reset_for_load(&self) {
        *self.selected.borrow_mut() = None;
        self.events.borrow_mut().clear();
        *self.error.borrow_mut() = None;
        self.notify_events();
        self.set_phase(LoadPhase::Loading);
    }

    pub fn observe_location(&self, observer: impl Fn(&GeoLocation) + 'static) {
        self.location_observers.borrow_mut().push(Box::new(observer));
    }

    pub fn observe_phase(&self, observer: impl Fn(LoadPhase) + 'static) {
        self.phase_observers.borrow_mut().push(Box::new(observer));
    }

    pub fn observe_events(&self, observer: impl Fn(&[EventItem]) + 'static) {
        self.events_observers.borrow_mut().push(Box::new(observer));
    }

    pub fn observe_selection(&self, observer: impl Fn(&EventItem) + 'static) {
        self.selection_observers.borrow_mut().push(Box::new(observer));
    }

    fn notify_events(&self) {
        let events = self.events.borrow().clone();
        for observer in self.events_observers.borrow().iter() {
            observer(&events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> EventItem {
        EventItem {
            id: id.into(),
            title: format!("Event {id}"),
            description: "desc".into(),
            full_description: "full".into(),
            highlights: vec!["MUSIC".into()],
            latitude: 34.0,
            longitude: 33.0,
            rating: 4.0,
            distance: "1 km".into(),
            location_name: "Venue".into(),
            image_url: "https://example.com/a.jpg".into(),
        }
    }

    #[test]
    fn test_select_requires_known_id() {
        let session = Session::new();
        assert!(!session.select("ghost"));
        assert_eq!(session.selected(), None);

        session.replace_events(vec![event("a")]);
        assert!(session.select("a"));
        assert_eq!(session.selected().as_deref(), Some("a"));
    }

    #[test]
    fn test_select_is_idempotent() {
        let session = Session::new();
        session.replace_events(vec![event("a"), event("b")]);

        let fired = Rc::new(Cell::new(0u32));
        let fired_in = fired.clone();
        session.observe_selection(move |_| fired_in.set(fired_in.get() + 1));

        assert!(session.select("a"));
        assert!(!session.select("a"));
        assert!(!session.select("a"));
        assert_eq!(fired.get(), 1);

        assert!(session.select("b"));
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn test_selection_observers_both_fire_on_one_set() {
        // Scroll and fly are independent reactions to the same value.
        let session = Session::new();
        session.replace_events(vec![event("evt_3")]);

        let scrolled = Rc::new(RefCell::new(Vec::new()));
        let flown = Rc::new(RefCell::new(Vec::new()));
        let s = scrolled.clone();
        session.observe_selection(move |e| s.borrow_mut().push(e.id.clone()));
        let f = flown.clone();
        session.observe_selection(move |e| f.borrow_mut().push(e.id.clone()));

        session.select("evt_3");
        assert_eq!(*scrolled.borrow(), vec!["evt_3".to_string()]);
        assert_eq!(*flown.borrow(), vec!["evt_3".to_string()]);
    }

    #[test]
    fn test_replace_clears_dangling_selection() {
        let session = Session::new();
        session.replace_events(vec![event("a"), event("b")]);
        session.select("b");

        session.replace_events(vec![event("c")]);
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn test_replace_keeps_surviving_selection() {
        let session = Session::new();
        session.replace_events(vec![event("a"), event("b")]);
        session.select("b");

        session.replace_events(vec![event("b"), event("c")]);
        assert_eq!(session.selected().as_deref(), Some("b"));
    }

    #[test]
    fn test_append_preserves_order() {
        let session = Session::new();
        for id in ["one", "two", "three"] {
            session.append_event(event(id));
        }
        let ids: Vec<String> = session.events().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_phase_change_notifies_once() {
        let session = Session::new();
        let fired = Rc::new(Cell::new(0u32));
        let fired_in = fired.clone();
        session.observe_phase(move |_| fired_in.set(fired_in.get() + 1));

        session.set_phase(LoadPhase::Loading);
        session.set_phase(LoadPhase::Loading);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_reset_for_load() {
        let session = Session::new();
        session.replace_events(vec![event("a")]);
        session.select("a");
        session.set_error(Some("boom".into()));
        session.set_phase(LoadPhase::Error);

        session.reset_for_load();
        assert!(session.events_is_empty());
        assert_eq!(session.selected(), None);
        assert_eq!(session.error(), None);
        assert_eq!(session.phase(), LoadPhase::Loading);
    }
}
