//! Card list pane.
//!
//! Shows placeholder cards while the skeleton phase is up and the list is
//! still empty, then one card per event in list order. Cards are diffed
//! against the list rather than rebuilt, so staggered arrivals animate in
//! without disturbing the ones already shown.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use gtk::prelude::*;
use gtk::{glib, Label, Orientation, ScrolledWindow};

use crate::data::{EventItem, LoadPhase};
use crate::state::Session;

const SKELETON_COUNT: usize = 4;

/// Per-card reveal delay step for a batch arriving at once.
const REVEAL_STEP_MS: u64 = 60;

pub struct ListView {
    pub widget: ScrolledWindow,
    list: gtk::Box,
    session: Rc<Session>,
    cards: RefCell<HashMap<String, gtk::Box>>,
    skeletons: RefCell<Vec<gtk::Box>>,
    on_open: Box<dyn Fn(&EventItem)>,
}

impl ListView {
    pub fn new(session: Rc<Session>, on_open: impl Fn(&EventItem) + 'static) -> Rc<Self> {
        let list = gtk::Box::builder()
            .orientation(Orientation::Vertical)
            .spacing(12)
            .margin_top(12)
            .margin_bottom(12)
            .margin_start(12)
            .margin_end(12)
            .build();

        let widget = ScrolledWindow::builder()
            .hscrollbar_policy(gtk::PolicyType::Never)
            .vexpand(true)
            .hexpand(true)
            .build();
        widget.set_child(Some(&list));

        let view = Rc::new(Self {
            widget,
            list,
            session,
            cards: RefCell::new(HashMap::new()),
            skeletons: RefCell::new(Vec::new()),
            on_open: Box::new(on_open),
        });
        view.wire_observers();
        view
    }

    fn wire_observers(self: &Rc<Self>) {
        let for_events = self.clone();
        self.session
            .observe_events(move |events| for_events.sync(events));

        let for_phase = self.clone();
        self.session.observe_phase(move |phase| {
            if phase == LoadPhase::Skeleton && for_phase.session.events_is_empty() {
                for_phase.show_skeletons();
            }
        });

        let for_selection = self.clone();
        self.session.observe_selection(move |event| {
            for_selection.set_active(&event.id);
            for_selection.scroll_to(&event.id);
        });
    }

    /// Diff cards against the current list: stale removed, missing
    /// appended in order. Appends only ever happen at the tail, so
    /// widget order tracks list order.
    fn sync(self: &Rc<Self>, events: &[EventItem]) {
        if !events.is_empty() {
            self.clear_skeletons();
        }

        let mut cards = self.cards.borrow_mut();
        let live: HashSet<&str> = events.iter().map(|e| e.id.as_str()).collect();
        cards.retain(|id, card| {
            let keep = live.contains(id.as_str());
            if !keep {
                self.list.remove(card);
            }
            keep
        });

        let selected = self.session.selected();
        let mut appended = 0u64;
        for event in events {
            if cards.contains_key(&event.id) {
                continue;
            }
            let card = self.create_card(event, appended * REVEAL_STEP_MS);
            if selected.as_deref() == Some(event.id.as_str()) {
                card.add_css_class("card-active");
            }
            self.list.append(&card);
            cards.insert(event.id.clone(), card);
            appended += 1;
        }
    }

    fn show_skeletons(&self) {
        let mut skeletons = self.skeletons.borrow_mut();
        if !skeletons.is_empty() {
            return;
        }
        for _ in 0..SKELETON_COUNT {
            let card = create_skeleton_card();
            self.list.append(&card);
            skeletons.push(card);
        }
    }

    fn clear_skeletons(&self) {
        for card in self.skeletons.borrow_mut().drain(..) {
            self.list.remove(&card);
        }
    }

    fn set_active(&self, id: &str) {
        for (card_id, card) in self.cards.borrow().iter() {
            if card_id == id {
                card.add_css_class("card-active");
            } else {
                card.remove_css_class("card-active");
            }
        }
    }

    /// Bring the selected card to the middle of the viewport.
    fn scroll_to(&self, id: &str) {
        let cards = self.cards.borrow();
        let Some(card) = cards.get(id) else {
            return;
        };
        let alloc = card.allocation();
        let adjustment = self.widget.vadjustment();
        let target =
            f64::from(alloc.y()) - (adjustment.page_size() - f64::from(alloc.height())) / 2.0;
        let max = (adjustment.upper() - adjustment.page_size()).max(adjustment.lower());
        adjustment.set_value(target.clamp(adjustment.lower(), max));
    }

    fn create_card(self: &Rc<Self>, event: &EventItem, reveal_delay_ms: u64) -> gtk::Box {
        let card = gtk::Box::builder()
            .orientation(Orientation::Vertical)
            .spacing(0)
            .build();
        card.add_css_class("event-card");
        card.add_css_class("activatable");

        // Image header with rating and category badges overlaid.
        let overlay = gtk::Overlay::new();

        let picture = gtk::Picture::builder()
            .height_request(160)
            .hexpand(true)
            .can_shrink(true)
            .content_fit(gtk::ContentFit::Cover)
            .build();
        picture.add_css_class("card-image");
        overlay.set_child(Some(&picture));
        load_image(&picture, event.image_url.clone());

        let rating = Label::builder()
            .label(format!("★ {:.1}", event.rating))
            .halign(gtk::Align::End)
            .valign(gtk::Align::Start)
            .margin_top(10)
            .margin_end(10)
            .build();
        rating.add_css_class("badge");
        rating.add_css_class("badge-rating");
        overlay.add_overlay(&rating);

        if !event.category().is_empty() {
            let category = Label::builder()
                .label(event.category())
                .halign(gtk::Align::Start)
                .valign(gtk::Align::End)
                .margin_bottom(10)
                .margin_start(10)
                .build();
            category.add_css_class("badge");
            category.add_css_class("badge-category");
            overlay.add_overlay(&category);
        }

        card.append(&overlay);

        let content = gtk::Box::builder()
            .orientation(Orientation::Vertical)
            .spacing(6)
            .margin_top(10)
            .margin_bottom(12)
            .margin_start(12)
            .margin_end(12)
            .build();

        let title = Label::builder()
            .label(&event.title)
            .wrap(true)
            .wrap_mode(gtk::pango::WrapMode::Word)
            .xalign(0.0)
            .lines(2)
            .ellipsize(gtk::pango::EllipsizeMode::End)
            .build();
        title.add_css_class("card-title");
        content.append(&title);

        let description = Label::builder()
            .label(&event.description)
            .wrap(true)
            .wrap_mode(gtk::pango::WrapMode::Word)
            .xalign(0.0)
            .lines(2)
            .ellipsize(gtk::pango::EllipsizeMode::End)
            .build();
        description.add_css_class("card-description");
        content.append(&description);

        let footer = Label::builder()
            .label(format!("{} • {}", event.distance, event.location_name))
            .xalign(0.0)
            .ellipsize(gtk::pango::EllipsizeMode::End)
            .build();
        footer.add_css_class("card-footer");
        content.append(&footer);

        card.append(&content);

        // A card click both moves the selection and opens the story.
        let view = self.clone();
        let clicked = event.clone();
        let gesture = gtk::GestureClick::new();
        gesture.connect_released(move |_, _, _, _| {
            view.session.select(&clicked.id);
            (view.on_open)(&clicked);
        });
        card.add_controller(gesture);

        // Index-proportional reveal.
        card.add_css_class("card-hidden");
        let revealing = card.clone();
        glib::timeout_add_local_once(
            std::time::Duration::from_millis(reveal_delay_ms),
            move || {
                revealing.remove_css_class("card-hidden");
            },
        );

        card
    }
}

fn create_skeleton_card() -> gtk::Box {
    let card = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(8)
        .build();
    card.add_css_class("event-card");
    card.add_css_class("skeleton-card");

    let image = gtk::Box::builder().height_request(160).build();
    image.add_css_class("skeleton-block");
    card.append(&image);

    for width in [220, 280, 140] {
        let line = gtk::Box::builder()
            .height_request(14)
            .width_request(width)
            .margin_start(12)
            .halign(gtk::Align::Start)
            .build();
        line.add_css_class("skeleton-block");
        card.append(&line);
    }

    card
}

/// Fetch the card image off the main loop and swap it in when it lands.
/// A failed load just leaves the placeholder background.
fn load_image(picture: &gtk::Picture, url: String) {
    let picture = picture.clone();
    glib::spawn_future_local(async move {
        match reqwest::get(&url).await {
            Ok(response) => {
                if let Ok(bytes) = response.bytes().await {
                    let bytes = glib::Bytes::from(&bytes.to_vec());
                    match gdk::Texture::from_bytes(&bytes) {
                        Ok(texture) => picture.set_paintable(Some(&texture)),
                        Err(e) => tracing::debug!("undisplayable image {url}: {e}"),
                    }
                }
            }
            Err(e) => tracing::debug!("failed to load image {url}: {e}"),
        }
    });
}
