//! Map pane.
//!
//! One marker per event, reconciled in place against the current list so
//! surviving markers keep their widget (no flicker, animations continue):
//! stale ids are removed, new ids created, the rest just restyled.
//! Marker clicks write the shared selection; centering and fly-to are
//! reactions to session changes, never to each other.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use gtk::prelude::*;
use libshumate::prelude::{LocationExt, MarkerExt};

use crate::data::{EventItem, GeoLocation};
use crate::state::Session;

const TILE_URL: &str = "https://a.basemaps.cartocdn.com/rastertiles/voyager/{z}/{x}/{y}.png";

const STREET_ZOOM: f64 = 13.0;
const FOCUS_ZOOM: f64 = 14.0;

/// Below this width the bottom of the map is covered by the card strip,
/// so fly-to aims a little south of the marker.
const NARROW_WIDTH: i32 = 768;
const NARROW_LAT_OFFSET: f64 = 0.005;

pub struct MapView {
    pub widget: libshumate::SimpleMap,
    session: Rc<Session>,
    map: Option<libshumate::Map>,
    layer: Option<libshumate::MarkerLayer>,
    markers: RefCell<HashMap<String, MarkerHandle>>,
}

struct MarkerHandle {
    marker: libshumate::Marker,
    button: gtk::Button,
    /// Pointer glyph under the dot, shown only while active.
    tail: gtk::Label,
}

impl MapView {
    pub fn new(session: Rc<Session>) -> Rc<Self> {
        let widget = libshumate::SimpleMap::new();
        let map_source = libshumate::RasterRenderer::from_url(TILE_URL);
        widget.set_map_source(Some(&map_source));
        widget.set_vexpand(true);
        widget.set_hexpand(true);

        let map = widget.map();
        let layer = map.as_ref().and_then(|map| {
            let viewport = map.viewport()?;
            viewport.set_min_zoom_level(2);
            viewport.set_max_zoom_level(19);
            let layer = libshumate::MarkerLayer::new(&viewport);
            map.add_layer(&layer);
            Some(layer)
        });

        let view = Rc::new(Self {
            widget,
            session,
            map,
            layer,
            markers: RefCell::new(HashMap::new()),
        });
        view.wire_observers();
        view
    }

    fn wire_observers(self: &Rc<Self>) {
        let for_location = self.clone();
        self.session
            .observe_location(move |location| for_location.center_on(location));

        let for_events = self.clone();
        self.session.observe_events(move |events| {
            let selected = for_events.session.selected();
            for_events.reconcile(events, selected.as_deref());
        });

        // Two independent reactions to one selection change: restyle the
        // markers, then fly. Neither writes back into the selection.
        let for_selection = self.clone();
        self.session.observe_selection(move |event| {
            for_selection.refresh_active();
            for_selection.fly_to(event);
        });
    }

    /// Initial centering on the resolved location, at street zoom.
    fn center_on(&self, location: &GeoLocation) {
        if let Some(map) = &self.map {
            map.go_to_full(location.latitude, location.longitude, STREET_ZOOM);
        }
    }

    /// Animated recenter on the selected event, a step closer.
    fn fly_to(&self, event: &EventItem) {
        let Some(map) = &self.map else {
            return;
        };
        let width = self.widget.width();
        let latitude = if width > 0 && width < NARROW_WIDTH {
            event.latitude - NARROW_LAT_OFFSET
        } else {
            event.latitude
        };
        map.go_to_full(latitude, event.longitude, FOCUS_ZOOM);
    }

    /// Diff markers against the current list.
    fn reconcile(self: &Rc<Self>, events: &[EventItem], selected: Option<&str>) {
        let Some(layer) = &self.layer else {
            return;
        };
        let mut markers = self.markers.borrow_mut();

        let live: HashSet<&str> = events.iter().map(|e| e.id.as_str()).collect();
        markers.retain(|id, handle| {
            let keep = live.contains(id.as_str());
            if !keep {
                layer.remove_marker(&handle.marker);
            }
            keep
        });

        for event in events {
            let active = selected == Some(event.id.as_str());
            match markers.get(&event.id) {
                Some(handle) => style_marker(handle, active),
                None => {
                    let handle = self.create_marker(layer, event, active);
                    markers.insert(event.id.clone(), handle);
                }
            }
        }
    }

    fn refresh_active(&self) {
        let selected = self.session.selected();
        let markers = self.markers.borrow();
        for (id, handle) in markers.iter() {
            style_marker(handle, selected.as_deref() == Some(id.as_str()));
        }
    }

    fn create_marker(
        self: &Rc<Self>,
        layer: &libshumate::MarkerLayer,
        event: &EventItem,
        active: bool,
    ) -> MarkerHandle {
        let button = gtk::Button::new();
        button.add_css_class("event-marker");

        // A marker click moves the selection only; it never opens the
        // story view.
        let session = self.session.clone();
        let id = event.id.clone();
        button.connect_clicked(move |_| {
            session.select(&id);
        });

        let tail = gtk::Label::new(Some("▾"));
        tail.add_css_class("marker-tail");
        tail.set_visible(false);

        let holder = gtk::Box::builder()
            .orientation(gtk::Orientation::Vertical)
            .halign(gtk::Align::Center)
            .build();
        holder.append(&button);
        holder.append(&tail);

        let marker = libshumate::Marker::new();
        marker.set_child(Some(&holder));
        marker.set_location(event.latitude, event.longitude);
        layer.add_marker(&marker);

        let handle = MarkerHandle { marker, button, tail };
        style_marker(&handle, active);
        handle
    }
}

fn style_marker(handle: &MarkerHandle, active: bool) {
    if active {
        handle.button.add_css_class("event-marker-active");
    } else {
        handle.button.remove_css_class("event-marker-active");
    }
    handle.tail.set_visible(active);
}
