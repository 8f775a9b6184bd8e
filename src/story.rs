//! Story-style detail view.
//!
//! A modal three-slide overlay for one event: hero, what to expect, and
//! a plan call-to-action that deep-links the full event out to the
//! companion app. Clicking the body advances, the left edge goes back,
//! advancing past the last slide closes. Opening always starts at the
//! first slide; the main window stays blocked only while the dialog
//! lives.

use std::cell::Cell;
use std::rc::Rc;

use gtk::prelude::*;
use gtk::{glib, Label, Orientation};

use crate::data::{EventItem, PLAN_BASE_URL};

const SLIDE_COUNT: usize = 3;

/// Share of the width that acts as the "go back" tap zone.
const BACK_ZONE_PX: i32 = 126;

/// Deep link carrying the full event, URL-encoded as JSON.
pub fn plan_link(event: &EventItem) -> String {
    let payload = serde_json::json!({
        "id": event.id,
        "title": event.title,
        "description": event.description,
        "fullDescription": event.full_description,
        "latitude": event.latitude,
        "longitude": event.longitude,
        "locationName": event.location_name,
        "distance": event.distance,
        "rating": event.rating,
        "highlights": event.highlights,
        "imageUrl": event.image_url,
    });
    format!("{PLAN_BASE_URL}?event={}", urlencoding::encode(&payload.to_string()))
}

/// Build and present the dialog for one event.
pub fn present(parent: &impl IsA<gtk::Window>, event: &EventItem) {
    let window = gtk::Window::builder()
        .transient_for(parent)
        .modal(true)
        .decorated(false)
        .default_width(420)
        .default_height(740)
        .build();
    window.add_css_class("story-window");

    let slide = Rc::new(Cell::new(0usize));

    let stack = gtk::Stack::builder()
        .transition_type(gtk::StackTransitionType::Crossfade)
        .transition_duration(200)
        .vexpand(true)
        .hexpand(true)
        .build();
    stack.add_named(&build_hero_slide(event), Some("0"));
    stack.add_named(&build_expect_slide(event), Some("1"));
    stack.add_named(&build_plan_slide(event), Some("2"));
    stack.set_visible_child_name("0");

    // Progress segments across the top.
    let progress = gtk::Box::builder()
        .orientation(Orientation::Horizontal)
        .spacing(6)
        .margin_top(12)
        .margin_start(12)
        .margin_end(48)
        .valign(gtk::Align::Start)
        .build();
    let mut segments = Vec::with_capacity(SLIDE_COUNT);
    for _ in 0..SLIDE_COUNT {
        let segment = gtk::Box::builder()
            .height_request(4)
            .hexpand(true)
            .build();
        segment.add_css_class("story-progress");
        progress.append(&segment);
        segments.push(segment);
    }
    let segments = Rc::new(segments);
    sync_progress(&segments, 0);

    let show_slide = {
        let stack = stack.clone();
        let segments = segments.clone();
        move |index: usize| {
            stack.set_visible_child_name(&index.to_string());
            sync_progress(&segments, index);
        }
    };

    let overlay = gtk::Overlay::new();
    overlay.set_child(Some(&stack));
    overlay.add_overlay(&progress);

    // Left-edge tap zone: one slide back. Sits under the close button.
    let back_zone = gtk::Box::builder()
        .width_request(BACK_ZONE_PX)
        .halign(gtk::Align::Start)
        .vexpand(true)
        .build();
    let back_gesture = gtk::GestureClick::new();
    {
        let slide = slide.clone();
        let show_slide = show_slide.clone();
        back_gesture.connect_released(move |gesture, _, _, _| {
            gesture.set_state(gtk::EventSequenceState::Claimed);
            if slide.get() > 0 {
                slide.set(slide.get() - 1);
                show_slide(slide.get());
            }
        });
    }
    back_zone.add_controller(back_gesture);
    overlay.add_overlay(&back_zone);

    let close = gtk::Button::builder()
        .icon_name("window-close-symbolic")
        .halign(gtk::Align::End)
        .valign(gtk::Align::Start)
        .margin_top(8)
        .margin_end(8)
        .build();
    close.add_css_class("story-close");
    {
        let window = window.clone();
        close.connect_clicked(move |_| window.close());
    }
    overlay.add_overlay(&close);

    // Anywhere else advances; past the last slide the dialog closes.
    let advance_gesture = gtk::GestureClick::new();
    {
        let window = window.clone();
        let slide = slide.clone();
        advance_gesture.connect_released(move |_, _, _, _| {
            if slide.get() + 1 < SLIDE_COUNT {
                slide.set(slide.get() + 1);
                show_slide(slide.get());
            } else {
                window.close();
            }
        });
    }
    overlay.add_controller(advance_gesture);

    let keys = gtk::EventControllerKey::new();
    {
        let window = window.clone();
        keys.connect_key_pressed(move |_, key, _, _| {
            if key == gdk::Key::Escape {
                window.close();
                glib::Propagation::Stop
            } else {
                glib::Propagation::Proceed
            }
        });
    }
    window.add_controller(keys);

    window.set_child(Some(&overlay));
    window.present();
}

fn sync_progress(segments: &[gtk::Box], current: usize) {
    for (index, segment) in segments.iter().enumerate() {
        if index <= current {
            segment.add_css_class("story-progress-filled");
        } else {
            segment.remove_css_class("story-progress-filled");
        }
    }
}

/// Slide 1: hero image, title, short description.
fn build_hero_slide(event: &EventItem) -> gtk::Widget {
    let overlay = gtk::Overlay::new();

    let picture = gtk::Picture::builder()
        .can_shrink(true)
        .content_fit(gtk::ContentFit::Cover)
        .vexpand(true)
        .hexpand(true)
        .build();
    picture.add_css_class("story-hero-image");
    load_hero_image(&picture, event.image_url.clone());
    overlay.set_child(Some(&picture));

    let caption = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(10)
        .valign(gtk::Align::End)
        .margin_start(24)
        .margin_end(24)
        .margin_bottom(48)
        .build();
    caption.add_css_class("story-caption");

    let pill = Label::builder()
        .label("Happening Today")
        .halign(gtk::Align::Start)
        .build();
    pill.add_css_class("badge");
    pill.add_css_class("badge-today");
    caption.append(&pill);

    let title = Label::builder()
        .label(&event.title)
        .wrap(true)
        .xalign(0.0)
        .build();
    title.add_css_class("story-title");
    caption.append(&title);

    let description = Label::builder()
        .label(&event.description)
        .wrap(true)
        .xalign(0.0)
        .build();
    description.add_css_class("story-description");
    caption.append(&description);

    overlay.add_overlay(&caption);
    overlay.upcast()
}

/// Slide 2: full description plus the highlights list.
fn build_expect_slide(event: &EventItem) -> gtk::Widget {
    let content = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(16)
        .margin_top(72)
        .margin_start(24)
        .margin_end(24)
        .margin_bottom(24)
        .build();
    content.add_css_class("story-sheet");

    let heading = Label::builder()
        .label("What to Expect")
        .xalign(0.0)
        .build();
    heading.add_css_class("story-heading");
    content.append(&heading);

    let body = Label::builder()
        .label(&event.full_description)
        .wrap(true)
        .xalign(0.0)
        .build();
    body.add_css_class("story-body");
    content.append(&body);

    if !event.highlights.is_empty() {
        let subheading = Label::builder()
            .label("Highlights")
            .xalign(0.0)
            .build();
        subheading.add_css_class("story-subheading");
        content.append(&subheading);

        for highlight in &event.highlights {
            let row = Label::builder()
                .label(format!("✓  {highlight}"))
                .wrap(true)
                .xalign(0.0)
                .build();
            row.add_css_class("story-highlight");
            content.append(&row);
        }
    }

    let scrolled = gtk::ScrolledWindow::builder()
        .hscrollbar_policy(gtk::PolicyType::Never)
        .vexpand(true)
        .build();
    scrolled.set_child(Some(&content));
    scrolled.upcast()
}

/// Slide 3: venue, distance, and the plan deep link.
fn build_plan_slide(event: &EventItem) -> gtk::Widget {
    let content = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(12)
        .valign(gtk::Align::Center)
        .margin_start(24)
        .margin_end(24)
        .build();
    content.add_css_class("story-sheet");

    let glyph = Label::builder().label("📍").build();
    glyph.add_css_class("story-glyph");
    content.append(&glyph);

    let venue = Label::builder()
        .label(&event.location_name)
        .wrap(true)
        .justify(gtk::Justification::Center)
        .build();
    venue.add_css_class("story-heading");
    content.append(&venue);

    let distance = Label::builder()
        .label(format!("{} away", event.distance))
        .build();
    distance.add_css_class("story-description");
    content.append(&distance);

    let plan = gtk::Button::builder()
        .label("Plan Today")
        .margin_top(24)
        .build();
    plan.add_css_class("plan-button");
    let link = plan_link(event);
    plan.connect_clicked(move |_| {
        if let Err(e) = open::that(&link) {
            tracing::warn!("failed to open plan link: {e}");
        }
    });
    content.append(&plan);

    content.upcast()
}

fn load_hero_image(picture: &gtk::Picture, url: String) {
    let picture = picture.clone();
    glib::spawn_future_local(async move {
        if let Ok(response) = reqwest::get(&url).await {
            if let Ok(bytes) = response.bytes().await {
                let bytes = glib::Bytes::from(&bytes.to_vec());
                if let Ok(texture) = gdk::Texture::from_bytes(&bytes) {
                    picture.set_paintable(Some(&texture));
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> EventItem {
        EventItem {
            id: "evt_1".into(),
            title: "Jazz & Wine Night".into(),
            description: "Live trio at the old port".into(),
            full_description: "Doors at 8, free entry before 9.".into(),
            highlights: vec!["MUSIC".into(), "8:00 PM".into()],
            latitude: 34.6786,
            longitude: 33.0413,
            rating: 4.7,
            distance: "2 km".into(),
            location_name: "Old Port Stage".into(),
            image_url: "https://example.com/hero.jpg".into(),
        }
    }

    #[test]
    fn test_plan_link_shape() {
        let link = plan_link(&event());
        assert!(link.starts_with(PLAN_BASE_URL));
        assert!(link.contains("?event="));
        // Raw JSON delimiters never leak unencoded into the query.
        let query = link.split("?event=").nth(1).expect("query");
        assert!(!query.contains('{'));
        assert!(!query.contains('"'));
    }

    #[test]
    fn test_plan_link_round_trips_the_event() {
        let source = event();
        let link = plan_link(&source);
        let query = link.split("?event=").nth(1).expect("query");
        let decoded = urlencoding::decode(query).expect("decode");
        let value: serde_json::Value = serde_json::from_str(&decoded).expect("json");

        assert_eq!(value["id"], "evt_1");
        assert_eq!(value["title"], "Jazz & Wine Night");
        assert_eq!(value["locationName"], "Old Port Stage");
        assert_eq!(value["highlights"][0], "MUSIC");
        assert!((value["latitude"].as_f64().expect("lat") - 34.6786).abs() < 1e-9);
        assert!((value["rating"].as_f64().expect("rating") - 4.7).abs() < 1e-9);
    }
}
