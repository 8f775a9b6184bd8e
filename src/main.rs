use gtk::prelude::*;
use gtk::{glib, Application, Label, Orientation};
use libadwaita::{prelude::*, ApplicationWindow, ColorScheme, HeaderBar, StyleManager, ToolbarView};
use std::io;
use std::rc::Rc;

mod config;
mod controller;
mod data;
mod errors;
mod events;
mod geo;
mod list_view;
mod map_view;
mod state;
mod story;

use config::Config;
use controller::LoadController;
use data::{LoadPhase, APP_ID};
use errors::is_transient_text;
use events::EventSource;
use list_view::ListView;
use map_view::MapView;
use state::Session;

fn main() -> glib::ExitCode {
    init_tracing();

    // Tokio runtime entered for the whole app lifetime so reqwest
    // futures can be polled from the GTK main loop.
    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    let _guard = rt.enter();

    let app = Application::builder().application_id(APP_ID).build();

    app.connect_activate(build_ui);

    let exit_code = app.run();

    drop(_guard);
    drop(rt);

    exit_code
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn build_ui(app: &Application) {
    let style_manager = StyleManager::default();
    style_manager.set_color_scheme(ColorScheme::PreferLight);

    let session = Session::new();
    let config = Config::load();
    let source = Rc::new(EventSource::new(config.api_key));
    let controller = LoadController::new(session.clone(), source);

    // Window first: the list view needs it as the story dialog's parent.
    let window = ApplicationWindow::builder()
        .application(app)
        .title("A Day Today")
        .default_width(1100)
        .default_height(720)
        .build();

    load_css(&window);

    let map_view = MapView::new(session.clone());
    let list_view = {
        let window = window.clone();
        ListView::new(session.clone(), move |event| {
            story::present(&window, event);
        })
    };

    // Sidebar: brand + location header above the card list.
    let sidebar = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .build();

    let header = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(8)
        .margin_top(16)
        .margin_bottom(12)
        .margin_start(16)
        .margin_end(16)
        .build();

    let brand = Label::builder()
        .label("A DAY\nTODAY")
        .xalign(0.0)
        .build();
    brand.add_css_class("brand");
    header.append(&brand);

    let location_caption = Label::builder()
        .label("HAPPENING NOW IN")
        .xalign(0.0)
        .build();
    location_caption.add_css_class("location-caption");
    header.append(&location_caption);

    let city_label = Label::builder()
        .label("…")
        .xalign(0.0)
        .build();
    city_label.add_css_class("city-name");
    header.append(&city_label);

    sidebar.append(&header);
    sidebar.append(&list_view.widget);

    {
        let city_label = city_label.clone();
        session.observe_location(move |location| {
            city_label.set_label(&location.city);
        });
    }

    // Responsive split: list beside the map on wide windows, above it on
    // tall ones.
    let paned = gtk::Paned::builder()
        .orientation(Orientation::Horizontal)
        .wide_handle(true)
        .build();
    paned.set_start_child(Some(&sidebar));
    paned.set_resize_start_child(false);
    paned.set_shrink_start_child(false);
    paned.set_end_child(Some(&map_view.widget));
    paned.set_resize_end_child(true);
    paned.set_shrink_end_child(false);
    paned.set_position(420);

    let paned_weak = paned.downgrade();
    paned.add_tick_callback(move |_widget, _clock| {
        if let Some(paned) = paned_weak.upgrade() {
            let width = paned.width();
            let height = paned.height();

            if width > 0 && height > 0 {
                let should_be_horizontal = width > height;
                let is_horizontal = paned.orientation() == Orientation::Horizontal;

                if should_be_horizontal != is_horizontal {
                    if should_be_horizontal {
                        paned.set_orientation(Orientation::Horizontal);
                        paned.set_position(420);
                    } else {
                        paned.set_orientation(Orientation::Vertical);
                        paned.set_position(260);
                    }
                }
            }
        }
        glib::ControlFlow::Continue
    });

    // Phase-driven top-level pages.
    let pages = gtk::Stack::builder()
        .transition_type(gtk::StackTransitionType::Crossfade)
        .transition_duration(200)
        .build();
    pages.add_named(&build_loading_page(), Some("loading"));

    let (error_page, error_title, error_message, retry_button) = build_error_page();
    pages.add_named(&error_page, Some("error"));
    pages.add_named(&paned, Some("main"));
    pages.set_visible_child_name("loading");

    {
        let controller = controller.clone();
        retry_button.connect_clicked(move |_| {
            tracing::info!("manual retry, reloading session");
            controller.start();
        });
    }

    {
        let pages = pages.clone();
        let session_for_phase = session.clone();
        session.observe_phase(move |phase| {
            match phase {
                LoadPhase::Initial | LoadPhase::Loading => {
                    pages.set_visible_child_name("loading");
                }
                LoadPhase::Skeleton | LoadPhase::Ready => {
                    pages.set_visible_child_name("main");
                }
                LoadPhase::Error => {
                    let message = session_for_phase
                        .error()
                        .unwrap_or_else(|| "Could not load events.".into());
                    if is_transient_text(&message) {
                        error_title.set_label("⏳ SERVICE BUSY");
                        error_message.set_label(
                            "Our AI service is experiencing high demand right now. \
                             We'll show you demo events while we retry in the background.",
                        );
                    } else {
                        error_title.set_label("OOPS");
                        error_message.set_label(&message);
                    }
                    pages.set_visible_child_name("error");
                }
            }
        });
    }

    let toolbar_view = ToolbarView::builder().build();
    let header_bar = HeaderBar::builder().build();
    toolbar_view.add_top_bar(&header_bar);
    toolbar_view.set_content(Some(&pages));

    window.set_content(Some(&toolbar_view));

    {
        let controller = controller.clone();
        window.connect_close_request(move |_| {
            controller.teardown();
            glib::Propagation::Proceed
        });
    }

    window.present();

    controller.start();
}

fn build_loading_page() -> gtk::Box {
    let page = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(24)
        .halign(gtk::Align::Center)
        .valign(gtk::Align::Center)
        .build();

    let brand = Label::builder()
        .label("A DAY\nTODAY")
        .justify(gtk::Justification::Center)
        .build();
    brand.add_css_class("brand");
    brand.add_css_class("brand-splash");
    page.append(&brand);

    let spinner = gtk::Spinner::builder().spinning(true).build();
    spinner.set_size_request(28, 28);
    page.append(&spinner);

    page
}

fn build_error_page() -> (gtk::Box, Label, Label, gtk::Button) {
    let page = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(16)
        .halign(gtk::Align::Center)
        .valign(gtk::Align::Center)
        .margin_start(24)
        .margin_end(24)
        .build();

    let title = Label::builder().label("OOPS").build();
    title.add_css_class("error-title");
    page.append(&title);

    let message = Label::builder()
        .label("Could not load events.")
        .wrap(true)
        .justify(gtk::Justification::Center)
        .max_width_chars(48)
        .build();
    message.add_css_class("error-message");
    page.append(&message);

    let retry = gtk::Button::builder()
        .label("TRY AGAIN")
        .halign(gtk::Align::Center)
        .build();
    retry.add_css_class("plan-button");
    page.append(&retry);

    (page, title, message, retry)
}

fn load_css(window: &ApplicationWindow) {
    let css_provider = gtk::CssProvider::new();
    css_provider.load_from_data(
        ".brand {
            font-family: monospace;
            font-size: 22px;
            font-weight: 800;
            letter-spacing: -1px;
        }
        .brand-splash {
            font-size: 34px;
        }
        .location-caption {
            font-size: 10px;
            font-weight: 700;
            letter-spacing: 2px;
            color: alpha(@window_fg_color, 0.45);
        }
        .city-name {
            font-size: 22px;
            font-weight: 800;
        }
        .event-card {
            background-color: @card_bg_color;
            border-radius: 16px;
            overflow: hidden;
            border: 1px solid alpha(@borders, 0.25);
            transition: all 250ms cubic-bezier(0.4, 0, 0.2, 1);
            opacity: 1;
        }
        .event-card:hover {
            border-color: alpha(@accent_bg_color, 0.3);
            box-shadow: 0 4px 12px alpha(black, 0.12);
        }
        .card-active {
            border: 2px solid @window_fg_color;
            box-shadow: 0 6px 16px alpha(black, 0.18);
        }
        .card-hidden {
            opacity: 0;
        }
        .card-image {
            background-color: alpha(@window_fg_color, 0.06);
        }
        .card-title {
            font-size: 15px;
            font-weight: 700;
        }
        .card-description {
            font-size: 12px;
            color: alpha(@window_fg_color, 0.6);
        }
        .card-footer {
            font-size: 10px;
            font-weight: 600;
            letter-spacing: 1px;
            color: alpha(@window_fg_color, 0.4);
        }
        .badge {
            background-color: alpha(@card_bg_color, 0.92);
            border-radius: 10px;
            padding: 3px 9px;
            font-size: 10px;
            font-weight: 700;
            letter-spacing: 0.5px;
        }
        .badge-rating {
            color: @window_fg_color;
        }
        .badge-category {
            background-color: alpha(black, 0.75);
            color: white;
        }
        .badge-today {
            background-color: white;
            color: black;
        }
        .skeleton-card {
            padding-bottom: 12px;
        }
        .skeleton-block {
            background-color: alpha(@window_fg_color, 0.08);
            border-radius: 8px;
        }
        .event-marker {
            background-color: alpha(@window_fg_color, 0.45);
            border: 3px solid white;
            border-radius: 999px;
            min-width: 10px;
            min-height: 10px;
            padding: 0;
            box-shadow: 0 2px 6px alpha(black, 0.35);
            transition: all 300ms ease;
        }
        .event-marker:hover {
            background-color: alpha(@window_fg_color, 0.8);
        }
        .event-marker-active {
            background-color: @window_fg_color;
            min-width: 22px;
            min-height: 22px;
            box-shadow: 0 4px 10px alpha(black, 0.45);
        }
        .marker-tail {
            color: @window_fg_color;
            font-size: 13px;
            margin-top: -6px;
        }
        .story-window {
            background-color: @window_bg_color;
        }
        .story-progress {
            background-color: alpha(white, 0.25);
            border-radius: 2px;
        }
        .story-progress-filled {
            background-color: white;
        }
        .story-close {
            background-color: alpha(black, 0.2);
            color: white;
            border-radius: 999px;
        }
        .story-caption {
            color: white;
        }
        .story-title {
            font-size: 28px;
            font-weight: 800;
            color: white;
        }
        .story-description {
            font-size: 15px;
            color: alpha(white, 0.9);
        }
        .story-heading {
            font-size: 22px;
            font-weight: 800;
        }
        .story-subheading {
            font-size: 12px;
            font-weight: 700;
            letter-spacing: 1.5px;
        }
        .story-body {
            font-size: 15px;
        }
        .story-highlight {
            font-size: 14px;
            color: alpha(@window_fg_color, 0.75);
        }
        .story-glyph {
            font-size: 40px;
        }
        .plan-button {
            background-color: @window_fg_color;
            color: @window_bg_color;
            border-radius: 999px;
            padding: 12px 28px;
            font-weight: 800;
        }
        .error-title {
            font-size: 24px;
            font-weight: 800;
        }
        .error-message {
            color: alpha(@window_fg_color, 0.65);
        }"
    );

    gtk::style_context_add_provider_for_display(
        &gtk::prelude::WidgetExt::display(window),
        &css_provider,
        gtk::STYLE_PROVIDER_PRIORITY_APPLICATION,
    );
}
