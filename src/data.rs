use serde::Deserialize;

pub const APP_ID: &str = "today.aday.Aday";

/// Where the "Plan Today" deep link points. Dev builds target the local
/// companion app, release builds the hosted one.
#[cfg(debug_assertions)]
pub const PLAN_BASE_URL: &str = "http://localhost:8081/main/index.html#/main";
#[cfg(not(debug_assertions))]
pub const PLAN_BASE_URL: &str = "https://aday.today/#/main";

/// The user's resolved position. Produced once per session by the geo
/// resolver and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub city: String,
    pub country_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One event as shown on the map and in the card list.
///
/// Instances are created by the event source (from AI output or the demo
/// fallback set) and replaced wholesale on reload, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct EventItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub full_description: String,
    /// First entry doubles as the category tag.
    pub highlights: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Always within [1, 5].
    pub rating: f64,
    /// Free-form, e.g. "2 km" or "Nearby".
    pub distance: String,
    pub location_name: String,
    pub image_url: String,
}

impl EventItem {
    /// Demo events carry a distinct id prefix so callers can detect
    /// demo mode and adjust messaging.
    pub fn is_fallback(&self) -> bool {
        self.id.starts_with("fallback_")
    }

    pub fn category(&self) -> &str {
        self.highlights.first().map(String::as_str).unwrap_or("")
    }
}

/// Lifecycle of the session's event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Initial,
    Loading,
    /// Placeholder cards shown; the load keeps going in the background.
    Skeleton,
    Ready,
    Error,
}

/// Shape of the ipapi.co response. Every field is optional because the
/// service degrades per-field rather than failing whole.
#[derive(Debug, Clone, Deserialize)]
pub struct IpApiResponse {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// One record of the AI's JSON array, taken with maximum leniency: any
/// field may be missing, and the numeric fields may arrive as strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawEvent {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub full_description: Option<String>,
    pub highlights: Option<Vec<String>>,
    pub latitude: Option<serde_json::Value>,
    pub longitude: Option<serde_json::Value>,
    pub rating: Option<serde_json::Value>,
    pub distance: Option<String>,
    pub location_name: Option<String>,
}
