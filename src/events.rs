//! Generative-AI event discovery.
//!
//! Asks Gemini for real events happening today near the resolved location
//! and normalizes its loosely-typed reply into [`EventItem`]s. The reply
//! is never trusted: every field has a default, ids are deduplicated, and
//! any failure — overload after retries, parse trouble, an empty result,
//! or a missing credential — collapses into a fixed 4-item demo set
//! jittered around the user so the map still has something to show.

use std::collections::HashSet;
use std::time::Duration;

use gtk::glib;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::{EventItem, GeoLocation, RawEvent};
use crate::errors::EventSourceError;

const GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";

const REQUEST_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Transient-overload retry schedule: 3 attempts, 1 s base, doubling.
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Fallback images per category tag, matched by substring containment
/// against the uppercased first highlight. Order matters: first hit wins.
const CATEGORY_IMAGES: &[(&str, &str)] = &[
    ("NEWS", "https://images.unsplash.com/photo-1586339949916-3e9457bef6d3?w=800&q=80"),
    ("CINEMA", "https://images.unsplash.com/photo-1489599849927-2ee91cede3ba?w=800&q=80"),
    ("CITY", "https://images.unsplash.com/photo-1517457373958-b7bdd4587205?w=800&q=80"),
    ("FOOD", "https://images.unsplash.com/photo-1555939594-58d7cb561ad1?w=800&q=80"),
    ("CULTURE", "https://images.unsplash.com/photo-1508997449629-303059a039c0?w=800&q=80"),
    ("BEAUTY", "https://images.unsplash.com/photo-1560750588-73207b1ef5b8?w=800&q=80"),
    ("MUSIC", "https://images.unsplash.com/photo-1493225457124-a3eb161ffa5f?w=800&q=80"),
    ("COMMUNITY", "https://images.unsplash.com/photo-1529156069898-49953e39b3ac?w=800&q=80"),
    ("GAMES", "https://images.unsplash.com/photo-1511512578047-dfb367046420?w=800&q=80"),
    ("INTERNET", "https://images.unsplash.com/photo-1550751827-4bd374c3f58b?w=800&q=80"),
];

const DEFAULT_IMAGE: &str =
    "https://images.unsplash.com/photo-1492684223066-81342ee5ff30?w=800&q=80";

pub struct EventSource {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl EventSource {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, api_key }
    }

    /// Fetch today's events near `location`. Never fails: any error in
    /// the live path is absorbed into the demo fallback set.
    pub async fn fetch(&self, location: &GeoLocation) -> Vec<EventItem> {
        let Some(key) = self.api_key.as_deref() else {
            tracing::warn!("no API key configured, serving demo events");
            return fallback_events(location);
        };

        absorb(self.fetch_live(key, location).await, location)
    }

    /// The live path with transient-overload retries. Non-retryable
    /// errors propagate immediately.
    async fn fetch_live(
        &self,
        key: &str,
        location: &GeoLocation,
    ) -> Result<Vec<EventItem>, EventSourceError> {
        let mut attempt = 0;
        loop {
            match self.request_events(key, location).await {
                Ok(events) => return Ok(events),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt >= MAX_ATTEMPTS {
                        return Err(e);
                    }
                    let delay =
                        Duration::from_millis(RETRY_BASE_DELAY_MS << (attempt - 1));
                    tracing::info!(
                        "AI service overloaded, retry {attempt}/{} in {delay:?}",
                        MAX_ATTEMPTS - 1
                    );
                    glib::timeout_future(delay).await;
                }
            }
        }
    }

    /// One round trip to Gemini: prompt out, JSON array back.
    async fn request_events(
        &self,
        key: &str,
        location: &GeoLocation,
    ) -> Result<Vec<EventItem>, EventSourceError> {
        let today = chrono::Local::now().format("%A, %B %-d, %Y").to_string();
        let prompt = build_prompt(location, &today);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
            generation_config: GenerationConfig { temperature: 0.3 },
            tools: vec![serde_json::json!({ "google_search": {} })],
        };

        let response = self
            .client
            .post(GEMINI_API_URL)
            .header("x-goog-api-key", key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EventSourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EventSourceError::Parse(e.to_string()))?;
        let text = reply.text();

        parse_events(&text, location)
    }
}

/// Absorb a live-path failure into the demo fallback set.
fn absorb(
    result: Result<Vec<EventItem>, EventSourceError>,
    location: &GeoLocation,
) -> Vec<EventItem> {
    match result {
        Ok(events) => events,
        Err(e) if e.is_transient() => {
            tracing::warn!("AI service unavailable after retries, serving demo events: {e}");
            fallback_events(location)
        }
        Err(e) => {
            tracing::warn!("event fetch failed, serving demo events: {e}");
            fallback_events(location)
        }
    }
}

/// Pull the event array out of the model's free-text reply and normalize
/// every record.
fn parse_events(text: &str, location: &GeoLocation) -> Result<Vec<EventItem>, EventSourceError> {
    let array = extract_json_array(text)?;
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(array).map_err(|e| EventSourceError::Parse(e.to_string()))?;

    if raw.is_empty() {
        return Err(EventSourceError::Validation(format!(
            "Nothing specific found for today in {}. Try again later!",
            location.city
        )));
    }

    Ok(normalize_all(raw, location))
}

/// The model wraps its JSON in prose; take the first `[` through the
/// last `]`.
fn extract_json_array(text: &str) -> Result<&str, EventSourceError> {
    let start = text
        .find('[')
        .ok_or_else(|| EventSourceError::Parse("no JSON array in reply".into()))?;
    let end = text
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or_else(|| EventSourceError::Parse("unterminated JSON array in reply".into()))?;
    Ok(&text[start..=end])
}

fn normalize_all(raw: Vec<serde_json::Value>, location: &GeoLocation) -> Vec<EventItem> {
    let stamp = chrono::Utc::now().timestamp_millis();
    let mut seen: HashSet<String> = HashSet::new();

    raw.into_iter()
        .enumerate()
        .map(|(index, value)| {
            // A record that is not even an object normalizes from defaults.
            let record: RawEvent = serde_json::from_value(value).unwrap_or_default();
            let mut item = normalize_record(record, index, stamp, location);
            dedupe_id(&mut item, &mut seen);
            item
        })
        .collect()
}

/// Apply per-field defaults to one untrusted record.
fn normalize_record(
    record: RawEvent,
    index: usize,
    stamp: i64,
    location: &GeoLocation,
) -> EventItem {
    let description = record
        .description
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Happening today.".into());
    let full_description = record
        .full_description
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| description.clone());
    let highlights = record
        .highlights
        .unwrap_or_else(|| vec!["TODAY".into()]);
    let category = highlights
        .first()
        .map(|h| h.to_uppercase())
        .unwrap_or_else(|| "DEFAULT".into());

    EventItem {
        id: record
            .id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("evt_{index}_{stamp}")),
        title: record
            .title
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Local Event".into()),
        description,
        full_description,
        image_url: image_for_category(&category).into(),
        highlights,
        latitude: lenient_f64(record.latitude.as_ref()).unwrap_or(location.latitude),
        longitude: lenient_f64(record.longitude.as_ref()).unwrap_or(location.longitude),
        rating: lenient_f64(record.rating.as_ref())
            .unwrap_or(4.0)
            .clamp(1.0, 5.0),
        distance: record.distance.unwrap_or_default(),
        location_name: record
            .location_name
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| location.city.clone()),
    }
}

/// Ids must be unique within a list; repeats get a numeric suffix.
fn dedupe_id(item: &mut EventItem, seen: &mut HashSet<String>) {
    if seen.insert(item.id.clone()) {
        return;
    }
    let base = item.id.clone();
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if seen.insert(candidate.clone()) {
            item.id = candidate;
            return;
        }
        n += 1;
    }
}

/// Accept a number, or a string holding one. NaN and infinities count
/// as absent.
fn lenient_f64(value: Option<&serde_json::Value>) -> Option<f64> {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

pub fn image_for_category(tag: &str) -> &'static str {
    let tag = tag.to_uppercase();
    CATEGORY_IMAGES
        .iter()
        .find(|(name, _)| tag.contains(name))
        .map(|(_, url)| *url)
        .unwrap_or(DEFAULT_IMAGE)
}

fn build_prompt(location: &GeoLocation, today: &str) -> String {
    let categories = [
        "NEWS (public talks, rallies)",
        "CINEMA (showtimes today)",
        "CITY (active public spaces)",
        "FOOD (markets, openings)",
        "CULTURE (exhibits, plays)",
        "BEAUTY (pop-ups, specials)",
        "MUSIC (live shows tonight)",
        "COMMUNITY (meetups, volunteering)",
        "GAMES (tournaments, sports)",
        "INTERNET (tech meetups, lans)",
    ]
    .join(", ");

    format!(
        "You are a real-time local event finder. Find 8-12 REAL, VERIFIABLE events \
happening EXACTLY TODAY, {today}, in {city}, {country}.\n\n\
Focus on these categories: {categories}.\n\n\
CRITICAL RULES:\n\
1. TIME SENSITIVE: Must be confirmed for TODAY. Do not list generic \"always open\" \
businesses unless they have a specific event today.\n\
2. REAL LOCATIONS: Must have a specific, mappable venue name.\n\
3. NO HALLUCINATIONS: If a category has nothing TODAY, skip it. Quality over quantity.\n\
4. FORMAT: 'highlights' must be an array starting with the CATEGORY name in ALL CAPS \
(e.g., [\"MUSIC\", \"8:00 PM\", \"Live Band\"]).\n\n\
Return strictly a JSON array of objects:\n\
[\n  {{\n    \"id\": \"unique_id_1\",\n    \"title\": \"Short Catchy Title\",\n    \
\"description\": \"Very brief summary (max 12 words).\",\n    \
\"fullDescription\": \"Detailed info, including exact times, entry fees, and why it's worth going today.\",\n    \
\"highlights\": [\"CATEGORY\", \"Time\", \"Vibe Tag\"],\n    \
\"latitude\": 12.3456 (number),\n    \"longitude\": 67.8901 (number),\n    \
\"rating\": 4.5 (number 1-5 based on predicted popularity),\n    \
\"distance\": \"approx distance string\",\n    \
\"locationName\": \"Exact Venue Name\"\n  }}\n]",
        city = location.city,
        country = location.country_name,
    )
}

/// The fixed demo set shown when the live path is unavailable. Each
/// event sits within ±0.01° of the given location so markers spread out.
pub fn fallback_events(location: &GeoLocation) -> Vec<EventItem> {
    let mut rng = rand::thread_rng();
    let mut jitter = || (rng.gen::<f64>() - 0.5) * 0.02;

    let base = [
        (
            "fallback_1",
            "Local Coffee & Culture",
            "Discover hidden gems in your neighborhood",
            "Explore local cafes, galleries, and cultural spaces. Connect with your community and find what's happening around you.",
            vec!["CULTURE", "All Day", "Community"],
            4.5,
            "Nearby",
            location.city.clone(),
        ),
        (
            "fallback_2",
            "Evening Food Markets",
            "Fresh local produce and street food",
            "Visit evening markets featuring local vendors, fresh ingredients, and delicious street food. Perfect for dinner planning!",
            vec!["FOOD", "5:00 PM", "Fresh & Local"],
            4.3,
            "2 km",
            format!("{} Market District", location.city),
        ),
        (
            "fallback_3",
            "City Parks & Recreation",
            "Outdoor activities and green spaces",
            "Enjoy public parks, walking trails, and outdoor activities. Perfect for exercise or relaxation in nature.",
            vec!["CITY", "All Day", "Outdoors"],
            4.6,
            "1.5 km",
            format!("{} Central Park", location.city),
        ),
        (
            "fallback_4",
            "Evening Cinema Showings",
            "Latest movies at local theaters",
            "Check out the latest films at nearby cinemas. Multiple showings available throughout the evening.",
            vec!["CINEMA", "7:00 PM", "New Releases"],
            4.4,
            "3 km",
            format!("{} Cinema", location.city),
        ),
    ];

    base.into_iter()
        .map(
            |(id, title, description, full, highlights, rating, distance, venue)| EventItem {
                id: id.into(),
                title: title.into(),
                description: description.into(),
                full_description: full.into(),
                image_url: image_for_category(highlights[0]).into(),
                highlights: highlights.into_iter().map(String::from).collect(),
                latitude: location.latitude + jitter(),
                longitude: location.longitude + jitter(),
                rating,
                distance: distance.into(),
                location_name: venue,
            },
        )
        .collect()
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    tools: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate's parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paris() -> GeoLocation {
        GeoLocation {
            city: "Paris".into(),
            country_name: "France".into(),
            latitude: 48.8566,
            longitude: 2.3522,
        }
    }

    #[test]
    fn test_extract_array_from_prose() {
        let text = "Here is what I found:\n```json\n[{\"id\": \"a\"}]\n```\nEnjoy!";
        assert_eq!(extract_json_array(text).expect("array"), "[{\"id\": \"a\"}]");
    }

    #[test]
    fn test_extract_array_missing() {
        assert!(extract_json_array("nothing here").is_err());
        assert!(extract_json_array("only an opener [").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_array() {
        let err = parse_events("[]", &paris()).expect_err("empty must fail");
        assert!(matches!(err, EventSourceError::Validation(_)));
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let events = parse_events(r#"[{"title": "Jazz Night"}]"#, &paris()).expect("parse");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(event.id.starts_with("evt_0_"));
        assert_eq!(event.title, "Jazz Night");
        assert_eq!(event.description, "Happening today.");
        assert_eq!(event.full_description, "Happening today.");
        assert_eq!(event.highlights, vec!["TODAY".to_string()]);
        assert!((event.latitude - 48.8566).abs() < f64::EPSILON);
        assert!((event.longitude - 2.3522).abs() < f64::EPSILON);
        assert!((event.rating - 4.0).abs() < f64::EPSILON);
        assert_eq!(event.location_name, "Paris");
        assert_eq!(event.image_url, DEFAULT_IMAGE);
    }

    #[test]
    fn test_normalize_substitutes_session_coords_for_bad_latitude() {
        let events = parse_events(
            r#"[{"id": "e1", "latitude": "not a number", "longitude": 2.40}]"#,
            &paris(),
        )
        .expect("parse");
        assert!((events[0].latitude - 48.8566).abs() < f64::EPSILON);
        assert!((events[0].longitude - 2.40).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize_accepts_stringly_numbers() {
        let events = parse_events(
            r#"[{"id": "e1", "latitude": "48.9", "rating": "3.5"}]"#,
            &paris(),
        )
        .expect("parse");
        assert!((events[0].latitude - 48.9).abs() < f64::EPSILON);
        assert!((events[0].rating - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize_rejects_nan() {
        let events =
            parse_events(r#"[{"id": "e1", "latitude": "NaN"}]"#, &paris()).expect("parse");
        assert!((events[0].latitude - 48.8566).abs() < f64::EPSILON);
        assert!(events[0].latitude.is_finite());
    }

    #[test]
    fn test_rating_clamped_to_range() {
        let events = parse_events(
            r#"[{"id": "a", "rating": 9.5}, {"id": "b", "rating": 0.2}]"#,
            &paris(),
        )
        .expect("parse");
        for event in &events {
            assert!(event.rating >= 1.0 && event.rating <= 5.0);
        }
    }

    #[test]
    fn test_duplicate_ids_get_suffixed() {
        let events = parse_events(
            r#"[{"id": "dup"}, {"id": "dup"}, {"id": "dup"}]"#,
            &paris(),
        )
        .expect("parse");
        let ids: HashSet<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(events[0].id, "dup");
        assert_eq!(events[1].id, "dup_2");
        assert_eq!(events[2].id, "dup_3");
    }

    #[test]
    fn test_garbage_record_normalizes_from_defaults() {
        let events = parse_events(r#"[42, {"id": "real"}]"#, &paris()).expect("parse");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Local Event");
        assert_eq!(events[1].id, "real");
    }

    #[test]
    fn test_image_matching_is_containment_first_wins() {
        assert_eq!(
            image_for_category("MUSIC"),
            CATEGORY_IMAGES[6].1,
        );
        // Substring containment, case-insensitive.
        assert_eq!(image_for_category("live music tonight"), CATEGORY_IMAGES[6].1);
        // Unknown tags fall through to the default.
        assert_eq!(image_for_category("TODAY"), DEFAULT_IMAGE);
        assert_eq!(image_for_category(""), DEFAULT_IMAGE);
    }

    #[test]
    fn test_fallback_set_shape() {
        let events = fallback_events(&paris());
        assert_eq!(events.len(), 4);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.id, format!("fallback_{}", i + 1));
            assert!(event.is_fallback());
            assert!(event.rating >= 1.0 && event.rating <= 5.0);
            assert!((event.latitude - 48.8566).abs() <= 0.01);
            assert!((event.longitude - 2.3522).abs() <= 0.01);
        }
        assert_eq!(events[0].category(), "CULTURE");
        assert_eq!(events[1].category(), "FOOD");
        assert_eq!(events[2].category(), "CITY");
        assert_eq!(events[3].category(), "CINEMA");
    }

    #[test]
    fn test_fallback_names_the_city() {
        let events = fallback_events(&paris());
        assert_eq!(events[0].location_name, "Paris");
        assert_eq!(events[1].location_name, "Paris Market District");
    }

    #[test]
    fn test_transient_failures_absorb_into_fallback() {
        // Five consecutive overloads upstream surface here as one
        // transient error; the result is exactly the 4-item demo set.
        let result = Err(EventSourceError::Api {
            status: 503,
            message: "overloaded".into(),
        });
        let events = absorb(result, &paris());
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].id, "fallback_1");
        assert_eq!(events[3].id, "fallback_4");
    }

    #[test]
    fn test_non_retryable_failures_also_absorb() {
        let events = absorb(Err(EventSourceError::Parse("junk".into())), &paris());
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(EventItem::is_fallback));
    }

    #[test]
    fn test_prompt_names_city_and_categories() {
        let prompt = build_prompt(&paris(), "Friday, March 7, 2025");
        assert!(prompt.contains("Paris, France"));
        assert!(prompt.contains("Friday, March 7, 2025"));
        assert!(prompt.contains("MUSIC (live shows tonight)"));
        assert!(prompt.contains("8-12 REAL, VERIFIABLE events"));
        assert!(prompt.contains("\"locationName\""));
    }

    #[test]
    fn test_gemini_reply_text_concatenation() {
        let json = r#"{"candidates": [{"content": {"parts": [{"text": "part one "}, {"text": "part two"}]}}]}"#;
        let reply: GenerateResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(reply.text(), "part one part two");
    }

    #[test]
    fn test_gemini_reply_without_candidates() {
        let reply: GenerateResponse = serde_json::from_str("{}").expect("parse");
        assert_eq!(reply.text(), "");
    }
}
