//! IP geolocation, fail-soft.
//!
//! Location is an input to everything downstream, so this resolver never
//! fails: any transport or shape problem collapses to a fixed default
//! city. An otherwise-successful response with holes in it degrades
//! per-field instead.

use std::time::Duration;

use crate::data::{GeoLocation, IpApiResponse};

const GEO_API_URL: &str = "https://ipapi.co/json/";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Coordinates substituted for missing fields of an otherwise-good
/// response (central London).
const FIELD_DEFAULT_LAT: f64 = 51.5074;
const FIELD_DEFAULT_LON: f64 = -0.1278;

pub struct GeoResolver {
    client: reqwest::Client,
}

impl GeoResolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Resolve the user's location. Never fails.
    pub async fn resolve(&self) -> GeoLocation {
        match self.try_resolve().await {
            Ok(location) => {
                tracing::info!(city = %location.city, "geolocated via ip");
                location
            }
            Err(e) => {
                tracing::warn!("geo lookup failed, using default location: {e}");
                default_location()
            }
        }
    }

    async fn try_resolve(&self) -> Result<GeoLocation, reqwest::Error> {
        let response = self.client.get(GEO_API_URL).send().await?;
        let body: IpApiResponse = response.error_for_status()?.json().await?;
        Ok(from_response(body))
    }
}

impl Default for GeoResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn from_response(body: IpApiResponse) -> GeoLocation {
    GeoLocation {
        city: body.city.unwrap_or_else(|| "Unknown City".into()),
        country_name: body.country_name.unwrap_or_default(),
        latitude: body.latitude.unwrap_or(FIELD_DEFAULT_LAT),
        longitude: body.longitude.unwrap_or(FIELD_DEFAULT_LON),
    }
}

/// The whole-lookup fallback: Limassol, Cyprus.
pub fn default_location() -> GeoLocation {
    GeoLocation {
        city: "Limassol".into(),
        country_name: "Cyprus".into(),
        latitude: 34.6786,
        longitude: 33.0413,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_response_passes_through() {
        let location = from_response(IpApiResponse {
            city: Some("Paris".into()),
            country_name: Some("France".into()),
            latitude: Some(48.8566),
            longitude: Some(2.3522),
        });
        assert_eq!(location.city, "Paris");
        assert_eq!(location.country_name, "France");
        assert!((location.latitude - 48.8566).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_fields_get_field_defaults() {
        let location = from_response(IpApiResponse {
            city: None,
            country_name: None,
            latitude: None,
            longitude: None,
        });
        assert_eq!(location.city, "Unknown City");
        assert_eq!(location.country_name, "");
        assert!((location.latitude - 51.5074).abs() < f64::EPSILON);
        assert!((location.longitude - -0.1278).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lookup_fallback_is_limassol() {
        let location = default_location();
        assert_eq!(location.city, "Limassol");
        assert_eq!(location.country_name, "Cyprus");
        assert!((location.latitude - 34.6786).abs() < f64::EPSILON);
        assert!((location.longitude - 33.0413).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_ipapi_json() {
        let json = r#"{"ip":"1.2.3.4","city":"Limassol","country_name":"Cyprus","latitude":34.7,"longitude":33.0,"org":"Example"}"#;
        let body: IpApiResponse = serde_json::from_str(json).expect("parse");
        let location = from_response(body);
        assert_eq!(location.city, "Limassol");
    }
}
