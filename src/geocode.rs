use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RideError, RideResult};
use crate::types::RoutePoint;

/// Resolves a coordinate into a human-readable place name
pub trait ReverseGeocoder {
    fn reverse_geocode(&self, point: RoutePoint)
        -> impl Future<Output = RideResult<String>> + Send;
}

/// Name the start of a ride, substituting `fallback` on any failure
pub async fn resolve_start_location<G: ReverseGeocoder>(
    geocoder: &G,
    point: Option<RoutePoint>,
    fallback: &str,
) -> String {
    let Some(point) = point else {
        log::warn!("No location known at ride end, using fallback start location");
        return fallback.to_string();
    };

    match geocoder.reverse_geocode(point).await {
        Ok(name) if !name.trim().is_empty() => name,
        Ok(_) => fallback.to_string(),
        Err(e) => {
            log::warn!(
                "Reverse geocoding ({:.5}, {:.5}) failed: {}",
                point.latitude,
                point.longitude,
                e
            );
            fallback.to_string()
        }
    }
}

/// Always fails; rides recorded offline get the fallback name
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineGeocoder;

impl ReverseGeocoder for OfflineGeocoder {
    async fn reverse_geocode(&self, _point: RoutePoint) -> RideResult<String> {
        Err(RideError::Geocode("offline".to_string()))
    }
}

/// Nominatim reverse geocoding client
///
/// # Rate Limiting
/// The public instance allows one request per second; a ride end triggers
/// exactly one lookup, so no limiter is kept here.
#[derive(Clone, Debug)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str) -> RideResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("ride_telemetry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RideError::Geocode(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, point: RoutePoint) -> RideResult<String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("zoom", "10".to_string()),
                ("lat", point.latitude.to_string()),
                ("lon", point.longitude.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RideError::Geocode("Network timeout".to_string())
                } else {
                    RideError::Geocode(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RideError::Geocode(format!("HTTP error: {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RideError::Geocode(format!("Failed to read response: {}", e)))?;
        city_from_response(&body)
    }
}

/// Extract the settlement name from a Nominatim reverse response body
pub fn city_from_response(body: &str) -> RideResult<String> {
    let parsed: NominatimResponse = serde_json::from_str(body)
        .map_err(|e| RideError::Geocode(format!("Parse error: {}", e)))?;

    if let Some(err) = parsed.error {
        return Err(RideError::Geocode(err));
    }

    parsed
        .address
        .and_then(|a| a.city.or(a.town).or(a.village))
        .ok_or_else(|| RideError::Geocode("No settlement in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGeocoder(&'static str);

    impl ReverseGeocoder for FixedGeocoder {
        async fn reverse_geocode(&self, _point: RoutePoint) -> RideResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_city_from_response() {
        let body = r#"{"place_id":1,"address":{"city":"Kraków","country":"Polska"}}"#;
        assert_eq!(city_from_response(body).unwrap(), "Kraków");
    }

    #[test]
    fn test_town_used_when_no_city() {
        let body = r#"{"address":{"town":"Zakopane"}}"#;
        assert_eq!(city_from_response(body).unwrap(), "Zakopane");
    }

    #[test]
    fn test_error_response() {
        let body = r#"{"error":"Unable to geocode"}"#;
        assert!(matches!(city_from_response(body), Err(RideError::Geocode(_))));
        assert!(city_from_response("<html>").is_err());
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_failure() {
        let name = resolve_start_location(
            &OfflineGeocoder,
            Some(RoutePoint::new(50.0, 19.9)),
            "Unknown location",
        )
        .await;
        assert_eq!(name, "Unknown location");
    }

    #[tokio::test]
    async fn test_resolve_without_location() {
        let name = resolve_start_location(&FixedGeocoder("Gdańsk"), None, "Unknown location").await;
        assert_eq!(name, "Unknown location");
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let name = resolve_start_location(
            &FixedGeocoder("Gdańsk"),
            Some(RoutePoint::new(54.35, 18.65)),
            "Unknown location",
        )
        .await;
        assert_eq!(name, "Gdańsk");
    }
}
