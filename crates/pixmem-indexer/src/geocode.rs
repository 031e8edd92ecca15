use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const GEOCODE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reverse-geocoding collaborator seam: coordinates in, coarse place name
/// out. Failures yield "no location", never an error.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Resolves decimal-degree coordinates to a coarse place name.
    async fn resolve(&self, lat: f64, lon: f64) -> Option<String>;
}

/// Resolver that never resolves. The default for offline collections.
pub struct NoGeocode;

#[async_trait]
impl GeoResolver for NoGeocode {
    async fn resolve(&self, _lat: f64, _lon: f64) -> Option<String> {
        None
    }
}

/// Reverse geocoding against a Nominatim-style `/reverse` endpoint.
/// Zoom is kept coarse on purpose: tags want "Lisbon, Portugal", not a
/// street address.
pub struct NominatimResolver {
    http: reqwest::Client,
    base_url: String,
}

impl NominatimResolver {
    /// Creates a resolver against the given Nominatim base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GeoResolver for NominatimResolver {
    async fn resolve(&self, lat: f64, lon: f64) -> Option<String> {
        let url = format!(
            "{}/reverse?lat={lat}&lon={lon}&format=jsonv2&zoom=10",
            self.base_url
        );
        let resp = self
            .http
            .get(&url)
            .header("User-Agent", "pixmem")
            .timeout(GEOCODE_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "reverse geocoding failed");
            return None;
        }
        let value: serde_json::Value = resp.json().await.ok()?;

        let address = &value["address"];
        let locality = ["city", "town", "village", "county"]
            .iter()
            .find_map(|key| address[key].as_str());
        let country = address["country"].as_str();

        match (locality, country) {
            (Some(place), Some(country)) => Some(format!("{place}, {country}")),
            (Some(place), None) => Some(place.to_string()),
            (None, Some(country)) => Some(country.to_string()),
            (None, None) => value["display_name"].as_str().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_coarse_place_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "address": { "city": "Lisbon", "country": "Portugal" }
            })))
            .mount(&server)
            .await;

        let resolver = NominatimResolver::new(server.uri());
        let name = resolver.resolve(38.72, -9.14).await;
        assert_eq!(name.as_deref(), Some("Lisbon, Portugal"));
    }

    #[tokio::test]
    async fn failure_yields_no_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let resolver = NominatimResolver::new(server.uri());
        assert!(resolver.resolve(0.0, 0.0).await.is_none());
    }
}
