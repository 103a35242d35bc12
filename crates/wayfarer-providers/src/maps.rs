//! Mapping provider: reverse geocoding and nearby place search.
//!
//! The Google implementation talks to the Geocoding and Places (Nearby Search)
//! web services. Clients are created through a [`MapsLoader`] and cached in a
//! [`LazyMaps`] so initialization happens once per process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use wayfarer_core::types::Coordinate;

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// A place returned by a nearby search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceResult {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub types: Vec<String>,
    pub vicinity: Option<String>,
    pub rating: Option<f64>,
    pub location: Option<Coordinate>,
}

/// Parameters of a nearby search.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbySearch {
    pub location: Coordinate,
    pub radius_meters: u32,
    /// Optional category filter (e.g. "point_of_interest").
    pub place_type: Option<String>,
}

#[async_trait]
pub trait MapsProvider: Send + Sync {
    /// First formatted address for the coordinate; `None` when nothing matches.
    async fn reverse_geocode(&self, at: &Coordinate) -> anyhow::Result<Option<String>>;

    /// Places within the radius, in provider order.
    async fn nearby_search(&self, search: &NearbySearch) -> anyhow::Result<Vec<PlaceResult>>;
}

/// Creates the mapping client on first use.
#[async_trait]
pub trait MapsLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<Arc<dyn MapsProvider>>;
}

/// A mapping client that is initialized at most once and then reused.
///
/// A failed initialization leaves the handle not ready; the next call tries
/// again.
pub struct LazyMaps {
    loader: Arc<dyn MapsLoader>,
    client: OnceCell<Arc<dyn MapsProvider>>,
}

impl LazyMaps {
    pub fn new(loader: Arc<dyn MapsLoader>) -> Self {
        Self {
            loader,
            client: OnceCell::new(),
        }
    }

    /// Whether the client has finished initializing.
    pub fn is_ready(&self) -> bool {
        self.client.initialized()
    }

    pub async fn get(&self) -> anyhow::Result<Arc<dyn MapsProvider>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let client = self.loader.load().await?;
                info!("Maps client initialized");
                Ok::<_, anyhow::Error>(client)
            })
            .await?;
        Ok(client.clone())
    }
}

// --- Google web service types ---

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
}

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    #[serde(default)]
    results: Vec<GooglePlace>,
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GooglePlace {
    #[serde(default)]
    place_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    vicinity: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl From<GooglePlace> for PlaceResult {
    fn from(p: GooglePlace) -> Self {
        Self {
            place_id: p.place_id,
            name: p.name,
            types: p.types,
            vicinity: p.vicinity,
            rating: p.rating,
            location: p.geometry.map(|g| Coordinate::new(g.location.lat, g.location.lng)),
        }
    }
}

/// Map a web-service status to results: `OK` and `ZERO_RESULTS` succeed.
fn check_status(status: &str, error_message: Option<String>) -> anyhow::Result<()> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        other => {
            let detail = error_message.unwrap_or_default();
            anyhow::bail!("Maps API status {other}: {detail}")
        }
    }
}

fn parse_geocode(body: &str) -> anyhow::Result<Option<String>> {
    let resp: GeocodeResponse = serde_json::from_str(body)?;
    check_status(&resp.status, resp.error_message)?;
    Ok(resp.results.into_iter().next().map(|r| r.formatted_address))
}

fn parse_nearby(body: &str) -> anyhow::Result<Vec<PlaceResult>> {
    let resp: NearbyResponse = serde_json::from_str(body)?;
    check_status(&resp.status, resp.error_message)?;
    Ok(resp.results.into_iter().map(PlaceResult::from).collect())
}

pub struct GoogleMapsClient {
    base_url: String,
    api_key: String,
    language: String,
    client: reqwest::Client,
}

impl GoogleMapsClient {
    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<String> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .query(&[("key", self.api_key.as_str()), ("language", self.language.as_str())])
            .send()
            .await
            .map_err(|e| e.without_url())?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Maps API error {status}: {body}");
        }
        Ok(resp.text().await.map_err(|e| e.without_url())?)
    }
}

#[async_trait]
impl MapsProvider for GoogleMapsClient {
    async fn reverse_geocode(&self, at: &Coordinate) -> anyhow::Result<Option<String>> {
        debug!(lat = at.latitude, lng = at.longitude, "Reverse geocoding");
        let body = self
            .get_text(
                "/maps/api/geocode/json",
                &[("latlng", format!("{},{}", at.latitude, at.longitude))],
            )
            .await?;
        parse_geocode(&body)
    }

    async fn nearby_search(&self, search: &NearbySearch) -> anyhow::Result<Vec<PlaceResult>> {
        debug!(
            radius = search.radius_meters,
            place_type = search.place_type.as_deref().unwrap_or("-"),
            "Nearby search"
        );
        let mut query = vec![
            (
                "location",
                format!("{},{}", search.location.latitude, search.location.longitude),
            ),
            ("radius", search.radius_meters.to_string()),
        ];
        if let Some(ref t) = search.place_type {
            query.push(("type", t.clone()));
        }
        let body = self.get_text("/maps/api/place/nearbysearch/json", &query).await?;
        parse_nearby(&body)
    }
}

/// Builds a [`GoogleMapsClient`]; fails when no API key is configured.
pub struct GoogleMapsLoader {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub language: String,
    pub timeout: Duration,
}

#[async_trait]
impl MapsLoader for GoogleMapsLoader {
    async fn load(&self) -> anyhow::Result<Arc<dyn MapsProvider>> {
        let Some(api_key) = self.api_key.clone().filter(|k| !k.is_empty()) else {
            anyhow::bail!("No maps API key configured");
        };
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        Ok(Arc::new(GoogleMapsClient {
            base_url: self
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            language: self.language.clone(),
            client,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_parse_geocode_first_address() {
        let body = r#"{"results":[{"formatted_address":"110台北市信義區信義路五段7號"},{"formatted_address":"信義區"}],"status":"OK"}"#;
        assert_eq!(
            parse_geocode(body).unwrap().as_deref(),
            Some("110台北市信義區信義路五段7號")
        );
    }

    #[test]
    fn test_parse_geocode_zero_results() {
        let body = r#"{"results":[],"status":"ZERO_RESULTS"}"#;
        assert_eq!(parse_geocode(body).unwrap(), None);
    }

    #[test]
    fn test_parse_denied_status_is_error() {
        let body = r#"{"results":[],"status":"REQUEST_DENIED","error_message":"The provided API key is invalid."}"#;
        let err = parse_nearby(body).unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
    }

    #[test]
    fn test_parse_nearby_places() {
        let body = r#"{
            "results": [
                {
                    "place_id": "abc",
                    "name": "台北101",
                    "types": ["tourist_attraction", "point_of_interest"],
                    "vicinity": "信義路五段7號",
                    "rating": 4.6,
                    "geometry": {"location": {"lat": 25.0339, "lng": 121.5645}}
                },
                {"name": "無評分小店", "types": []}
            ],
            "status": "OK"
        }"#;
        let places = parse_nearby(body).unwrap();
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].name.as_deref(), Some("台北101"));
        assert_eq!(places[0].rating, Some(4.6));
        assert_eq!(places[0].location, Some(Coordinate::new(25.0339, 121.5645)));
        assert!(places[1].rating.is_none());
        assert!(places[1].location.is_none());
    }

    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
    }

    struct NoopMaps;

    #[async_trait]
    impl MapsProvider for NoopMaps {
        async fn reverse_geocode(&self, _at: &Coordinate) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
        async fn nearby_search(&self, _s: &NearbySearch) -> anyhow::Result<Vec<PlaceResult>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl MapsLoader for CountingLoader {
        async fn load(&self) -> anyhow::Result<Arc<dyn MapsProvider>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("loader failed");
            }
            Ok(Arc::new(NoopMaps))
        }
    }

    #[tokio::test]
    async fn test_lazy_maps_initializes_once() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let maps = LazyMaps::new(loader.clone());
        assert!(!maps.is_ready());

        maps.get().await.unwrap();
        maps.get().await.unwrap();
        assert!(maps.is_ready());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lazy_maps_failure_stays_not_ready() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let maps = LazyMaps::new(loader);
        assert!(maps.get().await.is_err());
        assert!(!maps.is_ready());
    }

    #[tokio::test]
    async fn test_google_loader_requires_key() {
        let loader = GoogleMapsLoader {
            api_key: None,
            base_url: None,
            language: "zh-TW".into(),
            timeout: Duration::from_secs(5),
        };
        let err = loader.load().await.err().unwrap();
        assert!(err.to_string().contains("API key"));
    }
}
