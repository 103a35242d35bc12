//! Address lookup and nearby landmark ranking.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use wayfarer_core::error::{GuideError, Result};
use wayfarer_core::types::{Coordinate, Landmark};
use wayfarer_providers::geo::distance_meters;
use wayfarer_providers::maps::{LazyMaps, NearbySearch, PlaceResult};

/// Default search radius in meters.
pub const DEFAULT_RADIUS_METERS: u32 = 500;
/// Upper bound on returned landmarks.
pub const MAX_LANDMARKS: usize = 10;
/// Below this many rated places the broader search tops the list up.
pub const MIN_LANDMARKS: usize = 5;

const FALLBACK_CATEGORY: &str = "point_of_interest";

pub struct PlaceResolver {
    maps: Arc<LazyMaps>,
}

/// Classify a provider failure as a timeout or a generic provider error.
pub(crate) fn provider_error(e: anyhow::Error) -> GuideError {
    let timed_out = e
        .chain()
        .filter_map(|c| c.downcast_ref::<reqwest::Error>())
        .any(reqwest::Error::is_timeout);
    if timed_out {
        GuideError::Timeout(e.to_string())
    } else {
        GuideError::Provider(e.to_string())
    }
}

fn to_landmark(origin: &Coordinate, place: PlaceResult) -> Landmark {
    let distance = place
        .location
        .map(|at| distance_meters(origin, &at))
        .unwrap_or(0);
    Landmark {
        name: place.name.unwrap_or_default(),
        category: place
            .types
            .into_iter()
            .next()
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string()),
        distance_meters: distance,
        address: place.vicinity,
    }
}

impl PlaceResolver {
    pub fn new(maps: Arc<LazyMaps>) -> Self {
        Self { maps }
    }

    /// Whether the mapping client has finished initializing.
    pub fn is_ready(&self) -> bool {
        self.maps.is_ready()
    }

    /// Human-readable address for the coordinate.
    ///
    /// `Ok(None)` means the provider found nothing; a client that cannot
    /// initialize is [`GuideError::GeocodingUnavailable`].
    pub async fn reverse_geocode(&self, at: &Coordinate) -> Result<Option<String>> {
        let client = self
            .maps
            .get()
            .await
            .map_err(|e| GuideError::GeocodingUnavailable(e.to_string()))?;
        client.reverse_geocode(at).await.map_err(provider_error)
    }

    /// Up to ten landmarks around `at`, nearest first.
    ///
    /// Never fails: any provider failure yields an empty list.
    pub async fn nearby_landmarks(&self, at: &Coordinate, radius_meters: u32) -> Vec<Landmark> {
        let client = match self.maps.get().await {
            Ok(c) => c,
            Err(e) => {
                warn!(%e, "Maps client unavailable, no landmarks");
                return Vec::new();
            }
        };

        let primary = NearbySearch {
            location: *at,
            radius_meters,
            place_type: None,
        };
        let places = match client.nearby_search(&primary).await {
            Ok(p) => p,
            Err(e) => {
                warn!(%e, "Nearby search failed, no landmarks");
                return Vec::new();
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut landmarks: Vec<Landmark> = places
            .into_iter()
            .filter(|p| p.rating.is_some())
            .inspect(|p| {
                if let Some(id) = &p.place_id {
                    seen.insert(id.clone());
                }
            })
            .map(|p| to_landmark(at, p))
            .collect();
        landmarks.sort_by_key(|l| l.distance_meters);
        landmarks.truncate(MAX_LANDMARKS);

        if landmarks.len() >= MIN_LANDMARKS {
            return landmarks;
        }

        debug!(count = landmarks.len(), "Too few rated places, broadening search");
        let secondary = NearbySearch {
            place_type: Some(FALLBACK_CATEGORY.to_string()),
            ..primary
        };
        match client.nearby_search(&secondary).await {
            Ok(more) => {
                let wanted = MIN_LANDMARKS - landmarks.len();
                let extra = more
                    .into_iter()
                    .filter(|p| p.place_id.as_ref().is_none_or(|id| !seen.contains(id)))
                    .take(wanted)
                    .map(|p| to_landmark(at, p));
                landmarks.extend(extra);
                landmarks.sort_by_key(|l| l.distance_meters);
            }
            Err(e) => warn!(%e, "Broader nearby search failed, keeping rated places"),
        }

        landmarks
    }
}
