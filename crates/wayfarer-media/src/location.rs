//! One-shot geolocation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use wayfarer_core::error::{GuideError, Result};
use wayfarer_core::types::Coordinate;

/// Host positioning service.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// A single position fix (not a continuous watch).
    async fn current_position(&self) -> Result<Coordinate>;
}

/// A position supplied up front, e.g. from the command line.
pub struct FixedLocation {
    coordinate: Option<Coordinate>,
}

impl FixedLocation {
    pub fn new(coordinate: Option<Coordinate>) -> Self {
        Self { coordinate }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinate> {
        self.coordinate
            .ok_or_else(|| GuideError::LocationUnavailable("position unavailable".into()))
    }
}

/// Request a fix, bounded by `timeout`.
pub async fn locate(provider: &dyn LocationProvider, timeout: Duration) -> Result<Coordinate> {
    match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(Ok(c)) => Ok(c),
        Ok(Err(e)) => {
            warn!(%e, "Location fix failed");
            Err(e)
        }
        Err(_) => {
            warn!(?timeout, "Location fix timed out");
            Err(GuideError::LocationUnavailable(format!(
                "timed out after {timeout:?}"
            )))
        }
    }
}
