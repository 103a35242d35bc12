use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{APOLOGY_MESSAGE, REQUEST_FAILED};

/// A latitude/longitude pair from a single geolocation fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A nearby point of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Landmark {
    pub name: String,
    pub category: String,
    pub distance_meters: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Location context attached to an analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub coordinates: Coordinate,
}

/// One question's bundle for the inference gateway.
///
/// Built once per question and consumed by a single `analyze` call.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// JPEG-encoded still frame.
    pub image: Vec<u8>,
    pub prompt: String,
    pub location: Option<LocationContext>,
}

impl AnalysisRequest {
    /// Wire form: the image as standard base64 without a data URL prefix.
    pub fn into_body(self) -> AnalyzeBody {
        AnalyzeBody {
            image: STANDARD.encode(&self.image),
            prompt: self.prompt,
            location: self.location,
        }
    }
}

/// JSON body of `POST /analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeBody {
    pub image: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationContext>,
}

/// Result of an analysis.
///
/// When `error` is set, `text` holds a user-safe fallback rather than the
/// underlying failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResponse {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    /// Apology response carrying a diagnostic.
    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            text: APOLOGY_MESSAGE.to_string(),
            error: Some(diagnostic.into()),
        }
    }

    /// The canonical response for any transport failure.
    pub fn request_failed() -> Self {
        Self::failed(REQUEST_FAILED)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
