//! Upstream provider clients.
//!
//! The generative vision model implements [`VisionModel`]; the mapping
//! provider implements [`maps::MapsProvider`] and is created lazily through a
//! [`maps::MapsLoader`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod geo;
pub mod google;
pub mod maps;

/// Credentials for authenticating with an upstream API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "api_key")]
    ApiKey { api_key: String },
}

/// A single-turn, two-part (instruction + inline image) model request.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub model: String,
    pub prompt: String,
    /// Standard base64, no data URL prefix.
    pub image_base64: String,
    pub mime_type: String,
}

impl VisionRequest {
    pub fn jpeg(model: impl Into<String>, prompt: impl Into<String>, image_base64: String) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            image_base64,
            mime_type: "image/jpeg".into(),
        }
    }
}

/// A multimodal model that answers an instruction about an image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Provider identifier (e.g., "google").
    fn id(&self) -> &str;

    /// Generate text for the request. No conversation history is kept.
    async fn generate(
        &self,
        request: &VisionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<String>;
}
