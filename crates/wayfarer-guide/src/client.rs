//! Client for the `POST /analyze` inference endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use wayfarer_core::types::{AnalysisRequest, AnalysisResponse};

/// Sends an image and prompt to a multimodal model.
///
/// Implementations never fail: every transport problem comes back as an
/// [`AnalysisResponse`] with `error` set and an apology in `text`.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> AnalysisResponse;
}

pub struct HttpInferenceGateway {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpInferenceGateway {
    /// `base_url` is the gateway root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: format!("{}/analyze", base_url.trim_end_matches('/')),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceGateway for HttpInferenceGateway {
    async fn analyze(&self, request: AnalysisRequest) -> AnalysisResponse {
        let body = request.into_body();
        debug!(
            endpoint = %self.endpoint,
            image_b64_len = body.image.len(),
            prompt_len = body.prompt.len(),
            "Sending analysis request"
        );

        let resp = match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%e, timeout = e.is_timeout(), "Analysis request failed");
                return AnalysisResponse::request_failed();
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(%status, %detail, "Analysis endpoint returned an error");
            return AnalysisResponse::request_failed();
        }

        match resp.json::<AnalysisResponse>().await {
            Ok(mut parsed) => {
                if parsed.is_error() && parsed.text.trim().is_empty() {
                    parsed.text = AnalysisResponse::request_failed().text;
                }
                parsed
            }
            Err(e) => {
                warn!(%e, "Unreadable analysis response");
                AnalysisResponse::request_failed()
            }
        }
    }
}
