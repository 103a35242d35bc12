//! Gateway shared state.

use std::sync::Arc;

use wayfarer_core::config::Config;
use wayfarer_providers::{Credentials, VisionModel};

/// Shared state for every request handler.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub model: Arc<dyn VisionModel>,
    /// `None` when no model API key is configured; `/analyze` then fails.
    pub credentials: Option<Credentials>,
    pub model_id: String,
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, model: Arc<dyn VisionModel>) -> Self {
        let credentials = config
            .model_api_key()
            .map(|api_key| Credentials::ApiKey { api_key });
        let model_id = config.model_id();

        Self {
            config,
            model,
            credentials,
            model_id,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Override the credentials resolved from config.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
