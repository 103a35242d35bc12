//! `POST /analyze`: one image and one instruction in, generated text out.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, warn};

use wayfarer_core::error::SERVER_ERROR_MESSAGE;
use wayfarer_core::types::{AnalysisResponse, AnalyzeBody};
use wayfarer_providers::VisionRequest;

use crate::state::GatewayState;

type Reply = (StatusCode, Json<AnalysisResponse>);

fn reject(reason: &str) -> Reply {
    warn!(reason, "Rejected analysis request");
    (StatusCode::BAD_REQUEST, Json(AnalysisResponse::failed(reason)))
}

/// Check the request before it costs a model call.
fn validate(body: &AnalyzeBody) -> Result<(), &'static str> {
    if body.prompt.trim().is_empty() {
        return Err("prompt is required");
    }
    if body.image.is_empty() {
        return Err("image is required");
    }
    if body.image.starts_with("data:") {
        return Err("image must be bare base64, not a data URL");
    }
    if STANDARD.decode(&body.image).is_err() {
        return Err("image is not valid base64");
    }
    Ok(())
}

pub async fn analyze_handler(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Reply {
    let start = Instant::now();
    let (status, reply) = analyze(&state, body).await;

    #[cfg(feature = "metrics")]
    crate::metrics::record_analyze(status, start.elapsed().as_secs_f64());

    info!(
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Analysis request finished"
    );
    (status, reply)
}

async fn analyze(state: &GatewayState, body: Result<Json<AnalyzeBody>, JsonRejection>) -> Reply {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!(%rejection, "Unreadable analysis body");
            return reject("request body must be JSON {image, prompt}");
        }
    };
    if let Err(reason) = validate(&body) {
        return reject(reason);
    }

    let Some(credentials) = &state.credentials else {
        warn!("No model API key configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AnalysisResponse::failed(SERVER_ERROR_MESSAGE)),
        );
    };

    debug!(
        has_location = body.location.is_some(),
        prompt_len = body.prompt.len(),
        "Forwarding to vision model"
    );
    let request = VisionRequest::jpeg(state.model_id.as_str(), body.prompt, body.image);

    match state.model.generate(&request, credentials).await {
        Ok(text) => (StatusCode::OK, Json(AnalysisResponse::ok(text))),
        Err(e) => {
            warn!(error = %e, model = %state.model_id, "Vision model call failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AnalysisResponse::failed(SERVER_ERROR_MESSAGE)),
            )
        }
    }
}
