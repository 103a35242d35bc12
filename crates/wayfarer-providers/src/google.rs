//! Google Generative AI (Gemini) provider.
//!
//! Uses the non-streaming `generateContent` endpoint. Auth is via API key in
//! query parameter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{Credentials, VisionModel, VisionRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    pub base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn build_request(request: &VisionRequest) -> GeminiRequest<'_> {
    GeminiRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                RequestPart::Text {
                    text: &request.prompt,
                },
                RequestPart::InlineData {
                    inline_data: InlineData {
                        mime_type: &request.mime_type,
                        data: &request.image_base64,
                    },
                },
            ],
        }],
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GeminiResponse) -> anyhow::Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        anyhow::bail!("Gemini blocked the prompt: {reason}");
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        anyhow::bail!("Gemini returned no candidates");
    };

    if let Some(ref reason) = candidate.finish_reason {
        if reason != "STOP" {
            trace!(reason, "Gemini finish reason");
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        anyhow::bail!("Gemini returned an empty answer");
    }
    Ok(text)
}

#[async_trait]
impl VisionModel for GeminiProvider {
    fn id(&self) -> &str {
        "google"
    }

    async fn generate(
        &self,
        request: &VisionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<String> {
        let Credentials::ApiKey { api_key } = credentials;

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, request.model, api_key
        );

        debug!(
            model = %request.model,
            prompt_len = request.prompt.len(),
            image_b64_len = request.image_base64.len(),
            "Calling Gemini generateContent"
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&build_request(request))
            .send()
            .await
            .map_err(|e| e.without_url())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {status}: {body}");
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| e.without_url())?;
        extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_provider_creation() {
        let provider = GeminiProvider::new(None, Duration::from_secs(5)).unwrap();
        assert_eq!(provider.id(), "google");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);

        let custom = GeminiProvider::new(Some("http://localhost:9/"), Duration::from_secs(5)).unwrap();
        assert_eq!(custom.base_url, "http://localhost:9");
    }

    #[test]
    fn test_request_has_text_then_inline_jpeg() {
        let req = VisionRequest::jpeg("gemini-2.0-flash-lite", "describe", "AAAA".into());
        let body = serde_json::to_value(build_request(&req)).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(parts[0]["text"], "describe");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "AAAA");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"這是"},{"text":"台北101"}]},"finishReason":"STOP"}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "這是台北101");
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let json = r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = extract_text(parsed).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_text_no_candidates() {
        let parsed: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert!(extract_text(parsed).is_err());
    }
}
