//! Streaming TTS: writes audio chunks to disk as they arrive from the provider.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use wayfarer_core::config::TtsConfig;

use crate::speech::{Utterance, UtterancePlayer};

/// Voice ID of the stock "Rachel" voice.
const DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";
const DEFAULT_OUTPUT_FORMAT: &str = "mp3_44100_128";

/// Build the ElevenLabs streaming TTS request URL for a given voice.
pub fn build_tts_url(voice: &str) -> String {
    format!("https://api.elevenlabs.io/v1/text-to-speech/{voice}/stream")
}

/// Speaks by streaming ElevenLabs audio into a file.
///
/// The file is truncated for each utterance, so it always holds the most
/// recent one. Dropping the playback future stops the download mid-stream.
pub struct ElevenLabsPlayer {
    config: TtsConfig,
    api_key: String,
    url: String,
    output: PathBuf,
    client: reqwest::Client,
}

impl ElevenLabsPlayer {
    /// Fails when no API key is configured.
    pub fn new(config: TtsConfig, output: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| anyhow::anyhow!("No TTS API key configured"))?;
        let voice = config.default_voice.as_deref().unwrap_or(DEFAULT_VOICE);
        let url = build_tts_url(voice);
        Ok(Self {
            config,
            api_key,
            url,
            output: output.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Send requests to `url` instead of the public endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl UtterancePlayer for ElevenLabsPlayer {
    async fn play(&self, utterance: &Utterance) -> Result<()> {
        let model = self.config.default_model.as_deref().unwrap_or(DEFAULT_MODEL);
        let format = self
            .config
            .output_format
            .as_deref()
            .unwrap_or(DEFAULT_OUTPUT_FORMAT);

        debug!(model, text_len = utterance.text.len(), "Starting TTS stream");

        let resp = self
            .client
            .post(&self.url)
            .query(&[("output_format", format)])
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": utterance.text,
                "model_id": model,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("TTS API error {status}: {body}");
        }

        let mut file = tokio::fs::File::create(&self.output).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| anyhow::anyhow!("TTS stream error: {e}"))?;
            file.write_all(&bytes).await?;
            written += bytes.len();
        }
        file.flush().await?;

        info!(bytes = written, path = %self.output.display(), "Speech audio written");
        Ok(())
    }
}
