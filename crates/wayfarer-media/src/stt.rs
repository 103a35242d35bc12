//! Speech-to-text over a hosted transcription API.
//!
//! Used when the host has no recognizer of its own: the spoken question is
//! recorded to a file and sent to a Whisper-compatible endpoint.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use wayfarer_core::config::TranscriptionConfig;

use crate::speech::{RecognitionBackend, RecognizerConfig};

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_len = pcm.len() * 2;
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let file_size = 36 + data_len as u32;

    let mut wav = Vec::with_capacity(44 + data_len);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &sample in pcm {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

/// Get the transcription API URL for a given provider.
pub fn provider_url(config: &TranscriptionConfig) -> &'static str {
    match config.provider.as_str() {
        "openai" => "https://api.openai.com/v1/audio/transcriptions",
        _ => "https://api.groq.com/openai/v1/audio/transcriptions",
    }
}

/// ISO-639-1 language hint from a BCP-47 tag ("zh-TW" -> "zh").
pub fn language_hint(lang: &str) -> &str {
    lang.split(['-', '_']).next().unwrap_or(lang)
}

/// Recognizes the speech in an audio file.
///
/// `.wav` files are sent as-is; `.pcm` files are treated as 16 kHz mono
/// 16-bit little-endian samples and wrapped first.
pub struct AudioFileRecognition {
    path: PathBuf,
    config: TranscriptionConfig,
    url: String,
    client: reqwest::Client,
}

impl AudioFileRecognition {
    pub fn new(
        path: impl Into<PathBuf>,
        config: TranscriptionConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let url = provider_url(&config).to_string();
        Ok(Self {
            path: path.into(),
            config,
            url,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Send requests to `url` instead of the provider's public endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn read_audio(&self) -> Result<Vec<u8>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let is_pcm = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pcm"));
        if !is_pcm {
            return Ok(bytes);
        }
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(pcm_to_wav(&samples, 16000, 1, 16))
    }
}

#[async_trait]
impl RecognitionBackend for AudioFileRecognition {
    async fn recognize_once(&self, config: &RecognizerConfig) -> Result<Option<String>> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| anyhow::anyhow!("No transcription API key configured"))?;

        let wav_data = self.read_audio().await?;
        let model = self
            .config
            .model
            .as_deref()
            .unwrap_or("whisper-large-v3-turbo");

        debug!(url = %self.url, model, wav_bytes = wav_data.len(), "Sending audio for transcription");

        let part = reqwest::multipart::Part::bytes(wav_data)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .text("language", language_hint(&config.lang).to_string())
            .text("response_format", "text")
            .part("file", part);

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Transcription API error {status}: {body}");
        }

        let text = resp.text().await?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::routing::post;

    use super::*;

    #[test]
    fn test_wav_header_generation() {
        let pcm = vec![0i16; 16000];
        let wav = pcm_to_wav(&pcm, 16000, 1, 16);

        assert_eq!(wav.len(), 44 + 16000 * 2);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 16000);
    }

    #[test]
    fn test_provider_url_selection() {
        let groq = TranscriptionConfig::default();
        assert!(provider_url(&groq).contains("groq.com"));

        let openai = TranscriptionConfig {
            provider: "openai".into(),
            ..TranscriptionConfig::default()
        };
        assert!(provider_url(&openai).contains("openai.com"));
    }

    #[test]
    fn test_language_hint() {
        assert_eq!(language_hint("zh-TW"), "zh");
        assert_eq!(language_hint("en_US"), "en");
        assert_eq!(language_hint("ja"), "ja");
    }

    #[tokio::test]
    async fn test_missing_key_is_error() {
        let config = TranscriptionConfig {
            api_key: None,
            api_key_env: Some("WAYFARER_TEST_UNSET_STT_KEY".into()),
            ..TranscriptionConfig::default()
        };
        let backend =
            AudioFileRecognition::new("missing.wav", config, Duration::from_secs(1)).unwrap();
        let err = backend
            .recognize_once(&RecognizerConfig::one_shot("zh-TW"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn test_transcribes_pcm_file_against_fake_endpoint() {
        let app = Router::new().route(
            "/transcribe",
            post(|headers: HeaderMap| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer test-key")
                );
                "  台北101有多高？\n"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("question.pcm");
        std::fs::write(&path, vec![0u8; 3200]).unwrap();

        let config = TranscriptionConfig {
            api_key: Some("test-key".into()),
            ..TranscriptionConfig::default()
        };
        let backend = AudioFileRecognition::new(&path, config, Duration::from_secs(5))
            .unwrap()
            .with_url(format!("http://{addr}/transcribe"));

        let text = backend
            .recognize_once(&RecognizerConfig::one_shot("zh-TW"))
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("台北101有多高？"));
    }
}
