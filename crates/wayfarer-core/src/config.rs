//! Configuration loading and validation.
//!
//! Every field is optional: with no config file the system runs entirely from
//! environment variables (`GEMINI_API_KEY`, `GOOGLE_MAPS_API_KEY`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_LANGUAGE: &str = "zh-TW";
pub const DEFAULT_RADIUS_METERS: u32 = 500;
pub const DEFAULT_GATEWAY_PORT: u16 = 3000;

/// Top-level Wayfarer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maps: Option<MapsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<SpeechConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Upper bound on `POST /analyze` body size (base64 frames are large).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Generative vision model settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ModelConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Mapping provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Result language (default: "zh-TW").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Nearby search radius in meters (default: 500).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_meters: Option<u32>,
}

impl MapsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Recognition and synthesis language tag (default: "zh-TW").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<TranscriptionConfig>,
}

/// Text-to-speech (TTS) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// TTS provider (default: "elevenlabs").
    #[serde(default = "default_tts_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_tts_key_env", skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Default voice ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_voice: Option<String>,

    /// Default model ID (e.g. "eleven_multilingual_v2").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Output format (default: "mp3_44100_128").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            api_key: None,
            api_key_env: default_tts_key_env(),
            default_voice: None,
            default_model: None,
            output_format: None,
        }
    }
}

fn default_tts_provider() -> String {
    "elevenlabs".into()
}

fn default_tts_key_env() -> Option<String> {
    Some("ELEVENLABS_API_KEY".into())
}

impl TtsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Voice transcription (speech-to-text) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Provider: "groq" or "openai" (default: "groq").
    #[serde(default = "default_transcription_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_transcription_key_env", skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Model name (e.g. "whisper-large-v3-turbo").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_transcription_provider(),
            api_key: None,
            api_key_env: default_transcription_key_env(),
            model: None,
        }
    }
}

fn default_transcription_provider() -> String {
    "groq".into()
}

fn default_transcription_key_env() -> Option<String> {
    Some("GROQ_API_KEY".into())
}

impl TranscriptionConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Where the question runner sends `POST /analyze`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per outbound HTTP request (default: 30).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_secs: Option<u64>,

    /// Camera acquisition and geolocation fix (default: 10).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "wayfarer_guide=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::GuideError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw)?;

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::GuideError::Config(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway
            .as_ref()
            .map(|g| g.port)
            .unwrap_or(DEFAULT_GATEWAY_PORT)
    }

    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn max_body_bytes(&self) -> usize {
        self.gateway
            .as_ref()
            .map(|g| g.max_body_bytes)
            .unwrap_or_else(default_max_body_bytes)
    }

    /// Vision model id.
    pub fn model_id(&self) -> String {
        self.model
            .as_ref()
            .and_then(|m| m.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Model API key, falling back to `GEMINI_API_KEY`.
    pub fn model_api_key(&self) -> Option<String> {
        let model = self.model.clone().unwrap_or_default();
        model
            .resolve_api_key()
            .or_else(|| resolve_secret_field(&None, &Some("GEMINI_API_KEY".into())))
    }

    /// Maps API key, falling back to `GOOGLE_MAPS_API_KEY`.
    pub fn maps_api_key(&self) -> Option<String> {
        let maps = self.maps.clone().unwrap_or_default();
        maps.resolve_api_key()
            .or_else(|| resolve_secret_field(&None, &Some("GOOGLE_MAPS_API_KEY".into())))
    }

    pub fn maps_language(&self) -> String {
        self.maps
            .as_ref()
            .and_then(|m| m.language.clone())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    }

    pub fn radius_meters(&self) -> u32 {
        self.maps
            .as_ref()
            .and_then(|m| m.radius_meters)
            .unwrap_or(DEFAULT_RADIUS_METERS)
    }

    pub fn speech_lang(&self) -> String {
        self.speech
            .as_ref()
            .and_then(|s| s.lang.clone())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    }

    pub fn tts(&self) -> TtsConfig {
        self.speech
            .as_ref()
            .and_then(|s| s.tts.clone())
            .unwrap_or_default()
    }

    pub fn transcription(&self) -> TranscriptionConfig {
        self.speech
            .as_ref()
            .and_then(|s| s.transcription.clone())
            .unwrap_or_default()
    }

    pub fn gateway_url(&self) -> String {
        self.client
            .as_ref()
            .and_then(|c| c.gateway_url.clone())
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.gateway_port()))
    }

    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .timeouts
            .as_ref()
            .and_then(|t| t.request_secs)
            .unwrap_or(30);
        Duration::from_secs(secs)
    }

    pub fn device_timeout(&self) -> Duration {
        let secs = self
            .timeouts
            .as_ref()
            .and_then(|t| t.device_secs)
            .unwrap_or(10);
        Duration::from_secs(secs)
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.model_api_key().is_none() {
            warnings.push("Vision model has no API key configured (GEMINI_API_KEY)".to_string());
        }
        if self.maps_api_key().is_none() {
            warnings.push(
                "Maps provider has no API key configured (GOOGLE_MAPS_API_KEY)".to_string(),
            );
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }
        if self.radius_meters() == 0 {
            errors.push("Nearby search radius cannot be 0".to_string());
        }

        (warnings, errors)
    }
}

/// Wayfarer's data directory.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wayfarer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_WF_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_WF_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_WF_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_WF_TEST}"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway_port(), 3000);
        assert_eq!(config.model_id(), "gemini-2.0-flash-lite");
        assert_eq!(config.radius_meters(), 500);
        assert_eq!(config.speech_lang(), "zh-TW");
        assert_eq!(config.gateway_url(), "http://127.0.0.1:3000");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.device_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_model_resolve_api_key() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_WF_MODEL_KEY", "from-env") };
        let model = ModelConfig {
            api_key_env: Some("TEST_WF_MODEL_KEY".into()),
            ..ModelConfig::default()
        };
        assert_eq!(model.resolve_api_key(), Some("from-env".into()));

        let model2 = ModelConfig {
            api_key: Some("direct-key".into()),
            api_key_env: Some("TEST_WF_MODEL_KEY".into()),
            ..ModelConfig::default()
        };
        // Direct key takes priority
        assert_eq!(model2.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_WF_MODEL_KEY") };
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/wayfarer/config.json")).unwrap();
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_load_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                gateway: { port: 8080 },
                maps: { radius_meters: 800, language: "en" },
                timeouts: { request_secs: 5 },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.gateway_port(), 8080);
        assert_eq!(config.max_body_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.radius_meters(), 800);
        assert_eq!(config.maps_language(), "en");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_logging_config_defaults() {
        let json_str = r#"{ "logging": {} }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_speech_defaults_point_at_env_keys() {
        let config = Config::default();
        assert_eq!(config.tts().api_key_env.as_deref(), Some("ELEVENLABS_API_KEY"));
        assert_eq!(config.transcription().provider, "groq");
    }

    #[test]
    fn test_partial_speech_sections_keep_env_keys() {
        let json_str = r#"{
            speech: {
                tts: { default_voice: "pNInz6obpgDQGcFmaJgB" },
                transcription: { model: "whisper-large-v3" },
            }
        }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let tts = config.tts();
        assert_eq!(tts.default_voice.as_deref(), Some("pNInz6obpgDQGcFmaJgB"));
        assert_eq!(tts.api_key_env.as_deref(), Some("ELEVENLABS_API_KEY"));
        assert_eq!(
            config.transcription().api_key_env.as_deref(),
            Some("GROQ_API_KEY")
        );
    }

    #[test]
    fn test_validate_zero_port_and_radius() {
        let config = Config {
            gateway: Some(GatewayConfig {
                port: 0,
                bind: None,
                max_body_bytes: 1024,
            }),
            maps: Some(MapsConfig {
                radius_meters: Some(0),
                ..MapsConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("port")));
        assert!(errors.iter().any(|e| e.contains("radius")));
    }
}
