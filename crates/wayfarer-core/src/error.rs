use thiserror::Error;

use crate::capability::Capability;

/// Apology shown when the analysis endpoint cannot be reached or fails.
pub const APOLOGY_MESSAGE: &str = "抱歉，系統暫時無法處理您的請求，請稍後再試。";

/// Shown when any stage of the question pipeline fails.
pub const RETRY_MESSAGE: &str = "處理問題時發生錯誤，請再試一次。";

/// Diagnostic attached to a response when the analysis request failed.
pub const REQUEST_FAILED: &str = "API request failed";

/// Diagnostic returned by the gateway when the model call fails.
pub const SERVER_ERROR_MESSAGE: &str = "處理請求時發生錯誤";

#[derive(Debug, Error)]
pub enum GuideError {
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(Capability),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Geocoding unavailable: {0}")]
    GeocodingUnavailable(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Speech recognition already started")]
    AlreadyListening,

    #[error("No video frame available")]
    NoFrame,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GuideError {
    /// Short localized sentence safe to show to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::CapabilityUnavailable(Capability::SpeechRecognition) => {
                "您的裝置不支援語音識別功能"
            }
            Self::CapabilityUnavailable(Capability::SpeechSynthesis) => {
                "您的裝置不支援語音播放功能"
            }
            Self::CapabilityUnavailable(Capability::Camera) | Self::CameraUnavailable(_) => {
                "無法存取相機，請確認相機權限已開啟"
            }
            Self::CapabilityUnavailable(Capability::Geolocation)
            | Self::LocationUnavailable(_) => "無法獲取位置，請確認定位權限已開啟",
            Self::CapabilityUnavailable(Capability::Maps) => "地圖服務目前無法使用",
            Self::PermissionDenied(_) => "需要相機與定位權限才能使用導遊功能",
            Self::AlreadyListening => "正在聆聽中，請稍候",
            _ => RETRY_MESSAGE,
        }
    }
}

pub type Result<T> = std::result::Result<T, GuideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_never_leak_details() {
        let errors = [
            GuideError::Provider("HTTP 503 upstream reset".into()),
            GuideError::Timeout("geocode after 30s".into()),
            GuideError::GeocodingUnavailable("no api key".into()),
            GuideError::NoFrame,
        ];
        for e in errors {
            let msg = e.user_message();
            assert_eq!(msg, RETRY_MESSAGE);
            assert!(!msg.contains("HTTP"));
        }
    }

    #[test]
    fn test_capability_messages() {
        let e = GuideError::CapabilityUnavailable(Capability::SpeechRecognition);
        assert!(e.user_message().contains("語音識別"));

        let e = GuideError::CameraUnavailable("denied".into());
        assert!(e.user_message().contains("相機"));

        let e = GuideError::PermissionDenied("NotAllowedError".into());
        assert!(e.user_message().contains("權限"));

        let e = GuideError::LocationUnavailable("timed out".into());
        assert!(e.user_message().contains("位置"));
    }
}
