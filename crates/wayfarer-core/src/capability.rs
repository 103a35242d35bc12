//! Host capability model.
//!
//! Device features (camera, microphone, speech engines, geolocation, the
//! mapping client) are probed once at startup and handed to components as
//! explicit values instead of being queried ad hoc.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A device or API feature the host may or may not expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Camera,
    Geolocation,
    SpeechRecognition,
    SpeechSynthesis,
    Maps,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Geolocation => "geolocation",
            Self::SpeechRecognition => "speech_recognition",
            Self::SpeechSynthesis => "speech_synthesis",
            Self::Maps => "maps",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a capability probe: the feature's handle, or nothing.
#[derive(Debug, Clone)]
pub enum Probe<T> {
    Present(T),
    Absent,
}

impl<T> Probe<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn as_ref(&self) -> Probe<&T> {
        match self {
            Self::Present(v) => Probe::Present(v),
            Self::Absent => Probe::Absent,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for Probe<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Absent,
        }
    }
}
