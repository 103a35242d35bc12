//! Capability probing for the command-line host.
//!
//! The terminal has no live camera, microphone or GPS, so each device is
//! backed by what the user passed on the command line and by which API keys
//! are configured.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use wayfarer_core::capability::Probe;
use wayfarer_core::config::Config;
use wayfarer_core::types::Coordinate;
use wayfarer_guide::Capabilities;
use wayfarer_media::capture::{CameraDevice, ImageFileCamera};
use wayfarer_media::location::{FixedLocation, LocationProvider};
use wayfarer_media::speech::{LogPlayer, RecognitionBackend, ScriptedRecognition, UtterancePlayer};
use wayfarer_media::stt::AudioFileRecognition;
use wayfarer_media::tts_stream::ElevenLabsPlayer;
use wayfarer_providers::maps::{GoogleMapsLoader, MapsLoader};

/// What the user supplied for this run.
#[derive(Debug, Default)]
pub struct HostInputs {
    pub image: Option<PathBuf>,
    pub question: Option<String>,
    pub audio: Option<PathBuf>,
    pub position: Option<Coordinate>,
    pub speak_to: Option<PathBuf>,
}

pub fn probe(config: &Config, inputs: &HostInputs) -> Capabilities {
    let camera: Probe<Arc<dyn CameraDevice>> = inputs
        .image
        .as_ref()
        .map(|path| Arc::new(ImageFileCamera::new(path)) as Arc<dyn CameraDevice>)
        .into();

    let geolocation: Probe<Arc<dyn LocationProvider>> = inputs
        .position
        .map(|at| Arc::new(FixedLocation::new(Some(at))) as Arc<dyn LocationProvider>)
        .into();

    Capabilities {
        camera,
        geolocation,
        speech_recognition: probe_recognition(config, inputs),
        speech_synthesis: probe_synthesis(config, inputs),
        maps: probe_maps(config),
    }
}

fn probe_recognition(config: &Config, inputs: &HostInputs) -> Probe<Arc<dyn RecognitionBackend>> {
    if let Some(question) = &inputs.question {
        return Probe::Present(Arc::new(ScriptedRecognition::new([question.clone()])));
    }
    let Some(audio) = &inputs.audio else {
        return Probe::Absent;
    };

    let transcription = config.transcription();
    if transcription.resolve_api_key().is_none() {
        warn!(provider = %transcription.provider, "No transcription API key, cannot recognize audio");
        return Probe::Absent;
    }
    match AudioFileRecognition::new(audio, transcription, config.request_timeout()) {
        Ok(backend) => Probe::Present(Arc::new(backend)),
        Err(e) => {
            warn!(%e, "Transcription client unavailable");
            Probe::Absent
        }
    }
}

fn probe_synthesis(config: &Config, inputs: &HostInputs) -> Probe<Arc<dyn UtterancePlayer>> {
    let Some(path) = &inputs.speak_to else {
        return Probe::Present(Arc::new(LogPlayer));
    };
    match ElevenLabsPlayer::new(config.tts(), path, config.request_timeout()) {
        Ok(player) => Probe::Present(Arc::new(player)),
        Err(e) => {
            warn!(%e, "Speech synthesis unavailable");
            Probe::Absent
        }
    }
}

fn probe_maps(config: &Config) -> Probe<Arc<dyn MapsLoader>> {
    let Some(api_key) = config.maps_api_key() else {
        return Probe::Absent;
    };
    Probe::Present(Arc::new(GoogleMapsLoader {
        api_key: Some(api_key),
        base_url: config.maps.as_ref().and_then(|m| m.base_url.clone()),
        language: config.maps_language(),
        timeout: config.request_timeout(),
    }))
}
