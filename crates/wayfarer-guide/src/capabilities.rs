//! The set of host features a session was started with.

use std::sync::Arc;

use async_trait::async_trait;

use wayfarer_core::capability::{Capability, Probe};
use wayfarer_media::capture::CameraDevice;
use wayfarer_media::location::LocationProvider;
use wayfarer_media::speech::{RecognitionBackend, UtterancePlayer};
use wayfarer_providers::maps::{MapsLoader, MapsProvider};

/// Probed once at startup and injected into the session.
#[derive(Clone)]
pub struct Capabilities {
    pub camera: Probe<Arc<dyn CameraDevice>>,
    pub geolocation: Probe<Arc<dyn LocationProvider>>,
    pub speech_recognition: Probe<Arc<dyn RecognitionBackend>>,
    pub speech_synthesis: Probe<Arc<dyn UtterancePlayer>>,
    pub maps: Probe<Arc<dyn MapsLoader>>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            camera: Probe::Absent,
            geolocation: Probe::Absent,
            speech_recognition: Probe::Absent,
            speech_synthesis: Probe::Absent,
            maps: Probe::Absent,
        }
    }
}

impl Capabilities {
    /// Presence of every capability, in a fixed order.
    pub fn report(&self) -> Vec<(Capability, bool)> {
        vec![
            (Capability::Camera, self.camera.is_present()),
            (Capability::Geolocation, self.geolocation.is_present()),
            (Capability::SpeechRecognition, self.speech_recognition.is_present()),
            (Capability::SpeechSynthesis, self.speech_synthesis.is_present()),
            (Capability::Maps, self.maps.is_present()),
        ]
    }

    pub fn missing(&self) -> Vec<Capability> {
        self.report()
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(c, _)| c)
            .collect()
    }

    /// The maps loader, or one that always fails to initialize.
    pub fn maps_loader(&self) -> Arc<dyn MapsLoader> {
        match &self.maps {
            Probe::Present(loader) => loader.clone(),
            Probe::Absent => Arc::new(NoMaps),
        }
    }
}

struct NoMaps;

#[async_trait]
impl MapsLoader for NoMaps {
    async fn load(&self) -> anyhow::Result<Arc<dyn MapsProvider>> {
        anyhow::bail!("no mapping client on this host")
    }
}
