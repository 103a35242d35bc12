//! The question-answering session.
//!
//! A session owns the camera stream and the recognizer for its lifetime. Each
//! final transcript runs one question through the pipeline: capture a frame,
//! look up the address and nearby landmarks in parallel, compose the prompt,
//! call the inference gateway, then speak the answer. State changes are
//! published on a `watch` channel.
//!
//! Recognizer events are consumed by a session-owned task, so the end of a
//! listening session clears `is_listening` no matter who started it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wayfarer_core::capability::Capability;
use wayfarer_core::config::Config;
use wayfarer_core::error::{GuideError, RETRY_MESSAGE, Result};
use wayfarer_core::types::{AnalysisRequest, Coordinate, LocationContext};
use wayfarer_media::capture::{CaptureAdapter, StreamHandle};
use wayfarer_media::location::{LocationProvider, locate};
use wayfarer_media::speech::{Recognizer, RecognizerEvent, Speaker, create_recognizer};
use wayfarer_providers::maps::LazyMaps;

use crate::capabilities::Capabilities;
use crate::client::InferenceGateway;
use crate::prompt::{compose, format_landmarks, location_info};
use crate::resolver::{DEFAULT_RADIUS_METERS, PlaceResolver};

/// UI-facing session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_listening: bool,
    pub is_analyzing: bool,
    pub is_speaking: bool,
    pub last_question: String,
    pub last_answer: String,
    pub last_error: String,
    pub current_coordinate: Option<Coordinate>,
}

/// How a question ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOutcome {
    /// The model answered; the text is being spoken.
    Answered(String),
    /// Some stage failed; the retry message was shown instead.
    Failed(String),
    /// No frame or position yet, or another question was in flight.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// BCP-47 tag for recognition and synthesis.
    pub lang: String,
    pub radius_meters: u32,
    /// Bound on camera acquisition and the geolocation fix.
    pub device_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            lang: "zh-TW".into(),
            radius_meters: DEFAULT_RADIUS_METERS,
            device_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lang: config.speech_lang(),
            radius_meters: config.radius_meters(),
            device_timeout: config.device_timeout(),
        }
    }
}

/// What one listening session produced.
enum Heard {
    Nothing,
    Skipped,
    Asked(JoinHandle<QuestionOutcome>),
}

type Wiring = (
    mpsc::UnboundedReceiver<RecognizerEvent>,
    mpsc::UnboundedSender<Heard>,
);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The question pipeline and the state it publishes.
struct Pipeline {
    settings: SessionSettings,
    capture: Option<CaptureAdapter>,
    stream: Mutex<Option<Arc<StreamHandle>>>,
    resolver: PlaceResolver,
    gateway: Arc<dyn InferenceGateway>,
    speaker: Speaker,
    state: Arc<watch::Sender<SessionState>>,
    /// Set by teardown; answers finishing afterwards stay silent.
    closed: AtomicBool,
}

impl Pipeline {
    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(f);
    }

    fn current_stream(&self) -> Option<Arc<StreamHandle>> {
        lock(&self.stream).clone()
    }

    /// Claim the in-flight slot for `question`.
    ///
    /// `None` when there is no stream or position yet, or a question is
    /// already being analyzed.
    fn begin(&self, question: &str) -> Option<(Arc<StreamHandle>, Coordinate)> {
        let Some(stream) = self.current_stream() else {
            debug!("No camera stream yet, question ignored");
            return None;
        };
        let Some(at) = self.state.borrow().current_coordinate else {
            debug!("No position yet, question ignored");
            return None;
        };

        let mut started = false;
        self.state.send_if_modified(|s| {
            if s.is_analyzing {
                return false;
            }
            s.is_analyzing = true;
            s.last_question = question.to_string();
            started = true;
            true
        });
        started.then_some((stream, at))
    }

    /// Run a claimed question to completion and release the slot.
    async fn finish(&self, question: &str, stream: &StreamHandle, at: Coordinate) -> QuestionOutcome {
        info!(question, "Analyzing question");
        let outcome = match self.answer(question, stream, at).await {
            Ok(text) => {
                self.update(|s| {
                    s.last_answer = text.clone();
                    s.last_error.clear();
                });
                if self.closed.load(Ordering::SeqCst) {
                    debug!("Session closed, answer not spoken");
                } else {
                    self.speak(&text);
                }
                QuestionOutcome::Answered(text)
            }
            Err(e) => {
                warn!(%e, "Question failed");
                self.update(|s| s.last_answer = RETRY_MESSAGE.to_string());
                QuestionOutcome::Failed(RETRY_MESSAGE.to_string())
            }
        };

        self.update(|s| s.is_analyzing = false);
        outcome
    }

    async fn handle_question(&self, question: &str) -> QuestionOutcome {
        match self.begin(question) {
            Some((stream, at)) => self.finish(question, &stream, at).await,
            None => QuestionOutcome::Skipped,
        }
    }

    async fn answer(&self, question: &str, stream: &StreamHandle, at: Coordinate) -> Result<String> {
        let capture = self
            .capture
            .as_ref()
            .ok_or(GuideError::CapabilityUnavailable(Capability::Camera))?;
        let image = capture.capture(stream).await?;

        let (address, landmarks) = futures::join!(
            self.resolver.reverse_geocode(&at),
            self.resolver.nearby_landmarks(&at, self.settings.radius_meters),
        );
        let address = address.unwrap_or_else(|e| {
            warn!(%e, "Reverse geocoding failed, using coordinates");
            None
        });
        debug!(landmarks = landmarks.len(), has_address = address.is_some(), "Context resolved");

        let prompt = compose(
            question,
            &location_info(address.as_deref(), &at),
            &format_landmarks(&landmarks),
        );

        let response = self
            .gateway
            .analyze(AnalysisRequest {
                image,
                prompt,
                location: Some(LocationContext {
                    address,
                    coordinates: at,
                }),
            })
            .await;

        match response.error {
            Some(error) => Err(GuideError::Provider(error)),
            None => Ok(response.text),
        }
    }

    fn speak(&self, text: &str) {
        let on_start = self.state.clone();
        let on_end = self.state.clone();
        self.speaker.speak(
            text,
            Some(Box::new(move || on_start.send_modify(|s| s.is_speaking = true))),
            Some(Box::new(move || on_end.send_modify(|s| s.is_speaking = false))),
        );
    }
}

/// Consume recognizer events until the recognizer is detached.
///
/// A final transcript claims the in-flight slot and runs the question on its
/// own task; the session-end event clears `is_listening` independently and
/// reports what was heard.
async fn run_events(
    pipeline: Arc<Pipeline>,
    mut events: mpsc::UnboundedReceiver<RecognizerEvent>,
    heard_tx: mpsc::UnboundedSender<Heard>,
) {
    let mut heard = Heard::Nothing;
    while let Some(event) = events.recv().await {
        match event {
            RecognizerEvent::FinalTranscript(text) => {
                if !matches!(heard, Heard::Nothing) {
                    debug!("Question already heard, transcript dropped");
                    continue;
                }
                heard = match pipeline.begin(&text) {
                    Some((stream, at)) => {
                        let pipeline = pipeline.clone();
                        Heard::Asked(tokio::spawn(async move {
                            pipeline.finish(&text, &stream, at).await
                        }))
                    }
                    None => Heard::Skipped,
                };
            }
            RecognizerEvent::SessionEnded => {
                pipeline.update(|s| s.is_listening = false);
                let ended = std::mem::replace(&mut heard, Heard::Nothing);
                if heard_tx.send(ended).is_err() {
                    debug!("No one waiting on the listening session");
                }
            }
        }
    }
    debug!("Recognizer detached, event loop stopped");
}

pub struct GuideSession {
    pipeline: Arc<Pipeline>,
    location: Option<Arc<dyn LocationProvider>>,
    recognizer: Option<Recognizer>,
    wiring: Mutex<Option<Wiring>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    heard: tokio::sync::Mutex<mpsc::UnboundedReceiver<Heard>>,
}

impl GuideSession {
    pub fn new(
        capabilities: Capabilities,
        gateway: Arc<dyn InferenceGateway>,
        settings: SessionSettings,
    ) -> Self {
        let maps = Arc::new(LazyMaps::new(capabilities.maps_loader()));
        let capture = capabilities
            .camera
            .into_option()
            .map(|device| CaptureAdapter::new(device, settings.device_timeout));
        let recognizer = create_recognizer(capabilities.speech_recognition, &settings.lang);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Some(recognizer) = &recognizer {
            recognizer.attach(events_tx);
        }
        let (heard_tx, heard_rx) = mpsc::unbounded_channel();

        let speaker = Speaker::new(capabilities.speech_synthesis, settings.lang.clone());
        let (state, _) = watch::channel(SessionState::default());

        Self {
            pipeline: Arc::new(Pipeline {
                capture,
                stream: Mutex::new(None),
                resolver: PlaceResolver::new(maps),
                gateway,
                speaker,
                state: Arc::new(state),
                closed: AtomicBool::new(false),
                settings,
            }),
            location: capabilities.geolocation.into_option(),
            recognizer,
            wiring: Mutex::new(Some((events_rx, heard_tx))),
            event_loop: Mutex::new(None),
            heard: tokio::sync::Mutex::new(heard_rx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.pipeline.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.pipeline.state.borrow().clone()
    }

    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.pipeline.update(f);
    }

    fn record_error(&self, error: &GuideError) {
        let message = error.user_message().to_string();
        self.update(|s| s.last_error = message);
    }

    fn current_stream(&self) -> Option<Arc<StreamHandle>> {
        self.pipeline.current_stream()
    }

    /// Acquire the camera and a position fix.
    ///
    /// Fails only when no camera can be opened. A missing position or
    /// recognizer is recorded as a user-visible error but does not abort.
    /// Starting again replaces the stream and closes the previous one.
    pub async fn start(&self) -> Result<()> {
        let Some(capture) = &self.pipeline.capture else {
            let err = GuideError::CapabilityUnavailable(Capability::Camera);
            self.record_error(&err);
            return Err(err);
        };

        let handle = match capture.open(true).await {
            Ok(h) => Arc::new(h),
            Err(e) => {
                self.record_error(&e);
                return Err(e);
            }
        };
        let previous = lock(&self.pipeline.stream).replace(handle);
        if let Some(previous) = previous {
            debug!("Replacing camera stream");
            CaptureAdapter::close(&previous);
        }

        match &self.location {
            Some(provider) => {
                match locate(provider.as_ref(), self.pipeline.settings.device_timeout).await {
                    Ok(at) => {
                        info!(lat = at.latitude, lng = at.longitude, "Position fixed");
                        self.update(|s| s.current_coordinate = Some(at));
                    }
                    Err(e) => {
                        warn!(%e, "No position fix");
                        self.record_error(&e);
                    }
                }
            }
            None => {
                warn!("No geolocation on this host");
                self.record_error(&GuideError::CapabilityUnavailable(Capability::Geolocation));
            }
        }

        if self.recognizer.is_none() {
            self.record_error(&GuideError::CapabilityUnavailable(
                Capability::SpeechRecognition,
            ));
        }

        Ok(())
    }

    fn ensure_event_loop(&self) {
        let mut event_loop = lock(&self.event_loop);
        if event_loop.is_some() {
            return;
        }
        if let Some((events, heard_tx)) = lock(&self.wiring).take() {
            let pipeline = self.pipeline.clone();
            *event_loop = Some(tokio::spawn(run_events(pipeline, events, heard_tx)));
        }
    }

    /// Begin listening for a question.
    ///
    /// A no-op returning `false` while already listening or while a question
    /// is in flight. Whatever the recognizer hears is answered in the
    /// background; [`GuideSession::listen_once`] also waits for the result.
    pub fn start_listening(&self) -> bool {
        let mut allowed = false;
        self.pipeline.state.send_if_modified(|s| {
            if s.is_listening || s.is_analyzing {
                return false;
            }
            s.is_listening = true;
            allowed = true;
            true
        });
        if !allowed {
            debug!("Busy, not starting to listen");
            return false;
        }

        let started = match &self.recognizer {
            Some(recognizer) => {
                self.ensure_event_loop();
                recognizer.start()
            }
            None => Err(GuideError::CapabilityUnavailable(Capability::SpeechRecognition)),
        };
        match started {
            Ok(()) => {
                debug!("Listening");
                true
            }
            Err(e) => {
                warn!(%e, "Recognizer did not start");
                let message = e.user_message().to_string();
                self.update(|s| {
                    s.is_listening = false;
                    s.last_error = message;
                });
                false
            }
        }
    }

    /// Listen for one question and answer it.
    ///
    /// Returns once the recognizer session has ended and any question it
    /// produced has finished; `None` if listening did not start or nothing
    /// was heard.
    pub async fn listen_once(&self) -> Option<QuestionOutcome> {
        let mut heard = self.heard.lock().await;
        while heard.try_recv().is_ok() {
            debug!("Discarding result of an earlier listening session");
        }
        if !self.start_listening() {
            return None;
        }

        match heard.recv().await? {
            Heard::Nothing => None,
            Heard::Skipped => Some(QuestionOutcome::Skipped),
            Heard::Asked(question) => match question.await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(%e, "Question task ended abnormally");
                    None
                }
            },
        }
    }

    /// Run one question through the pipeline.
    pub async fn handle_question(&self, question: &str) -> QuestionOutcome {
        self.pipeline.handle_question(question).await
    }

    /// Wait until the spoken answer has finished.
    pub async fn finish_speaking(&self) {
        self.pipeline.speaker.drain().await;
    }

    /// Stop the camera, cancel speech and detach the recognizer.
    ///
    /// Runs again on drop; repeated calls are harmless.
    pub fn shutdown(&self) {
        self.pipeline.closed.store(true, Ordering::SeqCst);
        if let Some(stream) = self.current_stream() {
            CaptureAdapter::close(&stream);
        }
        self.pipeline.speaker.stop_all();
        if let Some(recognizer) = &self.recognizer {
            recognizer.detach();
            recognizer.abort();
        }
        if let Some(event_loop) = lock(&self.event_loop).take() {
            event_loop.abort();
        }
        self.update(|s| {
            s.is_listening = false;
            s.is_speaking = false;
        });
    }
}

impl Drop for GuideSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
