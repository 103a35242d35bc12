//! Speech I/O: one-shot recognition and single-voice synthesis.
//!
//! A [`Recognizer`] wraps a [`RecognitionBackend`] with the fixed one-shot
//! configuration and reports through two event kinds: a final transcript and
//! the end of the listening session. A [`Speaker`] plays at most one utterance
//! at a time; starting a new one cancels the previous.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wayfarer_core::capability::Probe;
use wayfarer_core::error::{GuideError, Result};

/// Recognizer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerConfig {
    pub continuous: bool,
    pub interim_results: bool,
    pub lang: String,
    pub max_alternatives: u32,
}

impl RecognizerConfig {
    /// Single-shot, final results only, one alternative.
    pub fn one_shot(lang: impl Into<String>) -> Self {
        Self {
            continuous: false,
            interim_results: false,
            lang: lang.into(),
            max_alternatives: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    FinalTranscript(String),
    SessionEnded,
}

/// Engine that turns one spoken utterance into text.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Listen once and return the final transcript, or `None` if nothing was heard.
    async fn recognize_once(&self, config: &RecognizerConfig) -> anyhow::Result<Option<String>>;
}

/// Returns pre-typed questions in order; useful when the user types instead of speaking.
pub struct ScriptedRecognition {
    transcripts: Mutex<VecDeque<String>>,
}

impl ScriptedRecognition {
    pub fn new<I, S>(transcripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transcripts: Mutex::new(transcripts.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl RecognitionBackend for ScriptedRecognition {
    async fn recognize_once(&self, _config: &RecognizerConfig) -> anyhow::Result<Option<String>> {
        let mut queue = self
            .transcripts
            .lock()
            .map_err(|_| anyhow::anyhow!("transcript queue poisoned"))?;
        Ok(queue.pop_front())
    }
}

type EventSink = Arc<Mutex<Option<mpsc::UnboundedSender<RecognizerEvent>>>>;

/// Handle to the host speech recognizer.
pub struct Recognizer {
    backend: Arc<dyn RecognitionBackend>,
    config: RecognizerConfig,
    listening: Arc<AtomicBool>,
    sink: EventSink,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Create a recognizer, or `None` when the host cannot recognize speech.
pub fn create_recognizer(
    backend: Probe<Arc<dyn RecognitionBackend>>,
    lang: &str,
) -> Option<Recognizer> {
    let backend = backend.into_option()?;
    Some(Recognizer {
        backend,
        config: RecognizerConfig::one_shot(lang),
        listening: Arc::new(AtomicBool::new(false)),
        sink: Arc::new(Mutex::new(None)),
        task: Mutex::new(None),
    })
}

fn emit(sink: &EventSink, event: RecognizerEvent) {
    let guard = match sink.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(tx) = guard.as_ref() {
        if tx.send(event).is_err() {
            debug!("Recognizer event receiver dropped");
        }
    }
}

impl Recognizer {
    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Route transcript and session-end events to `tx`.
    pub fn attach(&self, tx: mpsc::UnboundedSender<RecognizerEvent>) {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = Some(tx);
        }
    }

    /// Clear both event slots; later events are dropped.
    pub fn detach(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = None;
        }
    }

    /// Begin one listening session.
    ///
    /// Fails with [`GuideError::AlreadyListening`] while a session is active.
    pub fn start(&self) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(GuideError::AlreadyListening);
        }

        let backend = self.backend.clone();
        let config = self.config.clone();
        let listening = self.listening.clone();
        let sink = self.sink.clone();

        let handle = tokio::spawn(async move {
            match backend.recognize_once(&config).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    info!(chars = text.chars().count(), "Final transcript");
                    emit(&sink, RecognizerEvent::FinalTranscript(text.trim().to_string()));
                }
                Ok(_) => debug!("No speech recognized"),
                Err(e) => warn!(%e, "Speech recognition failed"),
            }
            listening.store(false, Ordering::SeqCst);
            emit(&sink, RecognizerEvent::SessionEnded);
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }

    /// Abort an active session without delivering a transcript.
    pub fn abort(&self) {
        let handle = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            handle.abort();
        }
        if self.listening.swap(false, Ordering::SeqCst) {
            emit(&self.sink, RecognizerEvent::SessionEnded);
        }
    }
}

/// Text to be spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
}

/// Audio output for utterances.
#[async_trait]
pub trait UtterancePlayer: Send + Sync {
    /// Play the utterance to completion. Dropping the future stops playback.
    async fn play(&self, utterance: &Utterance) -> anyhow::Result<()>;
}

/// A player with no audio device: logs the text and finishes immediately.
pub struct LogPlayer;

#[async_trait]
impl UtterancePlayer for LogPlayer {
    async fn play(&self, utterance: &Utterance) -> anyhow::Result<()> {
        info!(lang = %utterance.lang, text = %utterance.text, "Speaking");
        Ok(())
    }
}

pub type SpeechCallback = Box<dyn FnOnce() + Send + 'static>;

struct Playback {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Plays utterances one at a time.
pub struct Speaker {
    player: Option<Arc<dyn UtterancePlayer>>,
    lang: String,
    current: Mutex<Option<Playback>>,
}

impl Speaker {
    pub fn new(player: Probe<Arc<dyn UtterancePlayer>>, lang: impl Into<String>) -> Self {
        Self {
            player: player.into_option(),
            lang: lang.into(),
            current: Mutex::new(None),
        }
    }

    pub fn is_available(&self) -> bool {
        self.player.is_some()
    }

    /// Speak `text`, cancelling whatever is playing.
    ///
    /// `on_start` runs when playback begins, after the superseded utterance has
    /// ended. `on_end` runs when playback completes or is cancelled. Without a
    /// player this does nothing.
    pub fn speak(
        &self,
        text: &str,
        on_start: Option<SpeechCallback>,
        on_end: Option<SpeechCallback>,
    ) {
        let Some(player) = self.player.clone() else {
            debug!("No speech synthesis available");
            return;
        };

        let utterance = Utterance {
            text: text.to_string(),
            lang: self.lang.clone(),
        };

        let mut current = match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let previous = current.take().map(|p| {
            p.cancel.cancel();
            p.task
        });

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            if token.is_cancelled() {
                if let Some(cb) = on_end {
                    cb();
                }
                return;
            }
            if let Some(cb) = on_start {
                cb();
            }
            tokio::select! {
                _ = token.cancelled() => debug!("Utterance cancelled"),
                result = player.play(&utterance) => {
                    if let Err(e) = result {
                        warn!(%e, "Speech playback failed");
                    }
                }
            }
            if let Some(cb) = on_end {
                cb();
            }
        });

        *current = Some(Playback { cancel, task });
    }

    /// Wait for the current utterance, if any, to finish playing.
    pub async fn drain(&self) {
        let current = match self.current.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(playback) = current {
            let _ = playback.task.await;
        }
    }

    /// Cancel any in-flight utterance. Safe to call repeatedly.
    pub fn stop_all(&self) {
        let current = match self.current.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(playback) = current {
            playback.cancel.cancel();
        }
    }
}
