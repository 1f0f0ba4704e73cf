//! Speech input adapter contract
//!
//! A recognizer performs single-shot captures: one `start` yields at most one
//! final transcript, then `Stopped`. Events are delivered through an
//! [`InputSink`] rather than by touching session state directly.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::Locale;
use crate::error::RecognitionError;

/// Event emitted by a speech input adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Microphone acquired, capture running
    Started,
    /// Partial hypothesis (ignored by the session)
    Interim(String),
    /// Finalized utterance
    FinalResult(String),
    /// Recognition failed
    Error(RecognitionError),
    /// Capture ended for any reason
    Stopped,
}

/// Destination for input adapter events
#[derive(Clone)]
pub struct InputSink {
    emit: Arc<dyn Fn(InputEvent) + Send + Sync>,
}

impl InputSink {
    /// Wrap a callback
    pub fn new(emit: impl Fn(InputEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Deliver an event
    pub fn emit(&self, event: InputEvent) {
        (self.emit)(event);
    }
}

impl fmt::Debug for InputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSink").finish_non_exhaustive()
    }
}

/// A speech recognizer bound to one locale
#[async_trait]
pub trait SpeechInput: Send {
    /// Begin a single capture attempt
    ///
    /// # Errors
    ///
    /// Returns `AlreadyActive` if a capture is already running, or any error
    /// preventing the microphone from opening
    async fn start(&mut self, locale: &Locale) -> Result<(), RecognitionError>;

    /// End the current capture early; `Stopped` follows. No-op when idle.
    async fn stop(&mut self);
}

/// Builds recognizers; called again whenever the session language changes
pub trait SpeechInputFactory: Send + Sync {
    /// Create a recognizer for `locale` that reports into `sink`
    fn create(&self, locale: &Locale, sink: InputSink) -> Box<dyn SpeechInput>;
}

/// Recognizer used when the host has no speech recognition
#[derive(Debug, Clone, Default)]
pub struct UnavailableInput {
    reason: String,
}

impl UnavailableInput {
    /// Create with a human-readable reason reported on every `start`
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SpeechInput for UnavailableInput {
    async fn start(&mut self, _locale: &Locale) -> Result<(), RecognitionError> {
        Err(RecognitionError::Unavailable(self.reason.clone()))
    }

    async fn stop(&mut self) {}
}

impl SpeechInputFactory for UnavailableInput {
    fn create(&self, _locale: &Locale, _sink: InputSink) -> Box<dyn SpeechInput> {
        Box::new(self.clone())
    }
}
