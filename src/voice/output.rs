//! Speech output adapter contract

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Locale, VoiceParams};
use crate::error::SynthesisError;

/// Event emitted by a speech output adapter for one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Playback began
    Started,
    /// Playback finished or was canceled
    Ended,
    /// Playback failed
    Error(SynthesisError),
}

/// Destination for output adapter events of a single utterance
#[derive(Clone)]
pub struct OutputSink {
    emit: Arc<dyn Fn(OutputEvent) + Send + Sync>,
}

impl OutputSink {
    /// Wrap a callback
    pub fn new(emit: impl Fn(OutputEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Deliver an event
    pub fn emit(&self, event: OutputEvent) {
        (self.emit)(event);
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// What to say and how
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    /// Text to speak
    pub text: String,
    /// Rate, pitch and volume
    pub params: VoiceParams,
    /// Voice locale
    pub locale: Locale,
}

/// A speech synthesizer
#[async_trait]
pub trait SpeechOutput: Send {
    /// Cancel anything in progress, then play `request`
    ///
    /// Playback completes asynchronously; `Ended` or `Error` is reported
    /// through `sink`.
    ///
    /// # Errors
    ///
    /// Returns error if playback cannot be started at all
    async fn speak(&mut self, request: SpeechRequest, sink: OutputSink)
    -> Result<(), SynthesisError>;

    /// Stop playback immediately; no-op if nothing is playing
    async fn cancel(&mut self);
}

/// Synthesizer that prints utterances instead of playing them
pub struct ConsoleOutput<W> {
    writer: Arc<Mutex<W>>,
}

impl ConsoleOutput<std::io::Stdout> {
    /// Print to standard output
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleOutput<W> {
    /// Print to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Shared handle to the underlying writer
    #[must_use]
    pub fn writer(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.writer)
    }
}

#[async_trait]
impl<W: Write + Send + 'static> SpeechOutput for ConsoleOutput<W> {
    async fn speak(
        &mut self,
        request: SpeechRequest,
        sink: OutputSink,
    ) -> Result<(), SynthesisError> {
        sink.emit(OutputEvent::Started);

        let written = {
            let mut writer = self
                .writer
                .lock()
                .map_err(|_| SynthesisError::Playback("console writer poisoned".to_string()))?;
            writeln!(writer, "🔊 {}", request.text).and_then(|()| writer.flush())
        };

        match written {
            Ok(()) => sink.emit(OutputEvent::Ended),
            Err(e) => sink.emit(OutputEvent::Error(SynthesisError::Playback(e.to_string()))),
        }

        Ok(())
    }

    async fn cancel(&mut self) {}
}
