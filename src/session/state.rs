//! Session state record

use serde::Serialize;

use crate::dispatch::Record;
use crate::error::SessionError;
use crate::voice::{Locale, VoiceParams};

/// Mutually exclusive session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Phase {
    /// Ready for a new command
    #[default]
    Idle,
    /// Microphone capture running
    Listening,
    /// Command sent, waiting for or routing the reply
    Processing,
    /// Reply being spoken
    Speaking,
}

/// Channel that produced the current command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InputMethod {
    /// Spoken and recognized
    #[default]
    Voice,
    /// Typed
    Text,
}

/// Structured data carried by the last reply
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StructuredResult {
    /// Nothing to render
    #[default]
    None,
    /// Render as chart
    Chart(Vec<Record>),
    /// Render as table
    Table(Vec<Record>),
    /// Render as chart and table
    Both(Vec<Record>),
}

impl StructuredResult {
    /// Records to chart, if any
    #[must_use]
    pub fn chart(&self) -> Option<&[Record]> {
        match self {
            Self::Chart(rows) | Self::Both(rows) => Some(rows),
            Self::None | Self::Table(_) => None,
        }
    }

    /// Records to tabulate, if any
    #[must_use]
    pub fn table(&self) -> Option<&[Record]> {
        match self {
            Self::Table(rows) | Self::Both(rows) => Some(rows),
            Self::None | Self::Chart(_) => None,
        }
    }

    /// Whether there is nothing to render
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Status line shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Waiting for the user
    Ready,
    /// Capturing speech
    Listening,
    /// Waiting for the webhook
    Processing,
    /// Speaking the reply
    Speaking,
}

impl Status {
    /// Short label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Listening => "listening...",
            Self::Processing => "processing...",
            Self::Speaking => "speaking...",
        }
    }
}

/// How the status line should be emphasized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Last attempt failed
    Error,
    /// Microphone open
    Active,
    /// Work in progress
    Busy,
    /// A reply is available
    Success,
    /// Nothing happening
    Neutral,
}

/// The single source of truth for one UI session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Current phase
    pub phase: Phase,
    /// Channel of the current command
    pub input_method: InputMethod,
    /// Last finalized command text
    pub transcript: String,
    /// Last textual reply
    pub response: Option<String>,
    /// Structured data of the last reply
    pub structured: StructuredResult,
    /// Last error, cleared by the next attempt
    pub error: Option<SessionError>,
    /// Synthesis parameters
    pub voice: VoiceParams,
    /// Recognition and synthesis locale
    pub language: Locale,

    /// Current command attempt; stale dispatch results and timers carry older ids
    pub(crate) attempt: u64,
    /// Current recognizer instance; bumped whenever it is rebuilt
    pub(crate) input_generation: u64,
    /// Current utterance; events of canceled utterances carry older ids
    pub(crate) utterance: u64,
    /// Text waiting for the speak delay to elapse
    pub(crate) pending_speech: Option<String>,
}

impl SessionState {
    /// Fresh idle state
    #[must_use]
    pub fn new(language: Locale, voice: VoiceParams) -> Self {
        Self {
            phase: Phase::Idle,
            input_method: InputMethod::Voice,
            transcript: String::new(),
            response: None,
            structured: StructuredResult::None,
            error: None,
            voice,
            language,
            attempt: 0,
            input_generation: 0,
            utterance: 0,
            pending_speech: None,
        }
    }

    /// Shorthand for `phase == Idle`
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Status line for the current phase
    #[must_use]
    pub const fn status(&self) -> Status {
        match self.phase {
            Phase::Idle => Status::Ready,
            Phase::Listening => Status::Listening,
            Phase::Processing => Status::Processing,
            Phase::Speaking => Status::Speaking,
        }
    }

    /// Emphasis for the status line; an error wins over everything
    #[must_use]
    pub const fn severity(&self) -> Severity {
        if self.error.is_some() {
            return Severity::Error;
        }
        match self.phase {
            Phase::Listening => Severity::Active,
            Phase::Processing | Phase::Speaking => Severity::Busy,
            Phase::Idle if self.response.is_some() => Severity::Success,
            Phase::Idle => Severity::Neutral,
        }
    }

    /// Clear the outputs of the previous attempt
    pub(crate) fn clear_outputs(&mut self) {
        self.response = None;
        self.structured = StructuredResult::None;
        self.error = None;
        self.pending_speech = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(Locale::default(), VoiceParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;

    #[test]
    fn test_structured_views() {
        let rows = vec![Record::default()];
        let both = StructuredResult::Both(rows.clone());
        assert_eq!(both.chart().map(<[Record]>::len), Some(1));
        assert_eq!(both.table().map(<[Record]>::len), Some(1));

        let chart = StructuredResult::Chart(rows);
        assert!(chart.table().is_none());
        assert!(StructuredResult::None.is_none());
    }

    #[test]
    fn test_severity_precedence() {
        let mut state = SessionState::default();
        assert_eq!(state.severity(), Severity::Neutral);
        assert_eq!(state.status(), Status::Ready);

        state.response = Some("ok".to_string());
        assert_eq!(state.severity(), Severity::Success);

        state.phase = Phase::Speaking;
        assert_eq!(state.severity(), Severity::Busy);
        assert_eq!(state.status().label(), "speaking...");

        state.error = Some(SessionError::Dispatch(DispatchError::TimedOut));
        assert_eq!(state.severity(), Severity::Error);
    }
}
