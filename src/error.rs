//! Error types for the voice command session
//!
//! Every failure is terminal for the attempt that produced it. The session
//! records it in `SessionState::error` and returns to idle, so none of these
//! are fatal to the session itself.

use std::fmt;

use thiserror::Error;

/// Result type alias for voice command operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice command engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech recognition failed
    #[error("recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    /// Command dispatch failed
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Speech synthesis failed
    #[error("synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Input rejected before any work was attempted
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Session actor is no longer running
    #[error("session closed")]
    SessionClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Speech recognition failure, mirroring the platform recognizer error codes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// No speech was detected before the recognizer gave up
    #[error("no-speech")]
    NoSpeech,

    /// Capture was aborted by the platform
    #[error("aborted")]
    Aborted,

    /// Microphone could not be opened
    #[error("audio-capture")]
    AudioCapture,

    /// Recognition service unreachable
    #[error("network")]
    Network,

    /// Microphone permission denied
    #[error("not-allowed")]
    NotAllowed,

    /// Recognition service refused the request
    #[error("service-not-allowed")]
    ServiceNotAllowed,

    /// Locale not supported by the recognizer
    #[error("language-not-supported")]
    LanguageNotSupported,

    /// A capture is already running on this recognizer
    #[error("already-active")]
    AlreadyActive,

    /// Capture torn down before a result arrived (language change)
    #[error("interrupted")]
    Interrupted,

    /// No final result within the configured recognition timeout
    #[error("timed-out")]
    TimedOut,

    /// No recognizer available on this host
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other recognizer failure
    #[error("{0}")]
    Other(String),
}

impl RecognitionError {
    /// Map a platform error code (`"no-speech"`, `"not-allowed"`, ...) to a variant
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "language-not-supported" => Self::LanguageNotSupported,
            "already-active" => Self::AlreadyActive,
            "interrupted" => Self::Interrupted,
            "timed-out" => Self::TimedOut,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Command dispatch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Remote endpoint answered with a non-success status
    #[error("remote error: HTTP {0}")]
    Status(u16),

    /// Request never reached the endpoint or the connection failed
    #[error("network failure: {0}")]
    Network(String),

    /// Response body could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),

    /// No response within the configured dispatch timeout
    #[error("timed out waiting for response")]
    TimedOut,
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::TimedOut
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Speech synthesis failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    /// Playback failed on the platform
    #[error("playback failed: {0}")]
    Playback(String),

    /// No synthesizer available on this host
    #[error("synthesizer unavailable: {0}")]
    Unavailable(String),
}

/// Input rejected before an attempt started
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Typed command was empty after trimming
    #[error("command is empty")]
    EmptyCommand,

    /// Voice parameter outside its accepted range
    #[error("invalid parameter {name}: {value} not in [{min}, {max}]")]
    InvalidParameter {
        /// Parameter name (`rate`, `pitch`, `volume`)
        name: &'static str,
        /// Rejected value
        value: f32,
        /// Lower bound (inclusive)
        min: f32,
        /// Upper bound (inclusive)
        max: f32,
    },

    /// Locale tag not in `xx-XX` form
    #[error("invalid locale: {0}")]
    InvalidLocale(String),
}

/// Error recorded on the session for display, cleared on the next attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Speech recognition failed
    Recognition(RecognitionError),
    /// Command dispatch failed
    Dispatch(DispatchError),
    /// Speech synthesis failed
    Synthesis(SynthesisError),
    /// Input was rejected
    Validation(ValidationError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recognition(e) => write!(f, "recognition error: {e}"),
            Self::Dispatch(e) => write!(f, "dispatch error: {e}"),
            Self::Synthesis(e) => write!(f, "synthesis error: {e}"),
            Self::Validation(e) => write!(f, "validation error: {e}"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Recognition(e) => Self::Recognition(e),
            SessionError::Dispatch(e) => Self::Dispatch(e),
            SessionError::Synthesis(e) => Self::Synthesis(e),
            SessionError::Validation(e) => Self::Validation(e),
        }
    }
}
