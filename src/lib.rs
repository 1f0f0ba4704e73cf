//! Voice Command - Voice and text command session for workflow webhooks
//!
//! This library provides the core of a voice-driven command assistant:
//! - Session state machine arbitrating microphone, webhook and speaker
//! - Command dispatch to an HTTP workflow webhook with staged replies
//! - Speech input/output adapters (console, and native audio with STT/TTS)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Presentation (CLI)                   │
//! │   triggers  ──────────────►  watch<SessionState>    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Session actor                       │
//! │   Idle │ Listening │ Processing │ Speaking           │
//! └──────┬─────────────────┬─────────────────┬──────────┘
//!        │                 │                 │
//! ┌──────▼──────┐  ┌───────▼───────┐  ┌──────▼──────┐
//! │ SpeechInput │  │  Dispatcher   │  │SpeechOutput │
//! │  mic + STT  │  │ HTTP webhook  │  │ TTS + audio │
//! └─────────────┘  └───────────────┘  └─────────────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod voice;

pub use config::Config;
pub use dispatch::{CommandDispatcher, HttpDispatcher, Record, Reply, Stage};
pub use error::{Error, Result, SessionError};
pub use session::{Phase, Session, SessionHandle, SessionState, StructuredResult};
pub use voice::{Locale, VoiceParams};
