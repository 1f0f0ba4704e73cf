//! Voice command session
//!
//! The session owns the phase (`Idle`, `Listening`, `Processing`,
//! `Speaking`) and arbitrates between microphone, webhook and speaker.
//! [`Machine`] holds the transition rules; [`Session`] runs them against real
//! adapters.

mod machine;
mod runtime;
mod state;

pub use machine::{Effect, Event, Machine, Rejection, Step};
pub use runtime::{Session, SessionHandle};
pub use state::{InputMethod, Phase, SessionState, Severity, Status, StructuredResult};
