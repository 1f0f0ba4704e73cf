//! Speech input and output adapters
//!
//! The session only sees the [`SpeechInput`] and [`SpeechOutput`] traits.
//! Concrete backends: [`ConsoleOutput`] and [`UnavailableInput`] always, and
//! microphone/speaker backends with the `native-audio` feature.

mod endpoint;
mod input;
mod output;
mod params;
mod stt;
mod tts;

#[cfg(feature = "native-audio")]
mod capture;
#[cfg(feature = "native-audio")]
mod native;
#[cfg(feature = "native-audio")]
mod playback;

pub use endpoint::{Endpoint, UtteranceDetector, calculate_energy};
pub use input::{InputEvent, InputSink, SpeechInput, SpeechInputFactory, UnavailableInput};
pub use output::{ConsoleOutput, OutputEvent, OutputSink, SpeechOutput, SpeechRequest};
pub use params::{
    LanguageOption, Locale, PITCH_RANGE, RATE_RANGE, SUPPORTED_LANGUAGES, VOLUME_RANGE,
    VoiceParams,
};
pub use stt::{SpeechToText, SttProvider};
pub use tts::{TextToSpeech, TtsProvider};

#[cfg(feature = "native-audio")]
pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
#[cfg(feature = "native-audio")]
pub use native::{MicrophoneFactory, MicrophoneInput, SpeakerOutput};
#[cfg(feature = "native-audio")]
pub use playback::{AudioPlayback, PlaybackOutcome};
