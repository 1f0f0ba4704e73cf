//! Microphone and speaker adapters backed by HTTP speech services
//!
//! Capture runs on a dedicated thread because `cpal` streams are not `Send`.
//! Each capture is single-shot: endpointing decides when the command ended,
//! then the utterance is transcribed once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use super::endpoint::{Endpoint, UtteranceDetector};
use super::playback::AudioPlayback;
use super::{
    InputEvent, InputSink, Locale, OutputEvent, OutputSink, SpeechInput, SpeechInputFactory,
    SpeechOutput, SpeechRequest, SpeechToText, TextToSpeech,
};
use crate::Error;
use crate::error::{RecognitionError, SynthesisError};

/// Poll interval for the capture buffer
const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Builds [`MicrophoneInput`] recognizers
#[derive(Clone)]
pub struct MicrophoneFactory {
    stt: SpeechToText,
}

impl MicrophoneFactory {
    /// Use `stt` to transcribe captured utterances
    #[must_use]
    pub const fn new(stt: SpeechToText) -> Self {
        Self { stt }
    }
}

impl SpeechInputFactory for MicrophoneFactory {
    fn create(&self, locale: &Locale, sink: InputSink) -> Box<dyn SpeechInput> {
        tracing::debug!(%locale, "creating microphone recognizer");
        Box::new(MicrophoneInput {
            stt: self.stt.clone(),
            sink,
            capture: None,
        })
    }
}

/// Flags shared with the capture thread
struct CaptureFlags {
    /// Finish early, transcribing speech already heard
    stop: AtomicBool,
    /// Discard the capture; the recognizer is gone
    abort: AtomicBool,
    done: AtomicBool,
}

/// Default microphone recognizer
pub struct MicrophoneInput {
    stt: SpeechToText,
    sink: InputSink,
    capture: Option<Arc<CaptureFlags>>,
}

#[async_trait]
impl SpeechInput for MicrophoneInput {
    async fn start(&mut self, locale: &Locale) -> Result<(), RecognitionError> {
        if self
            .capture
            .as_ref()
            .is_some_and(|c| !c.done.load(Ordering::Acquire))
        {
            return Err(RecognitionError::AlreadyActive);
        }

        let flags = Arc::new(CaptureFlags {
            stop: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            done: AtomicBool::new(false),
        });
        let (ready_tx, ready_rx) = oneshot::channel();

        let job = CaptureJob {
            stt: self.stt.clone(),
            sink: self.sink.clone(),
            language: locale.language().to_string(),
            flags: Arc::clone(&flags),
            runtime: Handle::current(),
        };

        std::thread::Builder::new()
            .name("voicecmd-capture".to_string())
            .spawn(move || job.run(ready_tx))
            .map_err(|e| RecognitionError::Other(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| RecognitionError::AudioCapture)??;

        self.capture = Some(flags);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(flags) = &self.capture {
            flags.stop.store(true, Ordering::Release);
        }
    }
}

impl Drop for MicrophoneInput {
    fn drop(&mut self) {
        if let Some(flags) = &self.capture {
            flags.abort.store(true, Ordering::Release);
        }
    }
}

/// One capture attempt, owned by the capture thread
struct CaptureJob {
    stt: SpeechToText,
    sink: InputSink,
    language: String,
    flags: Arc<CaptureFlags>,
    runtime: Handle,
}

impl CaptureJob {
    fn run(self, ready: oneshot::Sender<Result<(), RecognitionError>>) {
        let mut capture = match AudioCapture::new().and_then(|mut c| c.start().map(|()| c)) {
            Ok(c) => {
                let _ = ready.send(Ok(()));
                c
            }
            Err(e) => {
                self.flags.done.store(true, Ordering::Release);
                let _ = ready.send(Err(e));
                return;
            }
        };

        self.sink.emit(InputEvent::Started);

        let mut detector = UtteranceDetector::new();
        let utterance = loop {
            if self.flags.abort.load(Ordering::Acquire) {
                tracing::debug!("capture aborted");
                break None;
            }
            if self.flags.stop.load(Ordering::Acquire) {
                detector.process(&capture.take_buffer());
                let speech = detector.finish();
                tracing::debug!(finalized = speech.is_some(), "capture stopped early");
                break speech;
            }

            std::thread::sleep(CHUNK_INTERVAL);

            match detector.process(&capture.take_buffer()) {
                Endpoint::Waiting | Endpoint::Capturing => {}
                Endpoint::Complete => break Some(detector.take_speech_buffer()),
                Endpoint::NoSpeech => {
                    self.sink.emit(InputEvent::Error(RecognitionError::NoSpeech));
                    break None;
                }
            }
        };

        capture.stop();

        if let Some(samples) = utterance.filter(|_| !self.flags.abort.load(Ordering::Acquire)) {
            match self.transcribe(&samples) {
                Ok(text) => self.sink.emit(InputEvent::FinalResult(text.trim().to_string())),
                Err(e) => self.sink.emit(InputEvent::Error(e)),
            }
        }

        self.flags.done.store(true, Ordering::Release);
        self.sink.emit(InputEvent::Stopped);
    }

    fn transcribe(&self, samples: &[f32]) -> Result<String, RecognitionError> {
        let wav = samples_to_wav(samples, SAMPLE_RATE)?;
        self.runtime
            .block_on(self.stt.transcribe(&wav, &self.language))
            .map_err(|e| match e {
                Error::Recognition(r) => r,
                other => {
                    tracing::warn!(error = %other, "transcription failed");
                    RecognitionError::Network
                }
            })
    }
}

/// One utterance in flight
struct Utterance {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Speaker output using HTTP synthesis and local playback
pub struct SpeakerOutput {
    tts: TextToSpeech,
    playback: Arc<AudioPlayback>,
    current: Option<Utterance>,
}

impl SpeakerOutput {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is usable
    pub fn new(tts: TextToSpeech) -> Result<Self, SynthesisError> {
        Ok(Self {
            tts,
            playback: Arc::new(AudioPlayback::new()?),
            current: None,
        })
    }
}

#[async_trait]
impl SpeechOutput for SpeakerOutput {
    async fn speak(
        &mut self,
        request: SpeechRequest,
        sink: OutputSink,
    ) -> Result<(), SynthesisError> {
        self.cancel().await;

        let cancel = Arc::new(AtomicBool::new(false));
        let tts = self.tts.clone();
        let playback = Arc::clone(&self.playback);
        let flag = Arc::clone(&cancel);

        let task = tokio::spawn(async move {
            let synthesized = tts
                .synthesize(&request.text, &request.params, &request.locale)
                .await;
            let audio = match synthesized {
                Ok(audio) => audio,
                Err(e) => {
                    let err = match e {
                        Error::Synthesis(s) => s,
                        other => SynthesisError::Playback(other.to_string()),
                    };
                    sink.emit(OutputEvent::Error(err));
                    return;
                }
            };

            sink.emit(OutputEvent::Started);
            let volume = request.params.volume();
            let played = tokio::task::spawn_blocking(move || {
                playback.play_mp3_blocking(&audio, volume, &flag)
            })
            .await;

            match played {
                Ok(Ok(_)) => sink.emit(OutputEvent::Ended),
                Ok(Err(e)) => sink.emit(OutputEvent::Error(e)),
                Err(e) => sink.emit(OutputEvent::Error(SynthesisError::Playback(e.to_string()))),
            }
        });

        self.current = Some(Utterance { cancel, task });
        Ok(())
    }

    async fn cancel(&mut self) {
        if let Some(utterance) = self.current.take() {
            utterance.cancel.store(true, Ordering::Release);
            utterance.task.abort();
            tracing::debug!("utterance canceled");
        }
    }
}
