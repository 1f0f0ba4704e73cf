//! Utterance endpointing for single-shot capture
//!
//! Decides when one spoken command has started and finished using RMS energy
//! over fixed-size chunks. Recognition itself happens after the utterance is
//! complete.

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to accept (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Trailing silence that ends an utterance (in samples)
const SILENCE_SAMPLES: usize = 12_800; // 0.8 seconds

/// Silence before any speech after which the attempt gives up (in samples)
const NO_SPEECH_SAMPLES: usize = 128_000; // 8 seconds

/// Where the detector is within one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// No speech heard yet
    Waiting,
    /// Speech in progress
    Capturing,
    /// Speech followed by enough silence
    Complete,
    /// Nothing but silence for too long
    NoSpeech,
}

/// Tracks one utterance from onset to trailing silence
#[derive(Debug)]
pub struct UtteranceDetector {
    state: Endpoint,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    leading_silence: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    /// Create a detector waiting for speech
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Endpoint::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            leading_silence: 0,
        }
    }

    /// Feed a chunk of samples and return the updated endpoint state
    pub fn process(&mut self, samples: &[f32]) -> Endpoint {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            Endpoint::Waiting => {
                if is_speech {
                    self.state = Endpoint::Capturing;
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech onset");
                } else {
                    self.leading_silence += samples.len();
                    if self.leading_silence > NO_SPEECH_SAMPLES {
                        tracing::debug!("no speech before timeout");
                        self.state = Endpoint::NoSpeech;
                    }
                }
            }
            Endpoint::Capturing => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    if self.speech_buffer.len() > MIN_SPEECH_SAMPLES + self.silence_counter {
                        tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                        self.state = Endpoint::Complete;
                    } else {
                        // Too short to be a command; treat as a click and keep waiting
                        tracing::trace!("discarding short burst");
                        self.leading_silence += self.speech_buffer.len();
                        self.speech_buffer.clear();
                        self.silence_counter = 0;
                        self.state = Endpoint::Waiting;
                    }
                }
            }
            Endpoint::Complete | Endpoint::NoSpeech => {}
        }

        self.state
    }

    /// End the capture early, keeping the speech heard so far
    ///
    /// Returns the utterance when enough speech was buffered to be a command.
    pub fn finish(&mut self) -> Option<Vec<f32>> {
        match self.state {
            Endpoint::Capturing | Endpoint::Complete
                if self.speech_buffer.len() >= MIN_SPEECH_SAMPLES =>
            {
                self.state = Endpoint::Complete;
                Some(self.take_speech_buffer())
            }
            _ => {
                self.speech_buffer.clear();
                None
            }
        }
    }

    /// Current endpoint state
    #[must_use]
    pub const fn state(&self) -> Endpoint {
        self.state
    }

    /// Samples of the utterance so far
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Take the utterance samples, clearing the buffer
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.speech_buffer)
    }

    /// Reset to waiting
    pub fn reset(&mut self) {
        self.state = Endpoint::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
        self.leading_silence = 0;
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<f32> {
        vec![0.3; len]
    }

    fn silence(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    #[test]
    fn test_energy_calculation() {
        assert!(calculate_energy(&silence(100)) < 0.001);
        assert!(calculate_energy(&[0.5; 100]) > 0.4);
        assert!(calculate_energy(&[]) < f32::EPSILON);
    }

    #[test]
    fn test_complete_after_trailing_silence() {
        let mut detector = UtteranceDetector::new();

        assert_eq!(detector.process(&silence(1600)), Endpoint::Waiting);
        assert_eq!(detector.process(&tone(8000)), Endpoint::Capturing);
        assert_eq!(detector.process(&silence(6400)), Endpoint::Capturing);
        assert_eq!(detector.process(&silence(8000)), Endpoint::Complete);

        let utterance = detector.take_speech_buffer();
        assert_eq!(utterance.len(), 8000 + 6400 + 8000);
        assert!(detector.speech_buffer().is_empty());
    }

    #[test]
    fn test_short_burst_is_discarded() {
        let mut detector = UtteranceDetector::new();

        detector.process(&tone(800));
        assert_eq!(detector.process(&silence(16_000)), Endpoint::Waiting);
        assert!(detector.speech_buffer().is_empty());
    }

    #[test]
    fn test_finish_keeps_speech_in_progress() {
        let mut detector = UtteranceDetector::new();

        detector.process(&silence(1600));
        assert_eq!(detector.process(&tone(8000)), Endpoint::Capturing);

        let utterance = detector.finish().unwrap();
        assert_eq!(utterance.len(), 8000);
        assert_eq!(detector.state(), Endpoint::Complete);
    }

    #[test]
    fn test_finish_without_speech() {
        let mut detector = UtteranceDetector::new();
        detector.process(&silence(1600));
        assert!(detector.finish().is_none());

        let mut clipped = UtteranceDetector::new();
        clipped.process(&tone(800));
        assert!(clipped.finish().is_none());
    }

    #[test]
    fn test_no_speech_timeout() {
        let mut detector = UtteranceDetector::new();

        for _ in 0..80 {
            detector.process(&silence(1600));
        }
        assert_eq!(detector.process(&silence(1600)), Endpoint::NoSpeech);

        detector.reset();
        assert_eq!(detector.state(), Endpoint::Waiting);
    }
}
