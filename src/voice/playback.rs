//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::error::SynthesisError;

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How a playback call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All samples were played
    Finished,
    /// The cancel flag was raised first
    Canceled,
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self, SynthesisError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| SynthesisError::Unavailable("no output device available".to_string()))?;

        let supports = |channels: u16| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        };

        // Fallback: stereo
        let supported_config = supports(1).or_else(|| supports(2)).ok_or_else(|| {
            SynthesisError::Unavailable("no suitable output config found".to_string())
        })?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Play MP3 audio at `volume`, blocking until done or `cancel` is raised
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3_blocking(
        &self,
        mp3_data: &[u8],
        volume: f32,
        cancel: &AtomicBool,
    ) -> Result<PlaybackOutcome, SynthesisError> {
        let samples = decode_mp3(mp3_data)?;
        self.play_samples_blocking(samples, volume, cancel)
    }

    /// Play samples in a blocking manner
    fn play_samples_blocking(
        &self,
        samples: Vec<f32>,
        volume: f32,
        cancel: &AtomicBool,
    ) -> Result<PlaybackOutcome, SynthesisError> {
        if samples.is_empty() {
            return Ok(PlaybackOutcome::Finished);
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| SynthesisError::Unavailable("no output device".to_string()))?;

        let channels = self.config.channels as usize;
        let sample_count = samples.len();

        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let samples_cb = Arc::clone(&samples);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position_cb.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples_cb.get(pos).map_or_else(
                            || {
                                finished_cb.store(true, Ordering::Release);
                                0.0
                            },
                            |s| {
                                pos += 1;
                                s * volume
                            },
                        );
                        frame.fill(sample);
                    }
                    position_cb.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| SynthesisError::Playback(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SynthesisError::Playback(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        let mut outcome = PlaybackOutcome::Finished;
        while !finished.load(Ordering::Acquire) {
            if cancel.load(Ordering::Acquire) {
                outcome = PlaybackOutcome::Canceled;
                break;
            }
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        drop(stream);
        tracing::debug!(samples = sample_count, ?outcome, "playback complete");

        Ok(outcome)
    }
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>, SynthesisError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(SynthesisError::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
