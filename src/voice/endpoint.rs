//! Utterance endpointing
//!
//! Splits a live microphone stream into a single spoken utterance using
//! RMS energy: speech starts above the threshold and ends after a run of
//! trailing silence.

use std::time::Duration;

/// Tuning for utterance detection
#[derive(Debug, Clone, Copy)]
pub struct EndpointSettings {
    /// RMS energy above which a chunk counts as speech
    pub energy_threshold: f32,

    /// Minimum speech length for an utterance
    pub min_speech: Duration,

    /// Silence that ends an utterance
    pub trailing_silence: Duration,

    /// Give up if no speech starts within this window
    pub no_speech_timeout: Duration,

    /// Hard cap on utterance length
    pub max_utterance: Duration,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            min_speech: Duration::from_millis(300),
            trailing_silence: Duration::from_millis(800),
            no_speech_timeout: Duration::from_secs(8),
            max_utterance: Duration::from_secs(30),
        }
    }
}

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Waiting,
    /// Accumulating an utterance
    Speaking,
}

/// Result of feeding audio to the detector
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Keep feeding audio
    Pending,
    /// Utterance complete; samples include leading and trailing audio
    Utterance(Vec<f32>),
    /// Nothing was said before the timeout
    NoSpeech,
}

/// Detects one utterance in a stream of mono samples
pub struct UtteranceDetector {
    settings: EndpointSettings,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_samples: usize,
    waited_samples: usize,
    min_speech_samples: usize,
    trailing_samples: usize,
    timeout_samples: usize,
    max_samples: usize,
}

impl UtteranceDetector {
    /// Create a detector for audio at `sample_rate`
    #[must_use]
    pub fn new(settings: EndpointSettings, sample_rate: u32) -> Self {
        let to_samples = |d: Duration| {
            usize::try_from(d.as_millis() * u128::from(sample_rate) / 1000).unwrap_or(usize::MAX)
        };

        Self {
            state: DetectorState::Waiting,
            speech_buffer: Vec::new(),
            silence_samples: 0,
            waited_samples: 0,
            min_speech_samples: to_samples(settings.min_speech),
            trailing_samples: to_samples(settings.trailing_silence),
            timeout_samples: to_samples(settings.no_speech_timeout),
            max_samples: to_samples(settings.max_utterance),
            settings,
        }
    }

    /// Feed a chunk of samples
    pub fn process(&mut self, samples: &[f32]) -> Endpoint {
        if samples.is_empty() {
            return Endpoint::Pending;
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > self.settings.energy_threshold;

        match self.state {
            DetectorState::Waiting => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_samples = 0;
                    tracing::trace!(energy, "speech detected");
                } else {
                    self.waited_samples += samples.len();
                    if self.waited_samples > self.timeout_samples {
                        tracing::debug!("no speech before timeout");
                        return Endpoint::NoSpeech;
                    }
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += samples.len();
                }

                let spoken = self.speech_buffer.len().saturating_sub(self.silence_samples);

                if self.silence_samples > self.trailing_samples {
                    if spoken > self.min_speech_samples {
                        tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                        return self.finish();
                    }

                    // A short blip followed by silence: keep waiting
                    tracing::trace!("discarding short noise burst");
                    self.waited_samples += self.speech_buffer.len();
                    self.state = DetectorState::Waiting;
                    self.speech_buffer.clear();
                    self.silence_samples = 0;
                    if self.waited_samples > self.timeout_samples {
                        return Endpoint::NoSpeech;
                    }
                } else if self.speech_buffer.len() >= self.max_samples {
                    tracing::debug!("utterance reached maximum length");
                    return self.finish();
                }
            }
        }

        Endpoint::Pending
    }

    fn finish(&mut self) -> Endpoint {
        let samples = std::mem::take(&mut self.speech_buffer);
        self.reset();
        Endpoint::Utterance(samples)
    }

    /// Reset to waiting
    pub fn reset(&mut self) {
        self.state = DetectorState::Waiting;
        self.speech_buffer.clear();
        self.silence_samples = 0;
        self.waited_samples = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
