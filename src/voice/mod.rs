//! Voice processing module
//!
//! Speech capture (microphone, endpointing, transcription) behind the
//! [`SpeechCapture`] adapter, and speech output through either the platform
//! synthesizer or the TTS proxy.

mod capture;
mod endpoint;
mod local;
mod microphone;
mod output;
mod playback;
mod recognition;
mod remote;
mod stt;

pub use capture::{AudioCapture, SAMPLE_RATE, input_available, samples_to_wav};
pub use endpoint::{DetectorState, Endpoint, EndpointSettings, UtteranceDetector};
pub use local::LocalSynthesis;
pub use microphone::MicrophoneRecognizer;
pub use output::{OutputStatus, PlaybackSlot, SpeechOutput, Ticket};
pub use playback::{AudioPlayback, AudioSink, PLAYBACK_SAMPLE_RATE, decode_mp3};
pub use recognition::{
    Capability, CaptureEvent, EventSink, RecognitionErrorKind, Recognizer, SpeechCapture,
};
pub use remote::{RemoteSynthesis, TtsProxyClient};
pub use stt::{Transcriber, WhisperTranscriber};
