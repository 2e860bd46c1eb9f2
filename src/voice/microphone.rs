//! Native speech recognizer: microphone, endpointing, cloud transcription

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::capture::{self, AudioCapture};
use super::endpoint::{Endpoint, EndpointSettings, UtteranceDetector};
use super::recognition::{
    Capability, CaptureEvent, EventSink, RecognitionErrorKind, Recognizer,
};
use super::stt::Transcriber;
use crate::{Error, Result};

/// How often the capture thread drains the microphone buffer
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Recognizer backed by the default microphone and a [`Transcriber`]
///
/// Each cycle runs on its own thread, which owns the `cpal` stream for the
/// duration of the cycle and drops it as soon as the utterance ends or the
/// cycle is stopped.
pub struct MicrophoneRecognizer {
    transcriber: Arc<dyn Transcriber>,
    settings: EndpointSettings,
    active: Option<Arc<AtomicBool>>,
}

impl MicrophoneRecognizer {
    /// Create a recognizer with explicit endpointing settings
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>, settings: EndpointSettings) -> Self {
        Self {
            transcriber,
            settings,
            active: None,
        }
    }

    /// Probe the platform for recognition support
    #[must_use]
    pub fn probe(transcriber: Option<Arc<dyn Transcriber>>) -> Capability<Self> {
        let Some(transcriber) = transcriber else {
            return Capability::unavailable(
                "Speech recognition is not configured. Set OPENAI_API_KEY to enable it.",
            );
        };
        if !capture::input_available() {
            return Capability::unavailable(
                "Speech recognition is not supported here: no microphone input device was found.",
            );
        }
        Capability::Available(Self::new(transcriber, EndpointSettings::default()))
    }
}

impl Recognizer for MicrophoneRecognizer {
    fn start(&mut self, sink: EventSink) -> Result<()> {
        self.stop();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Recognition(format!("no async runtime: {e}")))?;

        let stop = Arc::new(AtomicBool::new(false));
        let cycle = CycleWorker {
            sink,
            stop: Arc::clone(&stop),
            transcriber: Arc::clone(&self.transcriber),
            settings: self.settings,
            runtime,
        };

        std::thread::Builder::new()
            .name("guru-capture".to_string())
            .spawn(move || cycle.run())
            .map_err(|e| Error::Audio(format!("failed to spawn capture thread: {e}")))?;

        self.active = Some(stop);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.active.take() {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for MicrophoneRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CycleWorker {
    sink: EventSink,
    stop: Arc<AtomicBool>,
    transcriber: Arc<dyn Transcriber>,
    settings: EndpointSettings,
    runtime: tokio::runtime::Handle,
}

impl CycleWorker {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(self) {
        let cycle = self.sink.cycle();
        let mut capture = match AudioCapture::new().and_then(|mut c| c.start().map(|()| c)) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(cycle, error = %e, "microphone unavailable");
                self.sink.emit(CaptureEvent::Error(audio_error_kind(&e)));
                return;
            }
        };

        let mut detector = UtteranceDetector::new(self.settings, capture.sample_rate());

        let utterance = loop {
            std::thread::sleep(POLL_INTERVAL);

            if self.stopped() {
                capture.stop();
                self.sink.emit(CaptureEvent::Ended);
                return;
            }

            match detector.process(&capture.take_buffer()) {
                Endpoint::Pending => {}
                Endpoint::NoSpeech => {
                    capture.stop();
                    self.sink
                        .emit(CaptureEvent::Error(RecognitionErrorKind::NoSpeech));
                    return;
                }
                Endpoint::Utterance(samples) => break samples,
            }
        };

        // Release the microphone before the network round trip
        let sample_rate = capture.sample_rate();
        capture.stop();
        drop(capture);

        let wav = match capture::samples_to_wav(&utterance, sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                self.sink
                    .emit(CaptureEvent::Error(RecognitionErrorKind::Other(e.to_string())));
                return;
            }
        };

        tracing::debug!(cycle, wav_bytes = wav.len(), "transcribing utterance");
        let result = self.runtime.block_on(self.transcriber.transcribe(wav));

        if self.stopped() {
            return;
        }

        match result {
            Ok(text) => {
                self.sink.emit(CaptureEvent::TranscriptFinal(text));
            }
            Err(e) => {
                tracing::warn!(cycle, error = %e, "transcription failed");
                self.sink.emit(CaptureEvent::Error(transcription_error_kind(&e)));
            }
        }
        self.sink.emit(CaptureEvent::Ended);
    }
}

fn audio_error_kind(error: &Error) -> RecognitionErrorKind {
    let message = error.to_string().to_ascii_lowercase();
    if message.contains("permission") || message.contains("denied") {
        RecognitionErrorKind::PermissionDenied
    } else {
        RecognitionErrorKind::AudioCapture
    }
}

fn transcription_error_kind(error: &Error) -> RecognitionErrorKind {
    match error {
        Error::Http(e) if !e.is_decode() => RecognitionErrorKind::Network,
        other => RecognitionErrorKind::Other(other.to_string()),
    }
}
