//! Speech capture adapter
//!
//! Wraps a platform [`Recognizer`] behind single-shot listening cycles.
//! Recognizers report through an [`EventSink`] tagged with the cycle that
//! produced the event; the adapter drops anything from a cycle that is no
//! longer current, so a stopped or finished cycle can never leak a late
//! transcript into the next one.

use std::fmt;

use tokio::sync::mpsc;

use crate::{Error, Result};

/// A platform capability that may be missing
#[derive(Debug, Clone)]
pub enum Capability<T> {
    /// Usable on this platform
    Available(T),
    /// Not usable, with a user-facing reason
    Unavailable { reason: String },
}

impl<T> Capability<T> {
    /// Construct an unavailable capability
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether the capability can be used
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// The reason if unavailable
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }

    /// Transform the inner value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Capability<U> {
        match self {
            Self::Available(v) => Capability::Available(f(v)),
            Self::Unavailable { reason } => Capability::Unavailable { reason },
        }
    }
}

/// Recognition failure reported for a capture cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Nothing was said
    NoSpeech,
    /// Microphone could not be read
    AudioCapture,
    /// Microphone access denied
    PermissionDenied,
    /// Recognition service unreachable
    Network,
    /// Anything else, with the platform code or message
    Other(String),
}

impl RecognitionErrorKind {
    /// Map a platform error code
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" | "service-not-allowed" => Self::PermissionDenied,
            "network" => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }

    /// What the user should do about it
    #[must_use]
    pub fn guidance(&self) -> String {
        match self {
            Self::NoSpeech => "No speech was detected. Please try again.".to_string(),
            Self::AudioCapture => {
                "Audio capture failed. Ensure microphone is enabled and working.".to_string()
            }
            Self::PermissionDenied => {
                "Microphone access denied. Please allow microphone permission in your system settings."
                    .to_string()
            }
            Self::Network => {
                "Speech recognition service could not be reached. Check your connection and try again."
                    .to_string()
            }
            Self::Other(detail) => format!("Speech recognition error: {detail}"),
        }
    }

    /// Convert into the crate error taxonomy
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Self::PermissionDenied => Error::Permission(self.guidance()),
            other => Error::Recognition(other.guidance()),
        }
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.guidance())
    }
}

/// Event observed during a capture cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Interim recognition result
    TranscriptPartial(String),
    /// Final recognition result; ends the cycle
    TranscriptFinal(String),
    /// Recognition failed; ends the cycle
    Error(RecognitionErrorKind),
    /// Recognizer stopped without a result
    Ended,
}

impl CaptureEvent {
    const fn ends_cycle(&self) -> bool {
        !matches!(self, Self::TranscriptPartial(_))
    }
}

/// Sender handed to a recognizer for one cycle
#[derive(Debug, Clone)]
pub struct EventSink {
    cycle: u64,
    tx: mpsc::UnboundedSender<(u64, CaptureEvent)>,
}

impl EventSink {
    /// Report an event; returns false once nobody is listening
    pub fn emit(&self, event: CaptureEvent) -> bool {
        self.tx.send((self.cycle, event)).is_ok()
    }

    /// Cycle this sink belongs to
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }
}

/// Platform speech recognizer
///
/// Implementations run one cycle per `start` and report through the sink.
/// They must never block the caller.
pub trait Recognizer: Send {
    /// Begin a recognition cycle
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer cannot start
    fn start(&mut self, sink: EventSink) -> Result<()>;

    /// End the current cycle and release the microphone
    fn stop(&mut self);
}

type Subscription = (
    mpsc::UnboundedSender<(u64, CaptureEvent)>,
    mpsc::UnboundedReceiver<(u64, CaptureEvent)>,
);

/// Single-shot speech capture over a [`Recognizer`]
pub struct SpeechCapture {
    recognizer: Capability<Box<dyn Recognizer>>,
    subscription: Option<Subscription>,
    cycle: u64,
    listening: bool,
    last_error: Option<RecognitionErrorKind>,
}

impl SpeechCapture {
    /// Wrap a recognizer capability
    #[must_use]
    pub const fn new(recognizer: Capability<Box<dyn Recognizer>>) -> Self {
        Self {
            recognizer,
            subscription: None,
            cycle: 0,
            listening: false,
            last_error: None,
        }
    }

    /// Whether recognition exists on this platform
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.recognizer.is_available()
    }

    /// Open the event subscription
    ///
    /// # Errors
    ///
    /// Returns `Error::Unsupported` when recognition is unavailable
    pub fn subscribe(&mut self) -> Result<()> {
        if let Capability::Unavailable { reason } = &self.recognizer {
            return Err(Error::Unsupported(reason.clone()));
        }
        if self.subscription.is_none() {
            self.subscription = Some(mpsc::unbounded_channel());
            tracing::debug!("capture subscription opened");
        }
        Ok(())
    }

    /// Close the subscription, stopping any active cycle
    pub fn release(&mut self) {
        self.stop();
        if self.subscription.take().is_some() {
            tracing::debug!("capture subscription released");
        }
    }

    /// Whether a subscription is open
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Begin one listening cycle
    ///
    /// # Errors
    ///
    /// Fails without panicking if recognition is unsupported, nobody is
    /// subscribed, a cycle is already running, or the recognizer refuses
    /// to start. The failure is also recorded as `last_error`.
    pub fn start(&mut self) -> Result<()> {
        let recognizer = match &mut self.recognizer {
            Capability::Available(r) => r,
            Capability::Unavailable { reason } => {
                let reason = reason.clone();
                self.last_error = Some(RecognitionErrorKind::Other(reason.clone()));
                return Err(Error::Unsupported(reason));
            }
        };

        let Some((tx, _)) = &self.subscription else {
            self.last_error = Some(RecognitionErrorKind::Other("not subscribed".to_string()));
            return Err(Error::Recognition(
                "no active capture subscription".to_string(),
            ));
        };

        if self.listening {
            self.last_error = Some(RecognitionErrorKind::Other("already listening".to_string()));
            return Err(Error::ConcurrentSession);
        }

        self.cycle += 1;
        let sink = EventSink {
            cycle: self.cycle,
            tx: tx.clone(),
        };

        if let Err(e) = recognizer.start(sink) {
            tracing::warn!(error = %e, "recognizer failed to start");
            self.last_error = Some(match &e {
                Error::Permission(_) => RecognitionErrorKind::PermissionDenied,
                Error::Audio(_) => RecognitionErrorKind::AudioCapture,
                other => RecognitionErrorKind::Other(other.to_string()),
            });
            return Err(e);
        }

        self.listening = true;
        self.last_error = None;
        tracing::debug!(cycle = self.cycle, "listening started");
        Ok(())
    }

    /// End the current cycle; no-op when idle
    pub fn stop(&mut self) {
        if !self.listening {
            return;
        }
        if let Capability::Available(recognizer) = &mut self.recognizer {
            recognizer.stop();
        }
        self.listening = false;
        tracing::debug!(cycle = self.cycle, "listening stopped");
    }

    /// Whether a cycle is running
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Most recent recognition failure
    #[must_use]
    pub const fn last_error(&self) -> Option<&RecognitionErrorKind> {
        self.last_error.as_ref()
    }

    /// Wait for the next event of the current cycle
    ///
    /// Pends forever when there is no subscription. Events from stale
    /// cycles, or arriving after the cycle ended, are discarded. Cancel
    /// safe.
    pub async fn next_event(&mut self) -> Option<CaptureEvent> {
        loop {
            let Some((_, rx)) = self.subscription.as_mut() else {
                return std::future::pending().await;
            };

            let (cycle, event) = rx.recv().await?;

            if !self.listening || cycle != self.cycle {
                tracing::trace!(cycle, current = self.cycle, ?event, "discarding stale event");
                continue;
            }

            if event.ends_cycle() {
                self.listening = false;
                if let Capability::Available(recognizer) = &mut self.recognizer {
                    recognizer.stop();
                }
            }
            if let CaptureEvent::Error(kind) = &event {
                self.last_error = Some(kind.clone());
            }

            return Some(event);
        }
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
