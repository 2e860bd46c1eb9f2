//! Session state as seen from outside the orchestrator

use crate::answer::Answer;
use crate::config::ConfigWarning;
use crate::error::{Error, ErrorKind};
use crate::voice::{OutputStatus, RecognitionErrorKind};

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session
    #[default]
    Disconnected,
    /// Checking prerequisites
    Connecting,
    /// Connected and waiting for the user
    Idle,
    /// Capturing a question
    Listening,
    /// Waiting for the answer service
    Processing,
    /// The last operation failed; see `last_error`
    Errored,
}

impl SessionState {
    /// Short label for status lines
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Idle => "ready",
            Self::Listening => "listening",
            Self::Processing => "thinking",
            Self::Errored => "error",
        }
    }
}

/// Error recorded on the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for SessionError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.user_message(),
        }
    }
}

impl From<&RecognitionErrorKind> for SessionError {
    fn from(kind: &RecognitionErrorKind) -> Self {
        Self::from(&kind.clone().into_error())
    }
}

/// What changed after handling an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transcript updated while listening
    Transcript(String),
    /// Final transcript dispatched as a question
    Asked(String),
    /// Answer stored and handed to speech output
    Answered,
    /// Listening ended without a question
    ListeningEnded,
    /// Capture or answer failed
    Failed(SessionError),
    /// Update arrived for a cycle that is no longer active
    Ignored,
}

/// Read-only view for presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub connected: bool,
    pub listening: bool,
    pub transcript: String,
    pub answer: Option<Answer>,
    pub last_error: Option<SessionError>,
    pub speaking: bool,
    pub output_status: OutputStatus,
    pub speech_available: bool,
    pub warnings: Vec<ConfigWarning>,
}
