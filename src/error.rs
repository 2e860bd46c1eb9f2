//! Error types for Pickleball Guru

use thiserror::Error;

/// Result type alias for Pickleball Guru operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Pickleball Guru
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or placeholder configuration (API key, credentials)
    #[error("configuration error: {0}")]
    Config(String),

    /// Answer service rejected the API key
    #[error("auth error: {0}")]
    Auth(String),

    /// Retrieval datastore misconfigured or inaccessible
    #[error("grounding configuration error: {0}")]
    GroundingConfig(String),

    /// Answer service or other upstream failure
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Microphone or platform permission denied
    #[error("permission error: {0}")]
    Permission(String),

    /// Speech recognition failed during a capture cycle
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Capability missing on this platform
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A listening cycle or question is already in progress
    #[error("no concurrent session: a question is already being captured or answered")]
    ConcurrentSession,

    /// Operation needs a connected session
    #[error("no active session, start a session first")]
    NoSession,

    /// Question text was blank
    #[error("question is empty")]
    EmptyQuestion,

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Coarse classification surfaced to the session and the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operator must fix configuration
    Configuration,
    /// API key rejected upstream
    Auth,
    /// User must grant access or use a supported platform
    Permission,
    /// Transient capture failure; retry by listening again
    Recognition,
    /// Answer or TTS service failed; retry
    Upstream,
    /// Datastore misconfiguration
    GroundingConfig,
}

impl Error {
    /// Classify this error for presentation
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Toml(_) => ErrorKind::Configuration,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Permission(_) | Self::Unsupported(_) => ErrorKind::Permission,
            Self::Recognition(_)
            | Self::Audio(_)
            | Self::Stt(_)
            | Self::ConcurrentSession
            | Self::NoSession
            | Self::EmptyQuestion => ErrorKind::Recognition,
            Self::GroundingConfig(_) => ErrorKind::GroundingConfig,
            Self::Upstream(_)
            | Self::Tts(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Serialization(_) => ErrorKind::Upstream,
        }
    }

    /// Message suitable for showing to the user, without the category prefix
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(m)
            | Self::Auth(m)
            | Self::GroundingConfig(m)
            | Self::Upstream(m)
            | Self::Permission(m)
            | Self::Recognition(m)
            | Self::Unsupported(m)
            | Self::Audio(m)
            | Self::Stt(m)
            | Self::Tts(m) => m.clone(),
            Self::NoSession => "No active session. Please start a session first.".to_string(),
            other => other.to_string(),
        }
    }
}

impl ErrorKind {
    /// Short label for status lines
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Auth => "authentication",
            Self::Permission => "permission",
            Self::Recognition => "recognition",
            Self::Upstream => "upstream",
            Self::GroundingConfig => "grounding configuration",
        }
    }

    /// Whether the user can recover by simply trying again
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Recognition | Self::Upstream)
    }
}
