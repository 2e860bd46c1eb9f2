//! Cloud text-to-speech upstream used by the proxy

mod credentials;
mod google;

pub use credentials::{CredentialProblem, ServiceAccount};
pub use google::GoogleTts;

use async_trait::async_trait;

/// Sentence synthesized by the diagnostic endpoint
pub const SELF_TEST_TEXT: &str = "Testing Google Cloud Text to Speech with voice en-US-Standard-I";

/// Synthesis failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    /// Upstream refused the credentials' permissions
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other upstream failure
    #[error("synthesis failed: {0}")]
    Failed(String),
}

/// Turns text into MP3 audio
#[async_trait]
pub trait CloudSynthesizer: Send + Sync {
    /// Synthesize cleaned text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns `SynthesisError::PermissionDenied` on a 403 and
    /// `SynthesisError::Failed` otherwise.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;

    /// Voice label for diagnostics
    fn voice_label(&self) -> String;
}

/// Strip markdown emphasis markers and surrounding whitespace
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.replace('*', "").trim().to_string()
}
