//! Answer service: question in, rules-grounded answer out

mod gemini;
mod grounding;

pub use gemini::GeminiClient;
pub use grounding::GroundingSource;

use async_trait::async_trait;

use crate::Result;

/// A generated answer and the citations backing it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    /// Answer text
    pub text: String,

    /// Citations in API order
    pub grounding_sources: Vec<GroundingSource>,
}

/// Something that can answer a pickleball rules question
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Answer a single question
    ///
    /// # Errors
    ///
    /// Returns a classified error (`Config`, `Auth`, `GroundingConfig`,
    /// `Upstream`) when no answer could be produced.
    async fn ask(&self, question: &str) -> Result<Answer>;
}
