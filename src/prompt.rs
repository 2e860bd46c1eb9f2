//! Prompt construction for the answer service
//!
//! The rules document is compiled into the binary and sent as the system
//! instruction on every request. Users only control the question text.

/// Pickleball rules knowledge base used as the system instruction
pub const RULES_SYSTEM_PROMPT: &str = include_str!("../assets/rules_prompt.md");

/// Build the user turn for a question
#[must_use]
pub fn user_prompt(question: &str) -> String {
    format!(
        "User Question: {}\n\nPlease provide a clear, accurate answer based on official pickleball rules.",
        question.trim()
    )
}
