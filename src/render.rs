//! Text view of a session for terminal output

use std::fmt::Write;

use crate::answer::{Answer, GroundingSource};
use crate::error::ErrorKind;
use crate::session::{SessionSnapshot, SessionState};
use crate::voice::OutputStatus;

/// Render a snapshot as plain text
#[must_use]
pub fn render(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();

    for warning in &snapshot.warnings {
        let _ = writeln!(out, "! {}", warning.message());
    }

    let _ = writeln!(out, "[{}] {}", snapshot.state.label(), status_hint(snapshot));

    if !snapshot.transcript.is_empty() {
        let _ = writeln!(out, "You: {}", snapshot.transcript);
    }

    if let Some(answer) = &snapshot.answer {
        out.push_str(&render_answer(answer));
    }

    if let Some(error) = &snapshot.last_error {
        let _ = writeln!(out, "Error ({}): {}", error.kind.label(), error.message);
        let _ = writeln!(out, "  {}", recovery_hint(error.kind));
    }

    if let OutputStatus::Failed(reason) = &snapshot.output_status {
        let _ = writeln!(out, "(speech output failed: {reason})");
    }

    out
}

/// Render an answer and its numbered sources
#[must_use]
pub fn render_answer(answer: &Answer) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Guru: {}", answer.text.trim());
    if !answer.grounding_sources.is_empty() {
        let _ = writeln!(out, "Sources:");
        for (i, source) in answer.grounding_sources.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, source_line(source));
        }
    }
    out
}

fn status_hint(snapshot: &SessionSnapshot) -> &'static str {
    match snapshot.state {
        SessionState::Disconnected => "Start a session to ask about pickleball rules.",
        SessionState::Connecting => "Connecting...",
        SessionState::Idle if snapshot.speaking => "Speaking the answer.",
        SessionState::Idle => "Ask a question.",
        SessionState::Listening => "Listening... ask your pickleball rules question.",
        SessionState::Processing => "Consulting the rulebook...",
        SessionState::Errored if snapshot.connected => "Something went wrong. You can ask again.",
        SessionState::Errored => "Something went wrong.",
    }
}

fn source_line(source: &GroundingSource) -> String {
    let origin = if source.is_retrieved() {
        "rules datastore"
    } else {
        "web"
    };
    match source.uri() {
        Some(uri) if source.display_title() != uri => {
            format!("{} <{uri}> ({origin})", source.display_title())
        }
        _ => format!("{} ({origin})", source.display_title()),
    }
}

const fn recovery_hint(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Configuration => "Check the configuration and restart.",
        ErrorKind::Auth => "The API key was rejected. Check GEMINI_API_KEY.",
        ErrorKind::Permission => "Grant microphone access, then start the session again.",
        ErrorKind::Recognition => "Try asking again.",
        ErrorKind::Upstream => "The service had a problem. Try again shortly.",
        ErrorKind::GroundingConfig => {
            "Check the Google Cloud project and datastore settings."
        }
    }
}
