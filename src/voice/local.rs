//! Local speech synthesis through the platform TTS command

use std::path::PathBuf;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::watch;

use super::output::{OutputStatus, PlaybackSlot, SpeechOutput};
use super::recognition::Capability;

/// Supported synthesis commands, in order of preference
const CANDIDATES: &[(&str, &[&str])] = &[
    ("say", &["-r", "180"]),
    ("espeak-ng", &["-s", "160"]),
    ("espeak", &["-s", "160"]),
    ("spd-say", &["--wait", "-r", "-10"]),
];

/// Speaks through `say`, `espeak-ng`, `espeak` or `spd-say`
pub struct LocalSynthesis {
    program: PathBuf,
    args: Vec<String>,
    slot: Arc<PlaybackSlot>,
}

impl LocalSynthesis {
    /// Use an explicit program and leading arguments
    #[must_use]
    pub fn with_command(program: PathBuf, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            slot: Arc::new(PlaybackSlot::new()),
        }
    }

    /// Find a synthesis command on `PATH`
    #[must_use]
    pub fn detect() -> Capability<Self> {
        for (name, args) in CANDIDATES {
            if let Ok(program) = which::which(name) {
                tracing::debug!(program = %program.display(), "local speech synthesis available");
                return Capability::Available(Self::with_command(
                    program,
                    args.iter().map(|a| (*a).to_string()).collect(),
                ));
            }
        }
        Capability::unavailable(
            "Speech synthesis is not available: install espeak-ng or speech-dispatcher.",
        )
    }
}

impl SpeechOutput for LocalSynthesis {
    fn speak(&self, text: &str) {
        let text = text.trim().to_string();
        if text.is_empty() {
            self.slot.cancel();
            return;
        }

        let ticket = self.slot.begin();
        let slot = Arc::clone(&self.slot);
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&text)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let task_ticket = ticket.clone();
        let task = tokio::spawn(async move {
            let _audio = slot.acquire_audio().await;
            if task_ticket.is_stopped() {
                return;
            }

            // Aborting this task drops the child, which kills it
            let outcome = match command.output().await {
                Ok(output) if output.status.success() => Ok(()),
                Ok(output) => Err(format!(
                    "speech command exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )),
                Err(e) => Err(format!("failed to run speech command: {e}")),
            };
            slot.finish(&task_ticket, outcome);
        });
        self.slot.attach(&ticket, task);
    }

    fn cancel(&self) {
        self.slot.cancel();
    }

    fn is_speaking(&self) -> bool {
        self.slot.is_speaking()
    }

    fn subscribe(&self) -> watch::Receiver<OutputStatus> {
        self.slot.subscribe()
    }
}
