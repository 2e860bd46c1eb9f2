//! Speech output adapter
//!
//! Every output strategy funnels through a [`PlaybackSlot`]: starting an
//! utterance supersedes the previous one, status updates from superseded
//! utterances are ignored, and the audio device is an exclusive lock held
//! for the whole playback so two utterances never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedMutexGuard, watch};
use tokio::task::JoinHandle;

/// Observable state of speech output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputStatus {
    /// Nothing playing
    #[default]
    Idle,
    /// An utterance is being synthesized or played
    Speaking,
    /// The last utterance failed; the session is unaffected
    Failed(String),
}

/// Speaks answer text
///
/// `speak` returns immediately; progress is observable through
/// `is_speaking` and `subscribe`.
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, stopping anything already playing
    ///
    /// Blank text only stops the current utterance.
    fn speak(&self, text: &str);

    /// Stop speaking immediately
    fn cancel(&self);

    /// Whether an utterance is in progress
    fn is_speaking(&self) -> bool;

    /// Watch output status changes
    fn subscribe(&self) -> watch::Receiver<OutputStatus>;
}

/// Handle for one utterance
#[derive(Debug, Clone)]
pub struct Ticket {
    epoch: u64,
    stop: Arc<AtomicBool>,
}

impl Ticket {
    /// Whether this utterance was cancelled or superseded
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Stop flag to poll from blocking playback
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

struct Current {
    epoch: u64,
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

/// Shared utterance bookkeeping for output implementations
pub struct PlaybackSlot {
    current: Mutex<Option<Current>>,
    epoch: Mutex<u64>,
    status: watch::Sender<OutputStatus>,
    audio: Arc<tokio::sync::Mutex<()>>,
}

impl Default for PlaybackSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSlot {
    /// Create an idle slot
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(OutputStatus::Idle);
        Self {
            current: Mutex::new(None),
            epoch: Mutex::new(0),
            status,
            audio: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn next_epoch(&self) -> u64 {
        let mut epoch = self.epoch.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *epoch += 1;
        *epoch
    }

    fn halt_current(&self) -> bool {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        current.take().is_some_and(|prev| {
            prev.stop.store(true, Ordering::SeqCst);
            if let Some(task) = prev.task {
                task.abort();
            }
            true
        })
    }

    /// Start a new utterance, stopping the current one
    pub fn begin(&self) -> Ticket {
        if self.halt_current() {
            tracing::debug!("stopping previous utterance");
        }

        let ticket = Ticket {
            epoch: self.next_epoch(),
            stop: Arc::new(AtomicBool::new(false)),
        };

        *self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Current {
            epoch: ticket.epoch,
            stop: Arc::clone(&ticket.stop),
            task: None,
        });
        self.status.send_replace(OutputStatus::Speaking);
        ticket
    }

    /// Attach the task driving `ticket` so cancellation can abort it
    pub fn attach(&self, ticket: &Ticket, task: JoinHandle<()>) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match current.as_mut() {
            Some(c) if c.epoch == ticket.epoch => c.task = Some(task),
            _ => task.abort(),
        }
    }

    /// Record the outcome of `ticket`; ignored if it was superseded
    pub fn finish(&self, ticket: &Ticket, outcome: Result<(), String>) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if current.as_ref().is_none_or(|c| c.epoch != ticket.epoch) {
            return;
        }
        *current = None;

        let status = match outcome {
            Ok(()) => OutputStatus::Idle,
            Err(message) => {
                tracing::warn!(error = %message, "speech output failed");
                OutputStatus::Failed(message)
            }
        };
        self.status.send_replace(status);
    }

    /// Stop whatever is playing
    pub fn cancel(&self) {
        if self.halt_current() {
            tracing::debug!("speech cancelled");
        }
        self.next_epoch();
        self.status.send_if_modified(|status| {
            if *status == OutputStatus::Speaking {
                *status = OutputStatus::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Acquire exclusive use of the audio device
    pub async fn acquire_audio(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.audio).lock_owned().await
    }

    /// Whether an utterance is in progress
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        *self.status.borrow() == OutputStatus::Speaking
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<OutputStatus> {
        self.status.subscribe()
    }
}

impl Drop for PlaybackSlot {
    fn drop(&mut self) {
        self.halt_current();
    }
}
