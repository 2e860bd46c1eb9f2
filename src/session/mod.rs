//! Session orchestrator
//!
//! Owns connection and listening state and sequences one question at a
//! time through capture, the answer service and speech output.
//!
//! ```text
//!  Disconnected ──start_session──▶ Connecting ──▶ Idle ◀──────────────┐
//!                                       │          │ start_listening   │
//!                                       ▼          ▼                   │
//!                                    Errored ◀── Listening ──final──▶ Processing
//!                                       ▲                              │
//!                                       └────────── failure ───────────┘
//! ```
//!
//! All mutation happens through `&mut self` on the task that owns the
//! orchestrator. Adapters only report events; [`Orchestrator::step`]
//! applies them.

mod state;

pub use state::{SessionError, SessionEvent, SessionSnapshot, SessionState};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::answer::{Answer, AnswerService};
use crate::config::{Config, ConfigWarning};
use crate::voice::{Capability, CaptureEvent, OutputStatus, SpeechCapture, SpeechOutput};
use crate::{Error, Result};

/// Raw input to the state machine
#[derive(Debug)]
pub enum SessionUpdate {
    /// Event from the capture adapter
    Capture(CaptureEvent),
    /// Completion of the in-flight answer request
    Answer(Result<Answer>),
}

/// Drives a voice question-answering session
pub struct Orchestrator {
    answers: Arc<dyn AnswerService>,
    capture: SpeechCapture,
    output: Capability<Arc<dyn SpeechOutput>>,
    output_status: Option<watch::Receiver<OutputStatus>>,
    has_api_key: bool,
    warnings: Vec<ConfigWarning>,
    reconnect_delay: Duration,

    state: SessionState,
    connected: bool,
    transcript: String,
    answer: Option<Answer>,
    last_error: Option<SessionError>,
    pending: Option<JoinHandle<Result<Answer>>>,
}

impl Orchestrator {
    /// Create a disconnected orchestrator
    #[must_use]
    pub fn new(
        config: &Config,
        answers: Arc<dyn AnswerService>,
        capture: SpeechCapture,
        output: Capability<Arc<dyn SpeechOutput>>,
    ) -> Self {
        if let Capability::Unavailable { reason } = &output {
            tracing::warn!(reason = %reason, "speech output unavailable, answers will be text only");
        }
        let output_status = match &output {
            Capability::Available(o) => Some(o.subscribe()),
            Capability::Unavailable { .. } => None,
        };

        Self {
            answers,
            capture,
            output,
            output_status,
            has_api_key: config.has_api_key(),
            warnings: config.warnings(),
            reconnect_delay: config.session.reconnect_delay,
            state: SessionState::Disconnected,
            connected: false,
            transcript: String::new(),
            answer: None,
            last_error: None,
            pending: None,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a session is connected
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a capture cycle is running
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.state == SessionState::Listening
    }

    /// Most recent transcript
    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Most recent answer
    #[must_use]
    pub const fn answer(&self) -> Option<&Answer> {
        self.answer.as_ref()
    }

    /// Most recent error
    #[must_use]
    pub const fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    fn fail(&mut self, error: &Error) {
        tracing::warn!(kind = error.kind().label(), error = %error, "session error");
        self.last_error = Some(SessionError::from(error));
        self.state = SessionState::Errored;
    }

    /// Connect a session
    ///
    /// A no-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` without any network call when no API key is
    /// configured, and `Error::Unsupported` when speech recognition is not
    /// available. Either way the session ends up `Errored`.
    pub fn start_session(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        self.state = SessionState::Connecting;
        self.last_error = None;

        if !self.has_api_key {
            let error = Error::Config("API key is required".to_string());
            self.fail(&error);
            return Err(error);
        }

        if let Err(error) = self.capture.subscribe() {
            self.fail(&error);
            return Err(error);
        }

        self.connected = true;
        self.state = SessionState::Idle;
        tracing::info!("session started");
        Ok(())
    }

    /// Begin capturing a question
    ///
    /// Allowed from `Idle`, or from `Errored` while still connected so the
    /// user can retry after a recognition failure. Cancels speech output
    /// and clears the previous transcript and answer.
    ///
    /// # Errors
    ///
    /// `Error::NoSession` when disconnected and `Error::ConcurrentSession`
    /// while listening or processing; neither changes state. A capture
    /// start failure moves the session to `Errored` and is returned.
    pub fn start_listening(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::NoSession);
        }

        match self.state {
            SessionState::Listening | SessionState::Processing => {
                return Err(Error::ConcurrentSession);
            }
            SessionState::Idle | SessionState::Errored => {}
            SessionState::Disconnected | SessionState::Connecting => {
                return Err(Error::NoSession);
            }
        }

        self.cancel_speech();
        self.transcript.clear();
        self.answer = None;
        self.last_error = None;

        if let Err(error) = self.capture.start() {
            self.fail(&error);
            return Err(error);
        }

        self.state = SessionState::Listening;
        Ok(())
    }

    /// End the capture cycle
    ///
    /// Never cancels an answer request that was already dispatched.
    pub fn stop_listening(&mut self) {
        if self.state == SessionState::Listening {
            self.capture.stop();
            self.state = SessionState::Idle;
        }
    }

    /// Tear the session down; safe to call in any state, any number of times
    pub fn end_session(&mut self) {
        self.capture.stop();
        if let Some(pending) = self.pending.take() {
            pending.abort();
            tracing::debug!("aborted in-flight answer request");
        }
        self.cancel_speech();
        self.transcript.clear();
        self.answer = None;
        self.last_error = None;
        self.capture.release();

        if self.connected {
            tracing::info!("session ended");
        }
        self.connected = false;
        self.state = SessionState::Disconnected;
    }

    /// End the session, wait the reconnect delay and start again
    ///
    /// # Errors
    ///
    /// Returns the `start_session` error
    pub async fn reconnect(&mut self) -> Result<()> {
        self.end_session();
        tokio::time::sleep(self.reconnect_delay).await;
        self.start_session()
    }

    /// Stop speech output immediately
    pub fn cancel_speech(&self) {
        if let Capability::Available(output) = &self.output {
            output.cancel();
        }
    }

    /// Replay the stored answer, or stop it if it is playing
    ///
    /// Returns true if playback was started.
    pub fn toggle_answer_playback(&self) -> bool {
        let Capability::Available(output) = &self.output else {
            return false;
        };

        if output.is_speaking() {
            output.cancel();
            return false;
        }

        match &self.answer {
            Some(answer) if !answer.text.trim().is_empty() => {
                output.speak(&answer.text);
                true
            }
            _ => false,
        }
    }

    /// Wait for the next capture event or answer completion
    ///
    /// Pends while there is nothing to wait for. Cancel safe.
    pub async fn next_event(&mut self) -> SessionUpdate {
        let capture = &mut self.capture;
        let pending = &mut self.pending;

        let answer = async {
            match pending.as_mut() {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            joined = answer => {
                self.pending = None;
                SessionUpdate::Answer(joined.unwrap_or_else(|e| {
                    Err(Error::Upstream(format!("answer request failed: {e}")))
                }))
            }
            event = capture.next_event() => {
                SessionUpdate::Capture(event.unwrap_or(CaptureEvent::Ended))
            }
        }
    }

    /// Apply one update to the state machine
    pub fn handle(&mut self, update: SessionUpdate) -> SessionEvent {
        match update {
            SessionUpdate::Capture(event) => self.on_capture(event),
            SessionUpdate::Answer(result) => self.on_answer(result),
        }
    }

    /// Wait for and apply the next update
    pub async fn step(&mut self) -> SessionEvent {
        let update = self.next_event().await;
        self.handle(update)
    }

    fn on_capture(&mut self, event: CaptureEvent) -> SessionEvent {
        if self.state != SessionState::Listening {
            return SessionEvent::Ignored;
        }

        match event {
            CaptureEvent::TranscriptPartial(text) => {
                self.transcript.clone_from(&text);
                SessionEvent::Transcript(text)
            }
            CaptureEvent::TranscriptFinal(text) => {
                self.transcript.clone_from(&text);
                let question = text.trim().to_string();
                if question.is_empty() {
                    self.state = SessionState::Idle;
                    return SessionEvent::ListeningEnded;
                }
                self.dispatch(question.clone());
                SessionEvent::Asked(question)
            }
            CaptureEvent::Error(kind) => {
                let error = SessionError::from(&kind);
                tracing::warn!(error = %kind, "recognition failed");
                self.last_error = Some(error.clone());
                self.state = SessionState::Errored;
                SessionEvent::Failed(error)
            }
            CaptureEvent::Ended => {
                self.state = SessionState::Idle;
                SessionEvent::ListeningEnded
            }
        }
    }

    fn dispatch(&mut self, question: String) {
        tracing::info!(question = %question, "asking question");
        let answers = Arc::clone(&self.answers);
        self.pending = Some(tokio::spawn(async move { answers.ask(&question).await }));
        self.state = SessionState::Processing;
    }

    fn on_answer(&mut self, result: Result<Answer>) -> SessionEvent {
        if self.state != SessionState::Processing {
            return SessionEvent::Ignored;
        }

        match result {
            Ok(answer) => {
                if let Capability::Available(output) = &self.output {
                    output.speak(&answer.text);
                }
                self.answer = Some(answer);
                self.state = SessionState::Idle;
                SessionEvent::Answered
            }
            Err(error) => {
                self.answer = None;
                self.fail(&error);
                SessionEvent::Failed(SessionError::from(&error))
            }
        }
    }

    /// Read-only view for presentation
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            connected: self.connected,
            listening: self.is_listening(),
            transcript: self.transcript.clone(),
            answer: self.answer.clone(),
            last_error: self.last_error.clone(),
            speaking: match &self.output {
                Capability::Available(o) => o.is_speaking(),
                Capability::Unavailable { .. } => false,
            },
            output_status: self
                .output_status
                .as_ref()
                .map(|rx| rx.borrow().clone())
                .unwrap_or_default(),
            speech_available: self.output.is_available(),
            warnings: self.warnings.clone(),
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.cancel_speech();
    }
}
