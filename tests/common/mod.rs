//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pickleball_guru::answer::{Answer, AnswerService};
use pickleball_guru::config::file::GuruConfigFile;
use pickleball_guru::voice::{
    Capability, CaptureEvent, EventSink, OutputStatus, Recognizer, SpeechCapture, SpeechOutput,
};
use pickleball_guru::{Config, Error, Result};
use tokio::sync::watch;

/// Build a config from env-style pairs, ignoring the real environment
#[must_use]
pub fn config_from(vars: &[(&str, &str)]) -> Config {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_sources(GuruConfigFile::default(), move |key| {
        vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    })
}

/// Config with an API key and nothing else
#[must_use]
pub fn config_with_key() -> Config {
    config_from(&[("GEMINI_API_KEY", "test-key")])
}

/// Recognizer driven by the test
///
/// Each `start` pops the next script and emits it immediately; the sink
/// is also kept so tests can emit later.
#[derive(Clone, Default)]
pub struct ScriptedRecognizer {
    pub sinks: Arc<Mutex<Vec<EventSink>>>,
    pub scripts: Arc<Mutex<VecDeque<Vec<CaptureEvent>>>>,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub refuse: Arc<AtomicBool>,
}

impl ScriptedRecognizer {
    /// Queue events for the next cycle
    pub fn script(&self, events: Vec<CaptureEvent>) {
        self.scripts.lock().unwrap().push_back(events);
    }

    /// Sink of the most recent cycle
    pub fn last_sink(&self) -> EventSink {
        self.sinks.lock().unwrap().last().cloned().expect("no cycle started")
    }

    /// Wrap into a capture adapter
    pub fn capture(&self) -> SpeechCapture {
        SpeechCapture::new(Capability::Available(Box::new(self.clone())))
    }
}

impl Recognizer for ScriptedRecognizer {
    fn start(&mut self, sink: EventSink) -> Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Permission("Microphone access denied.".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = self.scripts.lock().unwrap().pop_front() {
            for event in events {
                sink.emit(event);
            }
        }
        self.sinks.lock().unwrap().push(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

enum Reply {
    Answer(Answer),
    Fail(fn() -> Error),
    Hang,
}

/// Answer service with a canned reply
pub struct MockAnswers {
    reply: Reply,
    pub questions: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl MockAnswers {
    fn with(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            questions: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Always answers with `text`
    pub fn answering(text: &str) -> Arc<Self> {
        Self::with(Reply::Answer(Answer {
            text: text.to_string(),
            grounding_sources: Vec::new(),
        }))
    }

    /// Always fails with `error()`
    pub fn failing(error: fn() -> Error) -> Arc<Self> {
        Self::with(Reply::Fail(error))
    }

    /// Never completes
    pub fn hanging() -> Arc<Self> {
        Self::with(Reply::Hang)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerService for MockAnswers {
    async fn ask(&self, question: &str) -> Result<Answer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.questions.lock().unwrap().push(question.to_string());
        match &self.reply {
            Reply::Answer(answer) => Ok(answer.clone()),
            Reply::Fail(error) => Err(error()),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Speech output that records calls
pub struct MockOutput {
    pub spoken: Mutex<Vec<String>>,
    pub cancels: AtomicUsize,
    status: watch::Sender<OutputStatus>,
}

impl MockOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            status: watch::channel(OutputStatus::Idle).0,
        })
    }

    /// Pretend the current utterance finished
    pub fn finish(&self) {
        self.status.send_replace(OutputStatus::Idle);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl SpeechOutput for MockOutput {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
        self.status.send_replace(OutputStatus::Speaking);
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.status.send_replace(OutputStatus::Idle);
    }

    fn is_speaking(&self) -> bool {
        *self.status.borrow() == OutputStatus::Speaking
    }

    fn subscribe(&self) -> watch::Receiver<OutputStatus> {
        self.status.subscribe()
    }
}
