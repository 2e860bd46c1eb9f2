//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pickleball_guru::Error;
use pickleball_guru::voice::{
    AudioSink, DetectorState, Endpoint, EndpointSettings, OutputStatus, RemoteSynthesis, SAMPLE_RATE,
    SpeechOutput, Transcriber, TtsProxyClient, UtteranceDetector, WhisperTranscriber,
    samples_to_wav,
};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Feed audio in 100ms chunks, returning the first non-pending result
fn feed(detector: &mut UtteranceDetector, audio: &[f32]) -> Endpoint {
    for chunk in audio.chunks(SAMPLE_RATE as usize / 10) {
        let result = detector.process(chunk);
        if result != Endpoint::Pending {
            return result;
        }
    }
    Endpoint::Pending
}

#[test]
fn test_detector_finds_utterance_after_trailing_silence() {
    let mut detector = UtteranceDetector::new(EndpointSettings::default(), SAMPLE_RATE);
    assert_eq!(detector.state(), DetectorState::Waiting);

    let mut audio = generate_silence(0.5);
    audio.extend(generate_sine_samples(220.0, 1.0, 0.5));
    audio.extend(generate_silence(1.0));

    let Endpoint::Utterance(samples) = feed(&mut detector, &audio) else {
        panic!("expected an utterance");
    };
    assert!(samples.len() >= SAMPLE_RATE as usize);
    assert_eq!(detector.state(), DetectorState::Waiting);
}

#[test]
fn test_detector_reports_no_speech() {
    let mut detector = UtteranceDetector::new(EndpointSettings::default(), SAMPLE_RATE);
    assert_eq!(feed(&mut detector, &generate_silence(9.0)), Endpoint::NoSpeech);
}

#[test]
fn test_detector_ignores_short_noise() {
    let mut detector = UtteranceDetector::new(EndpointSettings::default(), SAMPLE_RATE);

    let mut audio = generate_sine_samples(440.0, 0.1, 0.5);
    audio.extend(generate_silence(1.0));

    assert_eq!(feed(&mut detector, &audio), Endpoint::Pending);
    assert_eq!(detector.state(), DetectorState::Waiting);
}

#[test]
fn test_detector_caps_long_utterance() {
    let settings = EndpointSettings {
        max_utterance: Duration::from_secs(2),
        ..EndpointSettings::default()
    };
    let mut detector = UtteranceDetector::new(settings, SAMPLE_RATE);

    let result = feed(&mut detector, &generate_sine_samples(220.0, 5.0, 0.5));
    assert!(matches!(result, Endpoint::Utterance(s) if s.len() <= 2 * SAMPLE_RATE as usize + 1600));
}

#[test]
fn test_samples_to_wav_roundtrips_through_hound() {
    let samples = generate_sine_samples(440.0, 0.25, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[tokio::test]
async fn test_whisper_transcription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "text": "What is a let serve?" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let whisper = WhisperTranscriber::new(
        SecretString::from("sk-test"),
        "whisper-1".to_string(),
        &server.uri(),
    )
    .unwrap();
    let wav = samples_to_wav(&generate_sine_samples(220.0, 0.5, 0.3), SAMPLE_RATE).unwrap();

    assert_eq!(whisper.transcribe(wav).await.unwrap(), "What is a let serve?");
}

#[tokio::test]
async fn test_whisper_rejection_is_stt_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let whisper =
        WhisperTranscriber::new(SecretString::from("sk-bad"), "whisper-1".to_string(), &server.uri())
            .unwrap();

    let err = whisper.transcribe(Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Stt(_)));
}

#[test]
fn test_whisper_requires_key() {
    assert!(WhisperTranscriber::new(SecretString::from(" "), "whisper-1".to_string(), "http://x").is_err());
}

/// Sink that "plays" for a while and records what it played
#[derive(Default)]
struct MockSink {
    played: Mutex<Vec<(Vec<u8>, bool)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    playing: AtomicBool,
}

impl AudioSink for MockSink {
    fn play_mp3(&self, mp3: &[u8], stop: &AtomicBool) -> pickleball_guru::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);

        let mut stopped = false;
        for _ in 0..20 {
            if stop.load(Ordering::SeqCst) {
                stopped = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        self.played.lock().unwrap().push((mp3.to_vec(), stopped));
        self.playing.store(false, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn proxy_with(mocks: Vec<Mock>) -> MockServer {
    let server = MockServer::start().await;
    for mock in mocks {
        mock.mount(&server).await;
    }
    server
}

fn tts_mock(text: &str, audio: &'static [u8], delay: Duration) -> Mock {
    Mock::given(method("POST"))
        .and(path("/api/tts"))
        .and(body_json(json!({ "text": text })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(audio)
                .set_delay(delay),
        )
}

async fn wait_until_settled(output: &RemoteSynthesis) -> OutputStatus {
    let mut rx = output.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = rx.borrow_and_update().clone();
            if status != OutputStatus::Speaking {
                return status;
            }
            if rx.changed().await.is_err() {
                return OutputStatus::Idle;
            }
        }
    })
    .await
    .expect("speech output never settled")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quick_second_speak_supersedes_first() {
    let server = proxy_with(vec![
        tts_mock("first answer", b"mp3-first", Duration::from_millis(200)),
        tts_mock("second answer", b"mp3-second", Duration::ZERO),
    ])
    .await;

    let sink = Arc::new(MockSink::default());
    let output = RemoteSynthesis::new(TtsProxyClient::new(&server.uri()), Arc::clone(&sink) as Arc<dyn AudioSink>);

    output.speak("first answer");
    output.speak("second answer");
    assert!(output.is_speaking());

    assert_eq!(wait_until_settled(&output).await, OutputStatus::Idle);

    let played = sink.played.lock().unwrap().clone();
    assert_eq!(played, vec![(b"mp3-second".to_vec(), false)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interrupting_playback_never_overlaps() {
    let server = proxy_with(vec![
        tts_mock("first answer", b"mp3-first", Duration::ZERO),
        tts_mock("second answer", b"mp3-second", Duration::ZERO),
    ])
    .await;

    let sink = Arc::new(MockSink::default());
    let output = RemoteSynthesis::new(TtsProxyClient::new(&server.uri()), Arc::clone(&sink) as Arc<dyn AudioSink>);

    output.speak("first answer");
    tokio::time::timeout(Duration::from_secs(5), async {
        while !sink.playing.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first utterance never started");

    output.speak("second answer");
    assert_eq!(wait_until_settled(&output).await, OutputStatus::Idle);

    // The blocking playback of the first utterance may outlive its task
    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.played.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second utterance never played");

    let played = sink.played.lock().unwrap().clone();
    assert_eq!(played[0], (b"mp3-first".to_vec(), true));
    assert_eq!(played[1], (b"mp3-second".to_vec(), false));
    assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_stops_speaking() {
    let server = proxy_with(vec![tts_mock(
        "an answer",
        b"mp3",
        Duration::from_millis(500),
    )])
    .await;
    let sink = Arc::new(MockSink::default());
    let output = RemoteSynthesis::new(TtsProxyClient::new(&server.uri()), Arc::clone(&sink) as Arc<dyn AudioSink>);

    output.speak("an answer");
    assert!(output.is_speaking());
    output.cancel();
    assert!(!output.is_speaking());

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(sink.played.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_speak_stops_pending_utterance() {
    let server = proxy_with(vec![tts_mock(
        "an answer",
        b"mp3",
        Duration::from_millis(300),
    )])
    .await;
    let sink = Arc::new(MockSink::default());
    let output = RemoteSynthesis::new(
        TtsProxyClient::new(&server.uri()),
        Arc::clone(&sink) as Arc<dyn AudioSink>,
    );

    output.speak("an answer");
    assert!(output.is_speaking());
    output.speak("  ");
    assert!(!output.is_speaking());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(sink.played.lock().unwrap().is_empty());
    assert_eq!(*output.subscribe().borrow(), OutputStatus::Idle);
}

#[tokio::test]
async fn test_proxy_failure_is_reported_not_fatal() {
    let server = proxy_with(vec![
        Mock::given(method("POST"))
            .and(path("/api/tts"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "code": "synthesis_failed", "message": "Failed to synthesize speech." }
            }))),
    ])
    .await;
    let sink = Arc::new(MockSink::default());
    let output = RemoteSynthesis::new(TtsProxyClient::new(&server.uri()), Arc::clone(&sink) as Arc<dyn AudioSink>);

    output.speak("an answer");
    let OutputStatus::Failed(reason) = wait_until_settled(&output).await else {
        panic!("expected failure status");
    };
    assert!(reason.contains("Failed to synthesize speech."));
    assert!(sink.played.lock().unwrap().is_empty());

    // Output stays usable
    output.speak("   ");
    assert!(!output.is_speaking());
}

#[tokio::test]
async fn test_proxy_client_returns_audio_bytes() {
    let server = proxy_with(vec![tts_mock("Hello", b"mp3-hello", Duration::ZERO)]).await;
    let audio = TtsProxyClient::new(&format!("{}/", server.uri()))
        .synthesize("Hello")
        .await
        .unwrap();
    assert_eq!(audio, b"mp3-hello");
}
