use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use pickleball_guru::api::{ApiServerBuilder, TtsBackend};
use pickleball_guru::config::OutputMode;
use pickleball_guru::render::{render, render_answer};
use pickleball_guru::tts::{CloudSynthesizer, SELF_TEST_TEXT};
use pickleball_guru::voice::{
    AudioCapture, AudioPlayback, AudioSink, Capability, LocalSynthesis, MicrophoneRecognizer,
    OutputStatus, PLAYBACK_SAMPLE_RATE, Recognizer, RemoteSynthesis, SpeechCapture, SpeechOutput,
    Transcriber, TtsProxyClient, WhisperTranscriber, samples_to_wav,
};
use pickleball_guru::{AnswerService, Config, GeminiClient, Orchestrator, SessionEvent};

/// Pickleball Guru - ask pickleball rules questions by voice
#[derive(Parser)]
#[command(name = "guru", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive voice session (default)
    Session {
        /// Also run the TTS proxy in this process
        #[arg(long)]
        with_proxy: bool,
    },
    /// Run the text-to-speech proxy server
    Serve {
        /// Port to listen on
        #[arg(long, env = "GURU_PORT")]
        port: Option<u16>,
    },
    /// Ask a single typed question
    Ask {
        /// The question
        question: String,
        /// Speak the answer
        #[arg(long)]
        speak: bool,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test Cloud TTS and play the result
    TestTts {
        /// Text to speak
        #[arg(default_value = SELF_TEST_TEXT)]
        text: String,
        /// Go through the running proxy instead of calling Cloud TTS directly
        #[arg(long)]
        via_proxy: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,pickleball_guru=info",
        1 => "info,pickleball_guru=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load();
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Session { with_proxy: false }) {
        Command::Session { with_proxy } => run_session(&config, with_proxy).await,
        Command::Serve { port } => serve(config, port).await,
        Command::Ask { question, speak } => ask(&config, &question, speak).await,
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text, via_proxy } => test_tts(&config, &text, via_proxy).await,
    }
}

/// Build the configured speech output
fn build_output(config: &Config) -> Capability<Arc<dyn SpeechOutput>> {
    match config.voice.output {
        OutputMode::Remote => match AudioPlayback::new() {
            Ok(playback) => {
                let output: Arc<dyn SpeechOutput> = Arc::new(RemoteSynthesis::new(
                    TtsProxyClient::new(&config.voice.tts_url),
                    Arc::new(playback),
                ));
                Capability::Available(output)
            }
            Err(e) => Capability::unavailable(format!("Speech output is not available: {e}")),
        },
        OutputMode::Local => {
            LocalSynthesis::detect().map(|local| Arc::new(local) as Arc<dyn SpeechOutput>)
        }
        OutputMode::Off => Capability::unavailable("Speech output is turned off."),
    }
}

fn build_transcriber(config: &Config) -> Option<Arc<dyn Transcriber>> {
    let key = config.voice.stt_api_key.clone()?;
    match WhisperTranscriber::new(key, config.voice.stt_model.clone(), &config.voice.stt_url) {
        Ok(whisper) => Some(Arc::new(whisper)),
        Err(e) => {
            tracing::warn!(error = %e, "speech recognition disabled");
            None
        }
    }
}

/// Build the microphone recognizer
fn build_recognizer(config: &Config) -> Capability<Box<dyn Recognizer>> {
    MicrophoneRecognizer::probe(build_transcriber(config))
        .map(|mic| Box::new(mic) as Box<dyn Recognizer>)
}

fn print_help() {
    println!("Commands:");
    println!("  <enter>, l   ask a question (start listening)");
    println!("  s            stop listening");
    println!("  p            play or stop the answer");
    println!("  x            stop speaking");
    println!("  c            start the session");
    println!("  r            reconnect");
    println!("  e            end the session");
    println!("  q            quit");
}

/// Interactive voice session on stdin
async fn run_session(config: &Config, with_proxy: bool) -> anyhow::Result<()> {
    if with_proxy {
        let _proxy = ApiServerBuilder::new(config.api_server.port)
            .tts_config(config.tts.clone())
            .build()
            .spawn();
    }

    let answers: Arc<dyn AnswerService> = Arc::new(GeminiClient::new(&config.answer));
    let capture = SpeechCapture::new(build_recognizer(config));
    let mut orchestrator = Orchestrator::new(config, answers, capture, build_output(config));

    print_help();
    if let Err(e) = orchestrator.start_session() {
        tracing::debug!(error = %e, "session did not start");
    }
    print!("{}", render(&orchestrator.snapshot()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let result = match line.trim() {
                    "" | "l" | "listen" => orchestrator.start_listening(),
                    "s" | "stop" => {
                        orchestrator.stop_listening();
                        Ok(())
                    }
                    "p" | "play" => {
                        orchestrator.toggle_answer_playback();
                        Ok(())
                    }
                    "x" | "quiet" => {
                        orchestrator.cancel_speech();
                        Ok(())
                    }
                    "c" | "connect" => orchestrator.start_session(),
                    "r" | "reconnect" => orchestrator.reconnect().await,
                    "e" | "end" => {
                        orchestrator.end_session();
                        Ok(())
                    }
                    "q" | "quit" | "exit" => break,
                    "h" | "help" | "?" => {
                        print_help();
                        continue;
                    }
                    other => {
                        println!("Unknown command: {other}");
                        continue;
                    }
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, "command rejected");
                    if !orchestrator.last_error().is_some_and(|le| le.message == e.user_message()) {
                        println!("{}", e.user_message());
                    }
                }
                print!("{}", render(&orchestrator.snapshot()));
            }
            event = orchestrator.step() => {
                match event {
                    SessionEvent::Ignored => {}
                    SessionEvent::Transcript(text) => println!("... {text}"),
                    _ => print!("{}", render(&orchestrator.snapshot())),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    orchestrator.end_session();
    Ok(())
}

/// Run the TTS proxy until interrupted
async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.api_server.port);
    let server = ApiServerBuilder::new(port).tts_config(config.tts).build();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    Ok(())
}

/// Wait until an utterance finishes
async fn wait_for_speech(output: &dyn SpeechOutput) -> OutputStatus {
    let mut status = output.subscribe();
    loop {
        let current = status.borrow_and_update().clone();
        if current != OutputStatus::Speaking {
            return current;
        }
        if status.changed().await.is_err() {
            return OutputStatus::Idle;
        }
    }
}

/// Ask one typed question
async fn ask(config: &Config, question: &str, speak: bool) -> anyhow::Result<()> {
    for warning in config.warnings() {
        eprintln!("! {}", warning.message());
    }

    let client = GeminiClient::new(&config.answer);
    let answer = client.ask(question).await?;
    print!("{}", render_answer(&answer));

    if speak {
        match build_output(config) {
            Capability::Available(output) => {
                output.speak(&answer.text);
                if let OutputStatus::Failed(reason) = wait_for_speech(output.as_ref()).await {
                    anyhow::bail!("speech output failed: {reason}");
                }
            }
            Capability::Unavailable { reason } => eprintln!("{reason}"),
        }
    }

    Ok(())
}

/// Test microphone input, transcribing the recording when possible
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Ask a pickleball question into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    let mut recording = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
        recording.extend(samples);
    }

    capture.stop();

    println!("\n---");
    match build_transcriber(config) {
        Some(transcriber) => {
            let wav = samples_to_wav(&recording, sample_rate)?;
            println!("Transcribing {} bytes of audio...", wav.len());
            let text = transcriber.transcribe(wav).await?;
            println!("Heard: \"{}\"", text.trim());
        }
        None => println!("Set OPENAI_API_KEY to also test transcription."),
    }

    println!("If RMS stayed near 0, check that a microphone is connected and not muted.");
    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE * 2)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    tokio::task::spawn_blocking(move || playback.play_samples(samples, &AtomicBool::new(false)))
        .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    Ok(())
}

/// Synthesize `text` and play it
async fn test_tts(config: &Config, text: &str, via_proxy: bool) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let audio = if via_proxy {
        println!("Requesting speech from {}...", config.voice.tts_url);
        TtsProxyClient::new(&config.voice.tts_url)
            .synthesize(text)
            .await?
    } else {
        let synthesizer = match TtsBackend::from_config(&config.tts) {
            TtsBackend::Ready(s) => s,
            TtsBackend::Misconfigured(problem) => anyhow::bail!("{problem}"),
        };
        println!("Synthesizing with {}...", synthesizer.voice_label());
        synthesizer.synthesize(text).await?
    };
    println!("Got {} bytes of audio data", audio.len());

    println!("Playing audio...");
    let playback = AudioPlayback::new()?;
    tokio::task::spawn_blocking(move || playback.play_mp3(&audio, &AtomicBool::new(false)))
        .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");
    Ok(())
}
