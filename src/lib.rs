//! Pickleball Guru - voice question answering over the official pickleball rules
//!
//! This library provides:
//! - Speech capture (microphone, endpointing, transcription)
//! - Rules-grounded answers from Gemini with datastore retrieval
//! - Speech output through a text-to-speech proxy or the platform synthesizer
//! - The TTS proxy HTTP server itself
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Session Orchestrator                  │
//! │   connect  │  listen  │  ask  │  speak  │  teardown   │
//! └──────┬──────────────────┬─────────────────┬──────────┘
//!        │                  │                 │
//! ┌──────▼───────┐  ┌───────▼───────┐  ┌──────▼───────────┐
//! │ Speech       │  │ Answer        │  │ Speech output    │
//! │ capture      │  │ (Gemini +     │  │ (proxy / local)  │
//! │ (mic + STT)  │  │  datastore)   │  └──────┬───────────┘
//! └──────────────┘  └───────────────┘         │
//!                                      ┌──────▼───────────┐
//!                                      │ TTS proxy        │
//!                                      │ POST /api/tts    │
//!                                      │ (Cloud TTS)      │
//!                                      └──────────────────┘
//! ```

pub mod answer;
pub mod api;
pub mod config;
pub mod error;
pub mod prompt;
pub mod render;
pub mod session;
pub mod tts;
pub mod voice;

pub use answer::{Answer, AnswerService, GeminiClient};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use session::{Orchestrator, SessionEvent, SessionSnapshot, SessionState};
