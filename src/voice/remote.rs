//! Remote speech synthesis through the TTS proxy

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::output::{OutputStatus, PlaybackSlot, SpeechOutput};
use super::playback::AudioSink;
use crate::{Error, Result};

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct ProxyErrorBody {
    #[serde(default)]
    error: ProxyError,
}

#[derive(Deserialize, Default)]
struct ProxyError {
    #[serde(default)]
    message: String,
}

/// Client for `POST /api/tts`
#[derive(Clone)]
pub struct TtsProxyClient {
    client: reqwest::Client,
    base_url: String,
}

impl TtsProxyClient {
    /// Create a client for the proxy at `base_url`
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Synthesize `text`, returning MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` on transport failure and `Error::Tts` for a
    /// non-success response.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), "requesting speech from proxy");

        let response = self
            .client
            .post(format!("{}/api/tts", self.base_url))
            .json(&TtsRequest { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProxyErrorBody>(&body)
                .map(|b| b.error.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            return Err(Error::Tts(format!("TTS proxy returned {status}: {message}")));
        }

        let bytes = response.bytes().await?;
        tracing::debug!(bytes = bytes.len(), "received synthesized audio");
        Ok(bytes.to_vec())
    }
}

/// Speaks by fetching MP3 from the proxy and playing it through a sink
pub struct RemoteSynthesis {
    client: TtsProxyClient,
    sink: Arc<dyn AudioSink>,
    slot: Arc<PlaybackSlot>,
}

impl RemoteSynthesis {
    /// Create remote synthesis over `client`, playing through `sink`
    #[must_use]
    pub fn new(client: TtsProxyClient, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            client,
            sink,
            slot: Arc::new(PlaybackSlot::new()),
        }
    }
}

impl SpeechOutput for RemoteSynthesis {
    fn speak(&self, text: &str) {
        let text = text.trim().to_string();
        if text.is_empty() {
            self.slot.cancel();
            return;
        }

        let ticket = self.slot.begin();
        let slot = Arc::clone(&self.slot);
        let client = self.client.clone();
        let sink = Arc::clone(&self.sink);

        let task_ticket = ticket.clone();
        let task = tokio::spawn(async move {
            let audio = match client.synthesize(&text).await {
                Ok(audio) => audio,
                Err(e) => {
                    slot.finish(&task_ticket, Err(e.to_string()));
                    return;
                }
            };

            let guard = slot.acquire_audio().await;
            if task_ticket.is_stopped() {
                return;
            }

            // The guard moves into the blocking call so the device stays
            // locked until playback really ends, even if this task is aborted
            let stop = task_ticket.stop_flag();
            let played = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                sink.play_mp3(&audio, &stop)
            })
            .await;

            let outcome = match played {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("playback task failed: {e}")),
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
