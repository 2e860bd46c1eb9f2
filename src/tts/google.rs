//! Google Cloud Text-to-Speech client
//!
//! Authenticates with a service account (RS256 JWT bearer grant) and calls
//! `text:synthesize`. The access token is reused until shortly before it
//! expires; audio is never cached.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::credentials::ServiceAccount;
use super::{CloudSynthesizer, SynthesisError};
use crate::config::TtsConfig;
use crate::voice::PLAYBACK_SAMPLE_RATE;

const TOKEN_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Refresh tokens this many seconds before they expire
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 300;

/// Cached token info
struct TokenInfo {
    access_token: String,
    expires_at: u64,
}

/// JWT claims for Google OAuth
#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: u64,
    iat: u64,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    sample_rate_hertz: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Google Cloud TTS synthesizer
pub struct GoogleTts {
    client: reqwest::Client,
    account: ServiceAccount,
    voice_name: String,
    language_code: String,
    endpoint: String,
    access_token: Mutex<Option<TokenInfo>>,
}

impl GoogleTts {
    /// Create a synthesizer for a parsed service account
    #[must_use]
    pub fn new(account: ServiceAccount, config: &TtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            account,
            voice_name: config.voice_name.clone(),
            language_code: config.language_code.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: Mutex::new(None),
        }
    }

    /// Create JWT for token request
    fn create_jwt(&self) -> Result<String, SynthesisError> {
        use jsonwebtoken::{Algorithm, EncodingKey, Header};

        let now = unix_now();
        let header = Header::new(Algorithm::RS256);
        let claims = JwtClaims {
            iss: &self.account.client_email,
            scope: TOKEN_SCOPE,
            aud: &self.account.token_uri,
            exp: now + 3600,
            iat: now,
        };

        let key = EncodingKey::from_rsa_pem(self.account.private_key_pem().as_bytes())
            .map_err(|e| SynthesisError::Failed(format!("invalid service account private key: {e}")))?;

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| SynthesisError::Failed(format!("JWT encoding failed: {e}")))
    }

    /// Get or refresh access token
    async fn access_token(&self) -> Result<String, SynthesisError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > unix_now() + TOKEN_EXPIRY_MARGIN_SECS
        {
            return Ok(token.access_token.clone());
        }

        let jwt = self.create_jwt()?;
        let response = self
            .client
            .post(&self.account.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SynthesisError::Failed(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "token request rejected");
            return Err(SynthesisError::Failed(format!(
                "token request failed: {status}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Failed(format!("token parse error: {e}")))?;

        tracing::debug!(expires_in = token.expires_in, "obtained TTS access token");
        *cached = Some(TokenInfo {
            access_token: token.access_token.clone(),
            expires_at: unix_now() + token.expires_in,
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl CloudSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let token = self.access_token().await?;

        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &self.language_code,
                name: &self.voice_name,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                sample_rate_hertz: PLAYBACK_SAMPLE_RATE,
            },
        };

        let response = self
            .client
            .post(format!("{}/text:synthesize", self.endpoint))
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| SynthesisError::Failed(format!("synthesis request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Cloud TTS error");
            let message = format!("Cloud TTS returned {status}");
            return Err(if status == reqwest::StatusCode::FORBIDDEN {
                SynthesisError::PermissionDenied(message)
            } else {
                SynthesisError::Failed(message)
            });
        }

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Failed(format!("invalid synthesis response: {e}")))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(body.audio_content.as_bytes())
            .map_err(|e| SynthesisError::Failed(format!("invalid audio encoding: {e}")))?;

        tracing::info!(chars = text.len(), bytes = audio.len(), "speech synthesized");
        Ok(audio)
    }

    fn voice_label(&self) -> String {
        format!("{} ({})", self.voice_name, self.language_code)
    }
}
