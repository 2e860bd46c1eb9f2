//! Text-to-speech proxy endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{ApiState, TtsBackend};
use crate::tts::{CredentialProblem, SELF_TEST_TEXT, SynthesisError, clean_text};

/// Build TTS router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/tts", post(synthesize))
        .route("/tts-test", get(self_test))
        .with_state(state)
}

/// Synthesis request
#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// Self-test success report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTestReport {
    pub status: &'static str,
    pub message: &'static str,
    pub voice: String,
    pub test_text: &'static str,
}

/// Synthesize text to MP3
///
/// Asterisks are stripped before synthesis.
async fn synthesize(
    State(state): State<Arc<ApiState>>,
    request: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, TtsError> {
    let Json(request) = request.map_err(|e| {
        tracing::debug!(error = %e, "rejected TTS request body");
        TtsError::BadRequest("Request body must be JSON with a text field.")
    })?;

    let text = request
        .text
        .filter(|t| !t.is_empty())
        .ok_or(TtsError::BadRequest("Text to synthesize is required."))?;

    let text = clean_text(&text);
    if text.is_empty() {
        return Err(TtsError::BadRequest("Text to synthesize is required."));
    }

    let audio = synthesize_cleaned(&state.tts, &text).await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

async fn synthesize_cleaned(backend: &TtsBackend, text: &str) -> Result<Vec<u8>, TtsError> {
    let synthesizer = match backend {
        TtsBackend::Ready(s) => s,
        TtsBackend::Misconfigured(problem) => return Err(TtsError::NotConfigured(*problem)),
    };

    synthesizer.synthesize(text).await.map_err(|e| {
        tracing::error!(error = %e, "error synthesizing speech");
        TtsError::SynthesisFailed(e)
    })
}

/// Validate credentials and run one round-trip synthesis
async fn self_test(State(state): State<Arc<ApiState>>) -> Result<Json<SelfTestReport>, TtsError> {
    let voice = match &state.tts {
        TtsBackend::Ready(s) => s.voice_label(),
        TtsBackend::Misconfigured(problem) => return Err(TtsError::NotConfigured(*problem)),
    };

    synthesize_cleaned(&state.tts, SELF_TEST_TEXT)
        .await
        .map_err(|e| match e {
            TtsError::SynthesisFailed(inner) => TtsError::SelfTestFailed(inner),
            other => other,
        })?;

    Ok(Json(SelfTestReport {
        status: "OK",
        message: "TTS API is configured correctly",
        voice,
        test_text: SELF_TEST_TEXT,
    }))
}

/// TTS API errors
#[derive(Debug)]
pub enum TtsError {
    BadRequest(&'static str),
    NotConfigured(CredentialProblem),
    SynthesisFailed(SynthesisError),
    SelfTestFailed(SynthesisError),
}

impl IntoResponse for TtsError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
            #[serde(skip_serializing_if = "Option::is_none")]
            status: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let upstream_status = |e: &SynthesisError| match e {
            SynthesisError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            SynthesisError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (status, code, message, report_status, details) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.to_string(), None, None),
            Self::NotConfigured(problem) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                problem.message().to_string(),
                Some("Configuration Error".to_string()),
                None,
            ),
            Self::SynthesisFailed(e) => {
                let status = upstream_status(&e);
                let code = if status == StatusCode::FORBIDDEN {
                    "permission_denied"
                } else {
                    "synthesis_failed"
                };
                (status, code, "Failed to synthesize speech.".to_string(), None, None)
            }
            Self::SelfTestFailed(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "tts_test_failed",
                "TTS API call failed".to_string(),
                Some(upstream_status(&e).as_u16().to_string()),
                Some(e.to_string()),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody { code, message },
                status: report_status,
                details,
            }),
        )
            .into_response()
    }
}
