//! Gemini `generateContent` client with optional Vertex AI Search grounding

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::grounding::{self, GroundingMetadata};
use super::{Answer, AnswerService};
use crate::config::{AnswerConfig, DatastoreConfig};
use crate::prompt::{RULES_SYSTEM_PROMPT, user_prompt};
use crate::{Error, Result};

const TEMPERATURE: f32 = 0.7;
const TOP_K: u32 = 1;
const TOP_P: f32 = 1.0;
const MAX_OUTPUT_TOKENS: u32 = 2048;

/// Request body for `models/{model}:generateContent`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Tool {
    retrieval: Retrieval,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Retrieval {
    vertex_ai_search: VertexAiSearch,
}

#[derive(Debug, Serialize)]
struct VertexAiSearch {
    datastore: String,
}

/// Response body from `generateContent`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Google API error envelope
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// Answers questions through the Gemini API
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    datastore: DatastoreConfig,
    grounding_warning: Option<String>,
}

impl GeminiClient {
    /// Create a client from answer configuration
    ///
    /// Logs a warning when no usable project id is configured; requests
    /// then proceed without the retrieval tool.
    #[must_use]
    pub fn new(config: &AnswerConfig) -> Self {
        let grounding_warning = if config.datastore.resource_path().is_none() {
            let warning = format!(
                "Project ID is '{}'. Vertex AI Search tool for datastore '{}' will not be used. Answers may not be grounded to your specific ruleset.",
                config.datastore.project_id.as_deref().unwrap_or_default(),
                config.datastore.datastore_id
            );
            tracing::warn!(datastore = %config.datastore.datastore_id, "{warning}");
            Some(warning)
        } else {
            None
        };

        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            datastore: config.datastore.clone(),
            grounding_warning,
        }
    }

    /// Warning recorded when answers cannot be grounded
    #[must_use]
    pub fn grounding_warning(&self) -> Option<&str> {
        self.grounding_warning.as_deref()
    }

    /// Whether requests carry the retrieval tool
    #[must_use]
    pub fn is_grounded(&self) -> bool {
        self.grounding_warning.is_none()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }

    fn tools(&self) -> Vec<Tool> {
        self.datastore
            .resource_path()
            .map(|datastore| Tool {
                retrieval: Retrieval {
                    vertex_ai_search: VertexAiSearch { datastore },
                },
            })
            .into_iter()
            .collect()
    }

    /// Map a failed response to the error taxonomy
    fn classify(&self, status: reqwest::StatusCode, body: &str) -> Error {
        classify_failure(status, body, self.is_grounded(), &self.datastore)
    }
}

/// Classify a non-success Gemini response
///
/// Structured fields (HTTP status, `error.status`, detail reasons) are
/// consulted first; message text is the fallback.
pub(crate) fn classify_failure(
    status: reqwest::StatusCode,
    body: &str,
    grounded: bool,
    datastore: &DatastoreConfig,
) -> Error {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let api = envelope.error;
    let message = if api.message.is_empty() {
        format!("{status}: {body}")
    } else {
        api.message.clone()
    };

    let reason_is = |wanted: &str| api.details.iter().any(|d| d.reason.as_deref() == Some(wanted));

    if status == reqwest::StatusCode::UNAUTHORIZED
        || api.status == "UNAUTHENTICATED"
        || reason_is("API_KEY_INVALID")
        || message.contains("API key not valid")
    {
        return Error::Auth(
            "Invalid Gemini API key. Please check your GEMINI_API_KEY environment variable."
                .to_string(),
        );
    }

    let invalid_argument = api.status == "INVALID_ARGUMENT" || message.contains("INVALID_ARGUMENT");
    if (grounded && api.status == "PERMISSION_DENIED")
        || message.contains("Vertex AI Search datastore")
        || message.contains("Permission denied on resource")
        || (invalid_argument && message.to_ascii_lowercase().contains("datastore"))
    {
        return Error::GroundingConfig(format!(
            "Error with Vertex AI Search datastore configuration or access: {message}. Ensure Project ID ('{}'), location ('{}'), and datastore ID ('{}') are correct, the datastore exists, and the API key has permissions.",
            datastore.project_id.as_deref().unwrap_or_default(),
            datastore.location,
            datastore.datastore_id
        ));
    }

    Error::Upstream(format!(
        "Failed to communicate with the Pickleball Guru (Gemini API): {message}"
    ))
}

#[async_trait]
impl AnswerService for GeminiClient {
    async fn ask(&self, question: &str) -> Result<Answer> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or_else(|| Error::Config("Gemini API key is not provided.".to_string()))?;

        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuestion);
        }

        let prompt = user_prompt(question);
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![TextPart {
                    text: RULES_SYSTEM_PROMPT,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![TextPart { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                top_k: TOP_K,
                top_p: TOP_P,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
            tools: self.tools(),
        };

        tracing::debug!(
            model = %self.model,
            grounded = !request.tools.is_empty(),
            "sending question to Gemini"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gemini request failed");
                Error::Upstream(format!(
                    "Failed to communicate with the Pickleball Guru (Gemini API): {e}"
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini API error");
            return Err(self.classify(status, &body));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Gemini response");
            Error::Upstream(format!(
                "Failed to communicate with the Pickleball Guru (Gemini API): {e}"
            ))
        })?;

        let block_reason = body.prompt_feedback.and_then(|f| f.block_reason);
        let candidate = body.candidates.into_iter().next().unwrap_or_default();

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            let detail = block_reason.map_or_else(
                || "response contained no answer text".to_string(),
                |reason| format!("question was blocked ({reason})"),
            );
            return Err(Error::Upstream(format!(
                "Failed to communicate with the Pickleball Guru (Gemini API): {detail}"
            )));
        }

        let grounding_sources = candidate
            .grounding_metadata
            .map(grounding::normalize)
            .unwrap_or_default();

        tracing::info!(
            answer_chars = text.len(),
            sources = grounding_sources.len(),
            "answer received"
        );

        Ok(Answer {
            text,
            grounding_sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    fn datastore() -> DatastoreConfig {
        DatastoreConfig {
            project_id: Some("my-project".to_string()),
            ..DatastoreConfig::default()
        }
    }

    #[test]
    fn invalid_key_is_auth() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, body, true, &datastore());
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn unauthorized_status_is_auth() {
        let err = classify_failure(StatusCode::UNAUTHORIZED, "", false, &datastore());
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn permission_denied_with_tool_is_grounding_config() {
        let body = r#"{"error":{"code":403,"message":"Caller lacks access","status":"PERMISSION_DENIED"}}"#;
        let err = classify_failure(StatusCode::FORBIDDEN, body, true, &datastore());
        let Error::GroundingConfig(msg) = err else {
            panic!("expected grounding config error");
        };
        assert!(msg.contains("'my-project'"));
        assert!(msg.contains("'global'"));
        assert!(msg.contains(crate::config::DEFAULT_DATASTORE_ID));
    }

    #[test]
    fn permission_denied_without_tool_is_upstream() {
        let body = r#"{"error":{"code":403,"message":"Caller lacks access","status":"PERMISSION_DENIED"}}"#;
        let err = classify_failure(StatusCode::FORBIDDEN, body, false, &datastore());
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[test]
    fn datastore_message_fallback() {
        let body = r#"{"error":{"code":400,"message":"Invalid datastore path","status":"INVALID_ARGUMENT"}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, body, true, &datastore());
        assert!(matches!(err, Error::GroundingConfig(_)));
    }

    #[test]
    fn unstructured_failure_is_upstream() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, "<html>oops</html>", true, &datastore());
        let Error::Upstream(msg) = err else {
            panic!("expected upstream error");
        };
        assert!(msg.starts_with("Failed to communicate with the Pickleball Guru (Gemini API):"));
    }

    #[test]
    fn placeholder_project_has_no_tool() {
        let config = AnswerConfig {
            datastore: DatastoreConfig {
                project_id: Some(crate::config::PROJECT_ID_PLACEHOLDER.to_string()),
                ..DatastoreConfig::default()
            },
            ..AnswerConfig::default()
        };
        let client = GeminiClient::new(&config);
        assert!(client.tools().is_empty());
        assert!(client.grounding_warning().is_some_and(|w| w.contains("will not be used")));
    }

    #[test]
    fn request_serializes_retrieval_tool() {
        let config = AnswerConfig {
            datastore: datastore(),
            ..AnswerConfig::default()
        };
        let client = GeminiClient::new(&config);
        let value = serde_json::to_value(client.tools()).unwrap();
        assert_eq!(
            value[0]["retrieval"]["vertexAiSearch"]["datastore"],
            format!(
                "projects/my-project/locations/global/collections/default_collection/dataStores/{}",
                crate::config::DEFAULT_DATASTORE_ID
            )
        );
        assert!(client.endpoint().ends_with("/models/gemini-2.5-flash:generateContent"));
    }
}
