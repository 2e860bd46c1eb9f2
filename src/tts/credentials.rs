//! Google service account credentials

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Why credentials could not be used
///
/// Messages never include credential contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.message())]
pub enum CredentialProblem {
    /// Environment variable not set
    Missing,
    /// Not valid JSON
    InvalidJson,
    /// `client_email` or `private_key` absent
    MissingFields,
}

impl CredentialProblem {
    /// User-facing description
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Missing => "GOOGLE_APPLICATION_CREDENTIALS_JSON not set",
            Self::InvalidJson => "Invalid GOOGLE_APPLICATION_CREDENTIALS_JSON format",
            Self::MissingFields => "Missing required fields in credentials",
        }
    }
}

#[derive(Deserialize)]
struct RawServiceAccount {
    client_email: Option<String>,
    private_key: Option<String>,
    project_id: Option<String>,
    token_uri: Option<String>,
}

/// Parsed service account
pub struct ServiceAccount {
    /// Service account identity
    pub client_email: String,

    /// Owning project, if present
    pub project_id: Option<String>,

    /// OAuth token endpoint
    pub token_uri: String,

    private_key: SecretString,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// Parse service account JSON
    ///
    /// # Errors
    ///
    /// Returns the [`CredentialProblem`] describing what is wrong
    pub fn from_json(raw: Option<&SecretString>) -> Result<Self, CredentialProblem> {
        let raw = raw
            .map(|s| s.expose_secret().trim())
            .filter(|s| !s.is_empty())
            .ok_or(CredentialProblem::Missing)?;

        let parsed: RawServiceAccount =
            serde_json::from_str(raw).map_err(|_| CredentialProblem::InvalidJson)?;

        let client_email = parsed
            .client_email
            .filter(|v| !v.is_empty())
            .ok_or(CredentialProblem::MissingFields)?;
        let private_key = parsed
            .private_key
            .filter(|v| !v.is_empty())
            .ok_or(CredentialProblem::MissingFields)?;

        Ok(Self {
            client_email,
            project_id: parsed.project_id,
            token_uri: parsed
                .token_uri
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            private_key: SecretString::from(private_key),
        })
    }

    /// PEM-encoded RSA private key
    #[must_use]
    pub fn private_key_pem(&self) -> &str {
        self.private_key.expose_secret()
    }
}
