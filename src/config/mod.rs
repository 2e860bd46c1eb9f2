//! Configuration management for Pickleball Guru
//!
//! Values are resolved once at startup with the precedence
//! environment > `config.toml` > built-in defaults, then treated as immutable.

pub mod file;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use self::file::GuruConfigFile;

/// Placeholder project id shipped in sample configuration
pub const PROJECT_ID_PLACEHOLDER: &str = "YOUR_GOOGLE_CLOUD_PROJECT_ID_OR_NUMBER";

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default generative language API base URL
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default pickleball rules datastore
pub const DEFAULT_DATASTORE_ID: &str = "pickleball-rules-datastore_1749867119733";

/// Default Cloud TTS voice
pub const DEFAULT_TTS_VOICE: &str = "en-US-Standard-I";

/// Default proxy port
pub const DEFAULT_PORT: u16 = 3000;

/// Pickleball Guru configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Answer service configuration
    pub answer: AnswerConfig,

    /// Voice input/output configuration
    pub voice: VoiceConfig,

    /// Cloud TTS upstream used by the proxy
    pub tts: TtsConfig,

    /// HTTP proxy server configuration
    pub api_server: ApiServerConfig,

    /// Session behaviour
    pub session: SessionConfig,
}

/// Answer service (Gemini) configuration
#[derive(Debug, Clone)]
pub struct AnswerConfig {
    /// Gemini API key
    pub api_key: Option<SecretString>,

    /// Model identifier
    pub model: String,

    /// API base URL
    pub base_url: String,

    /// Retrieval datastore for grounding
    pub datastore: DatastoreConfig,
}

/// Vertex AI Search datastore coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreConfig {
    /// Google Cloud project id or number
    pub project_id: Option<String>,

    /// Datastore location
    pub location: String,

    /// Collection id
    pub collection_id: String,

    /// Datastore id
    pub datastore_id: String,
}

/// How answers are spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Round trip through the TTS proxy
    #[default]
    Remote,
    /// Platform speech synthesis command
    Local,
    /// Text only
    Off,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Output strategy
    pub output: OutputMode,

    /// Base URL of the TTS proxy used for remote output
    pub tts_url: String,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// `OpenAI` API key for speech recognition
    pub stt_api_key: Option<SecretString>,

    /// STT API base URL
    pub stt_url: String,
}

/// Google Cloud Text-to-Speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Raw service account JSON
    pub credentials_json: Option<SecretString>,

    /// Voice name
    pub voice_name: String,

    /// Language code
    pub language_code: String,

    /// API base URL
    pub endpoint: String,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait between ending and restarting a session on reconnect
    pub reconnect_delay: Duration,
}

/// Persistent, non-fatal configuration problems shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No Gemini API key; answering is disabled
    ApiKeyMissing,
    /// No usable project id; answers are not grounded in the datastore
    ProjectIdMissing,
}

impl ConfigWarning {
    /// Human-readable warning text
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ApiKeyMissing => {
                "Gemini API key is not set. Set GEMINI_API_KEY to enable answers."
            }
            Self::ProjectIdMissing => {
                "Google Cloud project id is not set. Answers will not be grounded in the pickleball rules datastore. Set GOOGLE_CLOUD_PROJECT_ID."
            }
        }
    }
}

impl DatastoreConfig {
    /// Project id if set and not the sample placeholder
    #[must_use]
    pub fn usable_project_id(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != PROJECT_ID_PLACEHOLDER)
    }

    /// Full datastore resource path, when grounding is possible
    #[must_use]
    pub fn resource_path(&self) -> Option<String> {
        self.usable_project_id().map(|project| {
            format!(
                "projects/{project}/locations/{}/collections/{}/dataStores/{}",
                self.location, self.collection_id, self.datastore_id
            )
        })
    }
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: "global".to_string(),
            collection_id: "default_collection".to_string(),
            datastore_id: DEFAULT_DATASTORE_ID.to_string(),
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_URL.to_string(),
            datastore: DatastoreConfig::default(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            credentials_json: None,
            voice_name: DEFAULT_TTS_VOICE.to_string(),
            language_code: "en-US".to_string(),
            endpoint: "https://texttospeech.googleapis.com/v1".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(1000),
        }
    }
}

impl OutputMode {
    /// Parse a mode name, case-insensitively
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "proxy" => Some(Self::Remote),
            "local" | "system" => Some(Self::Local),
            "off" | "none" | "text" => Some(Self::Off),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment and the config file
    #[must_use]
    pub fn load() -> Self {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed config file and an env lookup
    ///
    /// Empty environment values count as unset.
    #[must_use]
    pub fn from_sources<F>(fc: GuruConfigFile, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // API key (env > toml)
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or_else(|| env("VITE_API_KEY"))
            .or(fc.answer.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let defaults = DatastoreConfig::default();
        let datastore = DatastoreConfig {
            project_id: env("GOOGLE_CLOUD_PROJECT_ID")
                .or_else(|| env("VITE_GOOGLE_CLOUD_PROJECT_ID"))
                .or(fc.datastore.project_id),
            location: env("DATASTORE_LOCATION")
                .or(fc.datastore.location)
                .unwrap_or(defaults.location),
            collection_id: env("DATASTORE_COLLECTION_ID")
                .or(fc.datastore.collection_id)
                .unwrap_or(defaults.collection_id),
            datastore_id: env("DATASTORE_ID")
                .or(fc.datastore.datastore_id)
                .unwrap_or(defaults.datastore_id),
        };

        let answer = AnswerConfig {
            api_key,
            model: env("GURU_MODEL")
                .or(fc.answer.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: env("GURU_GEMINI_URL")
                .or(fc.answer.base_url)
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            datastore,
        };

        let port = env("GURU_PORT")
            .or_else(|| env("PORT"))
            .and_then(|p| p.parse().ok())
            .or(fc.server.port)
            .unwrap_or(DEFAULT_PORT);

        let output = match env("GURU_OUTPUT").or(fc.voice.output) {
            Some(raw) => OutputMode::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown output mode, using remote");
                OutputMode::Remote
            }),
            None => OutputMode::default(),
        };

        let voice = VoiceConfig {
            output,
            tts_url: env("GURU_TTS_URL")
                .or(fc.voice.tts_url)
                .unwrap_or_else(|| format!("http://127.0.0.1:{port}")),
            stt_model: env("GURU_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            stt_api_key: env("OPENAI_API_KEY")
                .or(fc.voice.stt_api_key)
                .map(SecretString::from),
            stt_url: env("GURU_STT_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        };

        let tts_defaults = TtsConfig::default();
        let tts = TtsConfig {
            credentials_json: env("GOOGLE_APPLICATION_CREDENTIALS_JSON").map(SecretString::from),
            voice_name: env("GURU_TTS_VOICE")
                .or(fc.server.tts_voice)
                .unwrap_or(tts_defaults.voice_name),
            language_code: env("GURU_TTS_LANGUAGE")
                .or(fc.server.tts_language)
                .unwrap_or(tts_defaults.language_code),
            endpoint: tts_defaults.endpoint,
        };

        let session = SessionConfig {
            reconnect_delay: env("GURU_RECONNECT_DELAY_MS")
                .and_then(|ms| ms.parse().ok())
                .or(fc.session.reconnect_delay_ms)
                .map_or_else(|| SessionConfig::default().reconnect_delay, Duration::from_millis),
        };

        Self {
            answer,
            voice,
            tts,
            api_server: ApiServerConfig { port },
            session,
        }
    }

    /// Whether an API key is configured
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.answer
            .api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }

    /// Persistent warnings to surface in the presentation layer
    #[must_use]
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if !self.has_api_key() {
            warnings.push(ConfigWarning::ApiKeyMissing);
        }
        if self.answer.datastore.usable_project_id().is_none() {
            warnings.push(ConfigWarning::ProjectIdMissing);
        }
        warnings
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_sources(GuruConfigFile::default(), |_| None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load_with(vars: &[(&str, &str)], fc: GuruConfigFile) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_sources(fc, |key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::default();
        assert!(config.answer.api_key.is_none());
        assert_eq!(config.answer.model, DEFAULT_MODEL);
        assert_eq!(config.answer.datastore.location, "global");
        assert_eq!(config.answer.datastore.collection_id, "default_collection");
        assert_eq!(config.answer.datastore.datastore_id, DEFAULT_DATASTORE_ID);
        assert_eq!(config.api_server.port, DEFAULT_PORT);
        assert_eq!(config.voice.output, OutputMode::Remote);
        assert_eq!(config.voice.tts_url, "http://127.0.0.1:3000");
        assert_eq!(config.tts.voice_name, "en-US-Standard-I");
        assert_eq!(
            config.warnings(),
            vec![ConfigWarning::ApiKeyMissing, ConfigWarning::ProjectIdMissing]
        );
    }

    #[test]
    fn api_key_fallback_chain() {
        let config = load_with(&[("VITE_API_KEY", "vite-key")], GuruConfigFile::default());
        assert_eq!(
            config.answer.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("vite-key".to_string())
        );

        let config = load_with(
            &[("GEMINI_API_KEY", "primary"), ("API_KEY", "secondary")],
            GuruConfigFile::default(),
        );
        assert_eq!(
            config.answer.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("primary".to_string())
        );
    }

    #[test]
    fn env_overrides_file() {
        let fc: GuruConfigFile = toml::from_str(
            r#"
            [answer]
            model = "from-file"

            [server]
            port = 8080

            [datastore]
            project_id = "file-project"
            "#,
        )
        .unwrap();

        let config = load_with(&[("GURU_MODEL", "from-env")], fc);
        assert_eq!(config.answer.model, "from-env");
        assert_eq!(config.api_server.port, 8080);
        assert_eq!(config.voice.tts_url, "http://127.0.0.1:8080");
        assert_eq!(
            config.answer.datastore.project_id.as_deref(),
            Some("file-project")
        );
    }

    #[test]
    fn empty_env_counts_as_unset() {
        let config = load_with(&[("GEMINI_API_KEY", "  ")], GuruConfigFile::default());
        assert!(!config.has_api_key());
    }

    #[test]
    fn placeholder_project_is_not_usable() {
        let config = load_with(
            &[
                ("GEMINI_API_KEY", "k"),
                ("GOOGLE_CLOUD_PROJECT_ID", PROJECT_ID_PLACEHOLDER),
            ],
            GuruConfigFile::default(),
        );
        assert!(config.answer.datastore.resource_path().is_none());
        assert_eq!(config.warnings(), vec![ConfigWarning::ProjectIdMissing]);
    }

    #[test]
    fn resource_path_uses_all_coordinates() {
        let config = load_with(
            &[
                ("GOOGLE_CLOUD_PROJECT_ID", "my-project"),
                ("DATASTORE_LOCATION", "us"),
                ("DATASTORE_ID", "rules"),
            ],
            GuruConfigFile::default(),
        );
        assert_eq!(
            config.answer.datastore.resource_path().as_deref(),
            Some("projects/my-project/locations/us/collections/default_collection/dataStores/rules")
        );
    }

    #[test]
    fn output_mode_parsing() {
        assert_eq!(OutputMode::parse("LOCAL"), Some(OutputMode::Local));
        assert_eq!(OutputMode::parse("off"), Some(OutputMode::Off));
        assert_eq!(OutputMode::parse("bogus"), None);

        let config = load_with(&[("GURU_OUTPUT", "bogus")], GuruConfigFile::default());
        assert_eq!(config.voice.output, OutputMode::Remote);
    }

    #[test]
    fn reconnect_delay_from_env() {
        let config = load_with(&[("GURU_RECONNECT_DELAY_MS", "250")], GuruConfigFile::default());
        assert_eq!(config.session.reconnect_delay, Duration::from_millis(250));
    }
}
