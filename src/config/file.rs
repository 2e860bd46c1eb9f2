//! TOML configuration file loading
//!
//! Supports `~/.config/pickleball-guru/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GuruConfigFile {
    /// Answer service configuration
    #[serde(default)]
    pub answer: AnswerFileConfig,

    /// Datastore used for grounding
    #[serde(default)]
    pub datastore: DatastoreFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// TTS proxy server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Session behaviour
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Answer service configuration
#[derive(Debug, Default, Deserialize)]
pub struct AnswerFileConfig {
    /// Gemini API key
    pub api_key: Option<String>,

    /// Model identifier (e.g. "gemini-2.5-flash")
    pub model: Option<String>,

    /// Base URL of the generative language API
    pub base_url: Option<String>,
}

/// Grounding datastore configuration
#[derive(Debug, Default, Deserialize)]
pub struct DatastoreFileConfig {
    /// Google Cloud project id or number
    pub project_id: Option<String>,

    /// Datastore location (e.g. "global")
    pub location: Option<String>,

    /// Collection id (e.g. "default_collection")
    pub collection_id: Option<String>,

    /// Datastore id
    pub datastore_id: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Output strategy: "remote", "local" or "off"
    pub output: Option<String>,

    /// Base URL of the TTS proxy
    pub tts_url: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// OpenAI key used for speech recognition
    pub stt_api_key: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Proxy port
    pub port: Option<u16>,

    /// Cloud TTS voice name
    pub tts_voice: Option<String>,

    /// Cloud TTS language code
    pub tts_language: Option<String>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Delay between ending and restarting a session on reconnect
    pub reconnect_delay_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `GuruConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> GuruConfigFile {
    config_file_path().map_or_else(GuruConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path, falling back to defaults
#[must_use]
pub fn load_from(path: &Path) -> GuruConfigFile {
    if !path.exists() {
        return GuruConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                GuruConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            GuruConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/pickleball-guru/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("pickleball-guru").join("config.toml"))
}
