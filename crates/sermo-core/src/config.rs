use crate::error::ConfigError;
use crate::types::{SessionConfig, TranscriptionOptions};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub file: FileSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sample_rate: default_sample_rate(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Opaque credential passed as a bearer token. Usually supplied via
    /// `${SERMO_API_KEY}` interpolation; empty disables auth headers.
    #[serde(default)]
    pub api_key: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            api_base: default_api_base(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSection {
    #[serde(default = "default_language")]
    pub language_code: String,

    #[serde(default = "default_true")]
    pub punctuation: bool,

    #[serde(default = "default_true")]
    pub interim_results: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            language_code: default_language(),
            punctuation: true,
            interim_results: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileSection {
    #[serde(default = "default_sync_threshold_secs")]
    pub sync_threshold_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
}

impl Default for FileSection {
    fn default() -> Self {
        Self {
            sync_threshold_secs: default_sync_threshold_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_stream_url() -> String {
    "ws://127.0.0.1:8089/v1/stream".to_string()
}

fn default_api_base() -> String {
    "http://127.0.0.1:8089/v1".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sync_threshold_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_poll_max_attempts() -> u32 {
    240
}

/// Interpolate `${VAR}` patterns with environment variable values.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                errors.push(var_name.to_string());
            }
        }
    }

    if let Some(first_missing) = errors.into_iter().next() {
        return Err(ConfigError::EnvVarNotFound(first_missing));
    }

    Ok(result)
}

impl AppConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let interpolated = interpolate_env_vars(&content)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        tracing::debug!(
            path = %path.display(),
            backend = %config.backend.stream_url,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string (for testing).
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Streaming-session configuration derived from the `[general]` and
    /// `[session]` sections.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sample_rate: self.general.sample_rate,
            language_code: self.session.language_code.clone(),
            punctuation: self.session.punctuation,
            interim_results: self.session.interim_results,
        }
    }

    /// File-transcription policy derived from the `[session]` and `[file]`
    /// sections.
    pub fn transcription_options(&self) -> TranscriptionOptions {
        TranscriptionOptions {
            language_code: self.session.language_code.clone(),
            sync_threshold: Duration::from_secs(self.file.sync_threshold_secs),
            poll_interval: Duration::from_millis(self.file.poll_interval_ms),
            poll_max_attempts: self.file.poll_max_attempts,
        }
    }
}
