//! Configuration loading, validation, and management for ragstream.
//!
//! Loads configuration from `~/.ragstream/config.toml` with environment
//! variable overrides. Validates all settings at startup. Nothing below the
//! binary reads the environment itself: the pipeline receives an explicit
//! configuration object built from [`AppConfig`].

use ragstream_core::ChatOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding [`AppConfig::endpoint`].
pub const ENV_ENDPOINT: &str = "RAGSTREAM_ENDPOINT";

/// Environment variable overriding [`AppConfig::default_model`].
pub const ENV_MODEL: &str = "RAGSTREAM_MODEL";

/// The root configuration structure.
///
/// Maps directly to `~/.ragstream/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the chat endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model used when a turn does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Models offered for selection
    #[serde(default)]
    pub models: Vec<String>,

    /// Base system prompt; retrieved context is appended to it
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Context window of the target model, in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Apply spelling normalization to streamed text
    #[serde(default = "default_true")]
    pub normalize_spelling: bool,

    /// Retrieval budget tuning
    #[serde(default)]
    pub budget: BudgetConfig,

    /// HTTP request settings
    #[serde(default)]
    pub request: RequestConfig,

    /// Sampling options forwarded with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,

    /// Where finished turns are stored
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_endpoint() -> String {
    "http://localhost:11434".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Answer using the reference material when it is relevant.".into()
}
fn default_context_window() -> usize {
    4096
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Share of the context window available to the prompt (0 < f <= 1)
    #[serde(default = "default_reserve_fraction")]
    pub reserve_fraction: f64,

    /// Expected size of one retrieved chunk, in tokens
    #[serde(default = "default_avg_tokens_per_chunk")]
    pub avg_tokens_per_chunk: usize,
}

fn default_reserve_fraction() -> f64 {
    0.7
}
fn default_avg_tokens_per_chunk() -> usize {
    500
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            reserve_fraction: default_reserve_fraction(),
            avg_tokens_per_chunk: default_avg_tokens_per_chunk(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Whole-request timeout, streaming included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}
fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSONL file per conversation
    #[serde(default = "default_turns_dir")]
    pub turns_dir: PathBuf,
}

fn default_turns_dir() -> PathBuf {
    AppConfig::config_dir().join("turns")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            turns_dir: default_turns_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ragstream/config.toml),
    /// then apply environment overrides:
    /// - `RAGSTREAM_ENDPOINT`
    /// - `RAGSTREAM_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.default_model = Some(model);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragstream")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction = self.budget.reserve_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::ValidationError(
                "budget.reserve_fraction must be in (0, 1]".into(),
            ));
        }

        if self.budget.avg_tokens_per_chunk == 0 {
            return Err(ConfigError::ValidationError(
                "budget.avg_tokens_per_chunk must be > 0".into(),
            ));
        }

        if self.context_window == 0 {
            return Err(ConfigError::ValidationError(
                "context_window must be > 0".into(),
            ));
        }

        if let Some(temperature) = self.options.as_ref().and_then(|o| o.temperature) {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::ValidationError(
                    "options.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_model: None,
            models: Vec::new(),
            system_prompt: default_system_prompt(),
            context_window: default_context_window(),
            normalize_spelling: true,
            budget: BudgetConfig::default(),
            request: RequestConfig::default(),
            options: None,
            storage: StorageConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
