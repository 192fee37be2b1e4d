pub mod validation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::DEFAULT_UPSTREAM_MODEL;
use crate::protocol::canonical::DEFAULT_CUTOFF_MARKER;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Output format of the stderr log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Text,
        }
    }
}

/// Translation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Upstream model used when a client model name has no alias.
    #[serde(default = "default_upstream_model")]
    pub default_model: String,
    /// Extra client-name -> upstream-id aliases, layered over the built-in table.
    #[serde(default)]
    pub model_aliases: BTreeMap<String, String>,
    /// Text marker that turns the stop reason into a max-tokens stop.
    #[serde(default = "default_cutoff_marker")]
    pub cutoff_marker: String,
    /// Append `data: [DONE]` to `OpenAI` chunk sequences.
    #[serde(default = "default_true")]
    pub emit_done_frame: bool,
}

fn default_upstream_model() -> String {
    DEFAULT_UPSTREAM_MODEL.to_string()
}
fn default_cutoff_marker() -> String {
    DEFAULT_CUTOFF_MARKER.to_string()
}
fn default_true() -> bool {
    true
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            default_model: default_upstream_model(),
            model_aliases: BTreeMap::new(),
            cutoff_marker: default_cutoff_marker(),
            emit_done_frame: true,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub translator: TranslatorConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
