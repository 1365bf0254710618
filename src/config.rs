//! Configuration management for ivycli.
//!
//! Configuration is a JSON object loaded from `--config`, `$IVYCLI_CONFIG_PATH`
//! or `~/.config/ivycli/config.json`, in that order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "IVYCLI_CONFIG_PATH";

/// Environment variable holding the completion endpoint API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the history encryption passphrase.
pub const PASSPHRASE_ENV: &str = "IVYCLI_PASSPHRASE";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Errors raised while locating, reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Missing(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure. Immutable for the run once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Model identifier sent with every request.
    pub model: String,
    /// System prompt; an empty string disables the system message.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Number of turn-pairs kept in the history file.
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    /// Render replies as markdown.
    #[serde(default = "default_true")]
    pub enable_markdown: bool,
    /// Optional `#RRGGBB` colour for reply text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_color: Option<String>,
    /// Chat-completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Config {
    /// Build a config for `model` with every optional field defaulted.
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: default_system_prompt(),
            max_history_size: default_max_history_size(),
            enable_markdown: true,
            response_color: None,
            api_url: default_api_url(),
        }
    }

    /// Get the per-user data directory.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("ivycli"))
            .ok_or_else(|| ConfigError::Missing("Could not determine config directory".to_string()))
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Get the encrypted history file path.
    pub fn history_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("history.enc"))
    }

    /// Load and validate configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`, creating the parent directory.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            create_private_dir(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Model must be specified in the config file.".to_string(),
            ));
        }
        if let Some(color) = &self.response_color {
            if crate::render::parse_hex_color(color).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "response_color must look like #RRGGBB, got {:?}",
                    color
                )));
            }
        }
        Ok(())
    }

    /// The system prompt to send, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        Some(self.system_prompt.as_str()).filter(|p| !p.is_empty())
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_history_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Where the config path came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Flag(PathBuf),
    Env(PathBuf),
    Default(PathBuf),
}

impl ConfigSource {
    /// Resolve the config path: flag, then environment, then the default.
    pub fn resolve(flag: Option<PathBuf>, env: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = flag {
            return Ok(ConfigSource::Flag(path));
        }
        if let Some(path) = env.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(ConfigSource::Env(path));
        }
        Ok(ConfigSource::Default(Config::default_config_path()?))
    }

    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Flag(p) | ConfigSource::Env(p) | ConfigSource::Default(p) => p,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }
}

/// Create a directory (and parents) readable only by the owner.
pub fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}
