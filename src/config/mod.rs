pub mod error;

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use self::error::{ConfigError, Result};

pub const CONFIG_FILE_NAME: &str = "applyedit.toml";

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Log level: error, warn, info, debug, trace
    pub log_level: Option<String>,

    /// Write changed documents back to disk when the session ends
    #[serde(default)]
    pub write_back: bool,

    /// Language server to connect to
    pub server: ServerConfig,
}

/// How to start the language server
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Executable, either on PATH or absolute. May be `${VAR}`.
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// `languageId` sent in `didOpen`
    pub language_id: String,
}

impl Config {
    /// Load configuration from applyedit.toml, searching upward from `target_path`
    pub fn load(target_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = find_config_file(target_path.as_ref())?;
        debug!("Using config {}", config_path.display());

        let config_data = fs::read_to_string(&config_path).map_err(|source| {
            ConfigError::ReadFailed {
                path: config_path.display().to_string(),
                source,
            }
        })?;

        Self::from_toml(&config_data)
    }

    /// Parse, expand and validate a configuration document
    pub fn from_toml(data: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(data)?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that required fields are present
    fn validate(&self) -> Result<()> {
        if self.server.command.trim().is_empty() {
            return Err(ConfigError::MissingField("server.command".to_string()));
        }
        if self.server.language_id.trim().is_empty() {
            return Err(ConfigError::MissingField("server.language_id".to_string()));
        }
        Ok(())
    }

    /// Expand `${VAR}` in the server command line
    fn expand_env_vars(&mut self) -> Result<()> {
        self.server.command = expand_env_var(&self.server.command)?;
        for arg in &mut self.server.args {
            *arg = expand_env_var(arg)?;
        }
        Ok(())
    }
}

/// Find applyedit.toml by searching upward from the given path
fn find_config_file(start_path: &Path) -> Result<PathBuf> {
    let current_dir = if start_path.is_file() {
        start_path.parent().unwrap_or(Path::new("."))
    } else {
        start_path
    };

    let mut current_dir = current_dir.canonicalize()?;

    loop {
        let config_path = current_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Ok(config_path);
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => break, // Reached root
        }
    }

    Err(ConfigError::NotFound(start_path.display().to_string()))
}

/// Expand a value of the form `${VAR_NAME}`; other values are returned as is
fn expand_env_var(value: &str) -> Result<String> {
    match value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(var_name) => {
            env::var(var_name).map_err(|_| ConfigError::UnsetVariable(var_name.to_string()))
        }
        None => Ok(value.to_string()),
    }
}
