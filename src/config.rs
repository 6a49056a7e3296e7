//! Settings store: flat JSON configuration with validation and persistence.
//!
//! The configuration lives in a single flat JSON document
//! (`server_config.json` by default). Missing keys fall back to defaults;
//! unknown keys are preserved across a load/save cycle so that presentation
//! layers can stash their own settings in the same file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{AppError, Result};

fn default_port() -> u16 {
    3000
}

fn default_uploads_path() -> PathBuf {
    cwd().join("public").join("uploads")
}

fn default_data_path() -> PathBuf {
    cwd().join("data")
}

fn default_true() -> bool {
    true
}

fn default_server_command() -> String {
    "npm".into()
}

fn default_server_args() -> Vec<String> {
    vec!["start".into()]
}

fn cwd() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Persisted supervisor settings.
///
/// Serialized as a flat key-value JSON document. `extra` captures keys this
/// version does not know about so they survive a round-trip unchanged.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// TCP port the child server binds. Valid range is 1–65535.
    #[serde(default = "default_port")]
    pub server_port: u16,
    /// Directory for user uploads; created on demand.
    #[serde(default = "default_uploads_path")]
    pub uploads_path: PathBuf,
    /// Directory for application data; created on demand.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Start the server automatically when the supervisor boots.
    #[serde(default)]
    pub auto_start: bool,
    /// Presentation-layer hint: minimize to tray instead of exiting.
    #[serde(default = "default_true")]
    pub minimize_to_tray: bool,
    /// Open the default browser once the server has had time to bind.
    #[serde(default = "default_true")]
    pub auto_open_browser: bool,
    /// Executable used to launch the packaged server artifact.
    #[serde(default = "default_server_command")]
    pub server_command: String,
    /// Arguments passed to the server command.
    #[serde(default = "default_server_args")]
    pub server_args: Vec<String>,
    /// Unknown keys, preserved verbatim on save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: default_port(),
            uploads_path: default_uploads_path(),
            data_path: default_data_path(),
            auto_start: false,
            minimize_to_tray: true,
            auto_open_browser: true,
            server_command: default_server_command(),
            server_args: default_server_args(),
            extra: serde_json::Map::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path`, creating it with defaults on first run.
    ///
    /// A file that exists but fails to parse or validate yields the defaults
    /// with a logged warning; the broken file is left untouched so the user
    /// can repair it.
    #[must_use]
    pub fn load_or_create(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(raw) => match Self::from_json_str(&raw) {
                    Ok(config) => return config,
                    Err(err) => {
                        warn!(path = %path.display(), %err, "invalid config file, using defaults");
                    }
                },
                Err(err) => {
                    warn!(path = %path.display(), %err, "cannot read config file, using defaults");
                }
            }
            return Self::default();
        }

        let config = Self::default();
        if let Err(err) = config.save_to_path(path) {
            warn!(path = %path.display(), %err, "failed to write initial config");
        }
        config
    }

    /// Parse configuration from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration to `path` as pretty-printed JSON.
    ///
    /// Validation runs first: an invalid configuration is rejected and the
    /// file on disk is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if validation fails, or `AppError::Io` if
    /// the file cannot be written.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        let rendered = serde_json::to_string_pretty(self)
            .map_err(|err| AppError::Config(format!("failed to serialize config: {err}")))?;
        fs::write(path.as_ref(), rendered)
            .map_err(|err| AppError::Io(format!("failed to write config: {err}")))?;
        Ok(())
    }

    /// Update the server port, rejecting values outside [1, 65535].
    ///
    /// On rejection the prior value is retained.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `port` is out of range.
    pub fn set_port(&mut self, port: u32) -> Result<()> {
        let port = validate_port(port)?;
        self.server_port = port;
        Ok(())
    }

    /// Create the uploads and data directories if absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if either directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.uploads_path, &self.data_path] {
            fs::create_dir_all(dir).map_err(|err| {
                AppError::Config(format!("cannot create directory {}: {err}", dir.display()))
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_port(u32::from(self.server_port))?;
        if self.server_command.trim().is_empty() {
            return Err(AppError::Config("server_command must not be empty".into()));
        }
        Ok(())
    }
}

/// Check that `port` is a valid TCP port in [1, 65535].
///
/// # Errors
///
/// Returns `AppError::Config` for 0 or anything above 65535.
pub fn validate_port(port: u32) -> Result<u16> {
    match u16::try_from(port) {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(AppError::Config(format!(
            "server_port must be between 1 and 65535, got {port}"
        ))),
    }
}
