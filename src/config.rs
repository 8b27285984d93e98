//! Controller configuration.

use crate::run_state::RunState;
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Tunables for a [`Controller`](crate::Controller).
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct EngineConfig {
    /// Run state the controller is created in.
    ///
    /// `pausing_preserve_next_move` buffers a move submitted before the first
    /// `run`, `pausing_ignore_next_move` drops it.
    #[serde(default = "default_initial_state")]
    initial_state: RunState,

    /// How long `stop` and `update_agents` wait for agents to acknowledge.
    #[serde(default = "default_stop_timeout_ms")]
    stop_timeout_ms: u64,

    /// Logs the full snapshot after every applied move.
    #[serde(default)]
    debug_mode: bool,
}

#[instrument]
fn default_initial_state() -> RunState {
    RunState::PausingPreserveNextMove
}

#[instrument]
fn default_stop_timeout_ms() -> u64 {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_state: default_initial_state(),
            stop_timeout_ms: default_stop_timeout_ms(),
            debug_mode: false,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[instrument]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on waiting for stop acknowledgements.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML or names a
    /// starting state other than one of the two pausing states.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        if !config.initial_state.is_valid_start() {
            return Err(ConfigError::new(format!(
                "initial_state must be a pausing state, got {}",
                config.initial_state
            )));
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_toml(&content)?;
        info!(initial_state = %config.initial_state, stop_timeout_ms = config.stop_timeout_ms, "Config loaded successfully");
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but is invalid.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            info!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
