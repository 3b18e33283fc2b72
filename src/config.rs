//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Configurable timeout values (seconds) for session attempts and decisions.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Overall budget for one CLI attempt, excluding time spent awaiting a decision.
    #[serde(default = "default_session_seconds")]
    pub session_seconds: u64,
    /// Deadline for an operator to answer an authorization or clarification request.
    #[serde(default = "default_decision_seconds")]
    pub decision_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            session_seconds: default_session_seconds(),
            decision_seconds: default_decision_seconds(),
        }
    }
}

/// Upper bound for either timeout: one year.
pub const MAX_TIMEOUT_SECONDS: u64 = 86_400 * 365;

fn default_session_seconds() -> u64 {
    600
}

fn default_decision_seconds() -> u64 {
    300
}

/// Progress reporting configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StatusConfig {
    /// Minimum wall-clock gap between two status updates.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Number of trailing characters of streamed text included in a status update.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_interval_ms() -> u64 {
    1500
}

fn default_preview_chars() -> usize {
    800
}

fn default_db_path() -> PathBuf {
    PathBuf::from("agent-switchboard.db")
}

fn default_host_cli() -> String {
    "claude".into()
}

fn default_max_output_length() -> usize {
    4000
}

fn default_event_buffer() -> usize {
    64
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` file holding channel bindings.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Assistant CLI binary (e.g., `claude`).
    #[serde(default = "default_host_cli")]
    pub host_cli: String,
    /// Extra arguments passed to the CLI before the session flags.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Maximum characters per rendered output chunk.
    #[serde(default = "default_max_output_length")]
    pub max_output_length: usize,
    /// Capacity of the session event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Timeout configuration.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Status reporting configuration.
    #[serde(default)]
    pub status: StatusConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host_cli: default_host_cli(),
            host_cli_args: Vec::new(),
            max_output_length: default_max_output_length(),
            event_buffer: default_event_buffer(),
            timeouts: TimeoutConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-attempt time budget.
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.session_seconds)
    }

    /// Deadline for answering a decision request.
    #[must_use]
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.decision_seconds)
    }

    /// Minimum gap between status updates.
    #[must_use]
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status.interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.host_cli.trim().is_empty() {
            return Err(AppError::Config("host_cli must not be empty".into()));
        }

        if self.timeouts.session_seconds == 0 || self.timeouts.decision_seconds == 0 {
            return Err(AppError::Config(
                "timeouts must be greater than zero".into(),
            ));
        }

        if self.timeouts.session_seconds > MAX_TIMEOUT_SECONDS
            || self.timeouts.decision_seconds > MAX_TIMEOUT_SECONDS
        {
            return Err(AppError::Config(format!(
                "timeouts must not exceed {MAX_TIMEOUT_SECONDS} seconds"
            )));
        }

        if self.max_output_length == 0 {
            return Err(AppError::Config(
                "max_output_length must be greater than zero".into(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(AppError::Config(
                "event_buffer must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
