//! Agent configuration parsing and management.
//!
//! This module handles parsing of the agent configuration file (TOML) that
//! defines where the checkpoint lives, how long the startup load may take,
//! what to do when the load fails, and the operator's requested state for
//! each gated capability.
//!
//! Capability flags are tri-state (see [`tristate`]): an absent key means
//! "operator said nothing", which the compatibility evaluator treats
//! differently from an explicit disable.

pub mod tristate;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use tristate::{DefaultPolarity, FlagContractError, RequestedState, TriStateFlag};

/// Default checkpoint file name inside `data_dir`.
const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Directory holding the agent's persistent state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Checkpoint file path. Defaults to `checkpoint.json` under `data_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_file: Option<PathBuf>,

    /// Upper bound on the blocking checkpoint load at startup. Bootstrap
    /// fails rather than hang if the load does not complete within this.
    #[serde(default = "default_startup_load_timeout")]
    #[serde(with = "humantime_serde")]
    pub startup_load_timeout: Duration,

    /// Policy when the checkpoint load fails (I/O error or corrupt file).
    /// A missing checkpoint is a fresh host, not a load failure.
    #[serde(default)]
    pub on_load_failure: LoadFailurePolicy,

    /// Whether to checkpoint task state to disk. Default-false polarity.
    #[serde(default, skip_serializing_if = "RequestedState::is_not_set")]
    pub checkpoint: RequestedState,

    /// Whether tasks run with per-task resource limits. Default-true
    /// polarity, gated at startup on the compatibility of checkpointed
    /// tasks that predate the capability.
    #[serde(default, skip_serializing_if = "RequestedState::is_not_set")]
    pub task_resource_limits: RequestedState,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            checkpoint_file: None,
            startup_load_timeout: default_startup_load_timeout(),
            on_load_failure: LoadFailurePolicy::default(),
            checkpoint: RequestedState::NotSet,
            task_resource_limits: RequestedState::NotSet,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or `startup_load_timeout`
    /// is zero.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.startup_load_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "startup_load_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved checkpoint file path.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(CHECKPOINT_FILE_NAME))
    }

    /// The checkpoint flag with its declared default-false polarity.
    #[must_use]
    pub const fn checkpoint_flag(&self) -> TriStateFlag {
        TriStateFlag::default_false(self.checkpoint)
    }

    /// The task resource limits flag with its declared default-true polarity.
    #[must_use]
    pub const fn task_resource_limits_flag(&self) -> TriStateFlag {
        TriStateFlag::default_true(self.task_resource_limits)
    }
}

/// Policy applied when the checkpoint load fails at startup.
///
/// This is the single explicit decision point for "corrupt checkpoint vs.
/// start clean"; bootstrap never falls through to either behavior by
/// default-of-omission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoadFailurePolicy {
    /// Abort startup with the load error.
    #[default]
    Fail,
    /// Log the failure and proceed with an empty snapshot.
    StartClean,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/taskhost")
}

const fn default_startup_load_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
