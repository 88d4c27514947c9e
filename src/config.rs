//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Limits and tuning for background crunching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrunchingConfig {
    /// States a cruncher may buffer before it waits for a harvest.
    pub buffer_capacity: usize,
    /// Maximum number of simultaneously active jobs.
    pub max_active_jobs: usize,
    /// How often a cruncher blocked on a full buffer re-checks for retirement.
    pub send_poll_interval_ms: u64,
    /// Prefix for cruncher thread names.
    pub thread_name_prefix: String,
}

impl Default for CrunchingConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024,
            max_active_jobs: 64,
            send_poll_interval_ms: 50,
            thread_name_prefix: "forkline-cruncher".to_string(),
        }
    }
}

impl CrunchingConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.buffer_capacity == 0 {
            return Err(invalid("buffer_capacity", "must be > 0"));
        }
        if self.max_active_jobs == 0 {
            return Err(invalid("max_active_jobs", "must be > 0"));
        }
        if self.send_poll_interval_ms == 0 {
            return Err(invalid("send_poll_interval_ms", "must be > 0"));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(invalid("thread_name_prefix", "must not be empty"));
        }
        Ok(())
    }
}

/// Top-level project configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Background crunching settings.
    pub crunching: CrunchingConfig,
}

impl ProjectConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.crunching.validate()
    }

    /// Parse and validate a configuration from JSON. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            field: "<root>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
