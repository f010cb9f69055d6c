use crate::workflow::errors::{FlowrunError, Result};
use std::env;

/// Engine-level defaults, overridable per workflow definition.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Fallback level timeout when a workflow does not set one, in seconds.
    pub default_level_timeout_seconds: u64,
    /// Worker-pool bound applied to each scheduler level.
    pub max_level_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_level_timeout_seconds: 300,
            max_level_workers: 8,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let default_level_timeout_seconds = env::var("FLOWRUN_LEVEL_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| {
                FlowrunError::Validation("Invalid FLOWRUN_LEVEL_TIMEOUT_SECONDS value".to_string())
            })?;

        let max_level_workers = env::var("FLOWRUN_MAX_LEVEL_WORKERS")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .map_err(|_| {
                FlowrunError::Validation("Invalid FLOWRUN_MAX_LEVEL_WORKERS value".to_string())
            })?;
        if max_level_workers == 0 {
            return Err(FlowrunError::Validation(
                "FLOWRUN_MAX_LEVEL_WORKERS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            default_level_timeout_seconds,
            max_level_workers,
        })
    }
}
