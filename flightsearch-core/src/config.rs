//! Coordinator configuration with sensible defaults.
//!
//! [`CoordinatorConfig`] controls how long a search may stay pending before
//! its deadline timer forces it into the timeout state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Default search deadline in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 45;

/// Configuration consumed by the search coordinator.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Global search deadline in seconds, armed when a search starts.
    pub timeout_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl CoordinatorConfig {
    /// The deadline as a [`Duration`].
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_deadline_is_45_seconds() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.timeout_seconds, 45);
        assert_eq!(config.deadline(), Duration::from_secs(45));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = CoordinatorConfig { timeout_seconds: 0 };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: CoordinatorConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config, CoordinatorConfig::default());
    }
}
