//! Harness configuration, loaded from a JSON file.
//!
//! Every key is optional; missing keys take their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ErrorKind, Target};
use crate::task::{PolicyError, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid retry policy: {0}")]
    Retry(#[from] PolicyError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Executor worker count.
    pub concurrency: usize,

    /// Executor queue slots.
    pub queue_capacity: usize,

    /// Groups built from one batch.
    pub iterations: usize,

    pub report_interval_secs: u64,

    /// Pause between group submissions; 0 submits back to back.
    pub submit_interval_ms: u64,

    pub retry: RetryConfig,

    pub targets: Vec<Target>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            queue_capacity: 64,
            iterations: 1,
            report_interval_secs: 10,
            submit_interval_ms: 0,
            retry: RetryConfig::default(),
            targets: Vec::new(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn submit_interval(&self) -> Duration {
        Duration::from_millis(self.submit_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_factor: f64,
    pub retry_on: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
            backoff_factor: 2.0,
            retry_on: vec![ErrorKind::Transient, ErrorKind::Transport],
        }
    }
}

impl RetryConfig {
    /// Convert into a validated policy.
    pub fn into_policy(self) -> Result<RetryPolicy, PolicyError> {
        let policy = RetryPolicy {
            max_attempts: self.attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_factor: self.backoff_factor,
            retry_on: self.retry_on,
        };
        policy.validate()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = HarnessConfig::from_json_str("{}").unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.report_interval(), Duration::from_secs(10));
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = HarnessConfig::from_json_str(
            r#"{
                "concurrency": 4,
                "retry": { "attempts": 5, "retry_on": ["transient"] },
                "targets": [{ "name": "peer0", "url": "grpcs://peer0:7051" }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.iterations, 1);
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
        assert_eq!(config.retry.retry_on, vec![ErrorKind::Transient]);
        assert_eq!(config.targets, vec![Target::new("peer0", "grpcs://peer0:7051")]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = HarnessConfig::from_json_str(r#"{ "concurency": 4 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = HarnessConfig::from_file("/nonexistent/fabload.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn retry_config_converts_into_policy() {
        let policy = RetryConfig::default().into_policy().unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn invalid_retry_config_is_rejected() {
        let config = RetryConfig {
            max_backoff_ms: 10,
            ..RetryConfig::default()
        };
        assert!(matches!(
            config.into_policy(),
            Err(PolicyError::MaxBelowInitial { .. })
        ));
    }
}
