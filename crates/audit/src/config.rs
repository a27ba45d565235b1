//! Emission and retention configuration
//!
//! Loaded as part of the engine configuration file; every field has a serde
//! default so partial files are valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AuditError, AuditResult};

/// Configuration for one Emission Worker run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionConfig {
    /// Maximum events drained per run
    #[serde(default = "default_emission_batch_limit")]
    pub batch_limit: u32,

    /// Maximum concurrent pushes to the sink
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for a single push (timeout counts as a failed attempt)
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,

    /// Failure count at which an unemitted event is reported as stuck
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u32,
}

/// Configuration for the Retention Sweeper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Events older than this many days are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Maximum rows deleted per statement
    #[serde(default = "default_retention_batch_limit")]
    pub batch_limit: u32,
}

fn default_emission_batch_limit() -> u32 {
    100
}

fn default_concurrency() -> usize {
    4
}

fn default_push_timeout_ms() -> u64 {
    5_000
}

fn default_alert_threshold() -> u32 {
    5
}

fn default_retention_days() -> u32 {
    2_555 // ~7 years
}

fn default_retention_batch_limit() -> u32 {
    1_000
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_emission_batch_limit(),
            concurrency: default_concurrency(),
            push_timeout_ms: default_push_timeout_ms(),
            alert_threshold: default_alert_threshold(),
        }
    }
}

impl EmissionConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn validate(&self) -> AuditResult<()> {
        if self.batch_limit == 0 {
            return Err(AuditError::Config("emission batch_limit must be positive".into()));
        }
        if self.concurrency == 0 {
            return Err(AuditError::Config("emission concurrency must be positive".into()));
        }
        Ok(())
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            batch_limit: default_retention_batch_limit(),
        }
    }
}

impl RetentionConfig {
    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn validate(&self) -> AuditResult<()> {
        if self.batch_limit == 0 {
            return Err(AuditError::Config("retention batch_limit must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let emission = EmissionConfig::default();
        assert_eq!(emission.batch_limit, 100);
        assert_eq!(emission.concurrency, 4);
        assert_eq!(emission.push_timeout(), Duration::from_secs(5));
        assert_eq!(emission.alert_threshold, 5);

        let retention = RetentionConfig::default();
        assert_eq!(retention.retention_window(), chrono::Duration::days(2_555));
        assert_eq!(retention.batch_limit, 1_000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let emission: EmissionConfig = serde_json::from_str(r#"{ "concurrency": 8 }"#).unwrap();
        assert_eq!(emission.concurrency, 8);
        assert_eq!(emission.batch_limit, 100);

        let retention: RetentionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(retention, RetentionConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let emission = EmissionConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(emission.validate().is_err());

        let retention = RetentionConfig {
            batch_limit: 0,
            ..Default::default()
        };
        assert!(retention.validate().is_err());
    }
}
