//! Worker configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::parser::ParseLimits;
use crate::server::error::Error;

/// Worker configuration.
///
/// Every field has a default, so a configuration file only needs to name
/// the values it changes. Durations are written as seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Host name reported to applications as `SERVER_NAME`.
    pub server_name: String,
    /// Value of the `Server` response header.
    pub server_software: String,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The read buffer size.
    pub read_buffer_size: usize,
    /// Upper bound on reading one complete request, idle time included.
    #[serde(with = "seconds")]
    pub request_timeout: Duration,
    /// How long in-flight connections may run on after shutdown starts.
    #[serde(with = "seconds")]
    pub graceful_timeout: Duration,
    /// Period of the parent liveness check.
    #[serde(with = "seconds")]
    pub parent_check_interval: Duration,
    /// PID of the process that spawned this worker, if it should be watched.
    pub parent_pid: Option<u32>,
    /// Request size limits.
    pub limits: ParseLimits,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            server_software: concat!("microworker/", env!("CARGO_PKG_VERSION")).to_string(),
            max_connections: 1024,
            read_buffer_size: 8192,
            request_timeout: Duration::from_secs(30),
            graceful_timeout: Duration::from_secs(30),
            parent_check_interval: Duration::from_secs(1),
            parent_pid: None,
            limits: ParseLimits::default(),
        }
    }
}

impl WorkerConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: WorkerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".to_string()));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be at least 1".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request_timeout must be positive".to_string()));
        }
        if self.parent_check_interval.is_zero() {
            return Err(Error::Config("parent_check_interval must be positive".to_string()));
        }
        Ok(())
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = WorkerConfig::from_json(r#"{"server_name": "api.internal", "request_timeout": 2.5}"#).unwrap();
        assert_eq!(config.server_name, "api.internal");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.limits.max_headers, 100);
        assert!(config.parent_pid.is_none());
    }

    #[test]
    fn nested_limits() {
        let config = WorkerConfig::from_json(r#"{"limits": {"max_body_bytes": 1024}}"#).unwrap();
        assert_eq!(config.limits.max_body_bytes, 1024);
        assert_eq!(config.limits.max_line_bytes, 8190);
    }

    #[test]
    fn rejects_zero_connections() {
        let result = WorkerConfig::from_json(r#"{"max_connections": 0}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_negative_duration() {
        let result = WorkerConfig::from_json(r#"{"request_timeout": -1}"#);
        assert!(matches!(result, Err(Error::JsonError(_))));
    }
}
