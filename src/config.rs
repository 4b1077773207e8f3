//! Configuration module for StatusWatch.
//!
//! Process settings come from environment variables; monitoring settings
//! come from a JSON file that can be updated while the service runs.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::Schedule;
use crate::web::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

pub const MIN_RETENTION_DAYS: u32 = 1;
pub const MAX_RETENTION_DAYS: u32 = 30;
pub const MIN_PORT: u16 = 1024;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid configuration: {}", .0.join(", "))]
    Invalid(Vec<String>),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Overrides the port from the monitor configuration file when set
    pub http_port: Option<u16>,
    /// Path to the SQLite database file (default: "statuswatch.db")
    pub db_path: String,
    /// Path to the monitor configuration file (default: "config.json")
    pub config_path: PathBuf,
    /// Requests allowed per client per window (default: 100)
    pub rate_limit_max: u32,
    /// Rate limit window length (default: 60s)
    pub rate_limit_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: None,
            db_path: "statuswatch.db".to_string(),
            config_path: PathBuf::from("config.json"),
            rate_limit_max: DEFAULT_MAX_REQUESTS,
            rate_limit_window: DEFAULT_WINDOW,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STATUSWATCH_HTTP_PORT`: HTTP port
    /// - `STATUSWATCH_DB_PATH`: Database file path
    /// - `STATUSWATCH_CONFIG_PATH`: Monitor configuration file path
    /// - `STATUSWATCH_RATE_LIMIT_MAX`: Requests per client per window
    /// - `STATUSWATCH_RATE_LIMIT_WINDOW_SECS`: Rate limit window in seconds
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("STATUSWATCH_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = Some(port);
            }
        }

        if let Ok(db_path) = env::var("STATUSWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(config_path) = env::var("STATUSWATCH_CONFIG_PATH") {
            cfg.config_path = PathBuf::from(config_path);
        }

        if let Ok(max) = env::var("STATUSWATCH_RATE_LIMIT_MAX") {
            if let Ok(max) = max.parse() {
                cfg.rate_limit_max = max;
            }
        }

        if let Ok(secs) = env::var("STATUSWATCH_RATE_LIMIT_WINDOW_SECS") {
            if let Ok(secs) = secs.parse() {
                cfg.rate_limit_window = Duration::from_secs(secs);
            }
        }

        cfg
    }
}

/// An endpoint to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub name: String,
}

impl EndpointConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            url: url.to_string(),
            name: name.to_string(),
        }
    }
}

/// Monitoring settings, read from a JSON file with camelCase keys.
///
/// Keys missing from the file keep their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Cron expression for the monitoring cadence
    pub ping_interval: String,
    pub endpoints: Vec<EndpointConfig>,
    pub log_file_path: PathBuf,
    /// Regex a log line must match to count as an entry
    pub log_pattern: String,
    pub data_retention_days: u32,
    pub port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_interval: "*/5 * * * * *".to_string(),
            endpoints: vec![
                EndpointConfig::new("Google", "https://google.com"),
                EndpointConfig::new("Example", "https://example.com"),
            ],
            log_file_path: PathBuf::from("/var/log/server.log"),
            log_pattern: "(?i)steady".to_string(),
            data_retention_days: 3,
            port: 3000,
        }
    }
}

impl MonitorConfig {
    /// Load the configuration file at `path`.
    ///
    /// A missing file is not an error: defaults are returned.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!(
                "Configuration file not found: {}, using default configuration",
                path.display()
            );
            return Ok(Self::default());
        }

        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        tracing::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Write the configuration to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, data).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every rule the configuration violates; empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = Schedule::parse(&self.ping_interval) {
            errors.push(format!("pingInterval must be a valid cron expression: {}", e));
        }

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.name.trim().is_empty() {
                errors.push(format!("endpoints[{}].name must not be empty", i));
            }
            match reqwest::Url::parse(&endpoint.url) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                _ => errors.push(format!("endpoints[{}].url must be an http(s) URL", i)),
            }
        }

        if let Err(e) = Regex::new(&self.log_pattern) {
            errors.push(format!("logPattern must be a valid regex: {}", e));
        }

        if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&self.data_retention_days) {
            errors.push(format!(
                "dataRetentionDays must be between {} and {}",
                MIN_RETENTION_DAYS, MAX_RETENTION_DAYS
            ));
        }

        if self.port < MIN_PORT {
            errors.push(format!("port must be between {} and 65535", MIN_PORT));
        }

        errors
    }

    /// A copy of this configuration with every field present in `update` replaced.
    pub fn merged(&self, update: ConfigUpdate) -> Self {
        let mut next = self.clone();
        if let Some(ping_interval) = update.ping_interval {
            next.ping_interval = ping_interval;
        }
        if let Some(endpoints) = update.endpoints {
            next.endpoints = endpoints;
        }
        if let Some(log_file_path) = update.log_file_path {
            next.log_file_path = log_file_path;
        }
        if let Some(log_pattern) = update.log_pattern {
            next.log_pattern = log_pattern;
        }
        if let Some(days) = update.data_retention_days {
            next.data_retention_days = days;
        }
        if let Some(port) = update.port {
            next.port = port;
        }
        next
    }
}

/// Partial configuration update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub ping_interval: Option<String>,
    pub endpoints: Option<Vec<EndpointConfig>>,
    pub log_file_path: Option<PathBuf>,
    pub log_pattern: Option<String>,
    pub data_retention_days: Option<u32>,
    pub port: Option<u16>,
}

/// Shared, live-updatable monitor configuration backed by its file.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<MonitorConfig>>,
    path: PathBuf,
}

impl ConfigHandle {
    pub fn new(config: MonitorConfig, path: PathBuf) -> Self {
        Self {
            current: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// A copy of the configuration as it is right now.
    pub fn current(&self) -> MonitorConfig {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate, persist and publish an update. Returns the new configuration.
    ///
    /// Nothing changes, on disk or in memory, when validation or the write fails.
    pub fn apply(&self, update: ConfigUpdate) -> Result<MonitorConfig, ConfigError> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = guard.merged(update);

        let errors = next.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        next.save(&self.path)?;
        *guard = next.clone();

        tracing::info!("Configuration updated successfully");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, None);
        assert_eq!(cfg.db_path, "statuswatch.db");
        assert_eq!(cfg.rate_limit_max, 100);

        let monitor = MonitorConfig::default();
        assert_eq!(monitor.data_retention_days, 3);
        assert_eq!(monitor.endpoints.len(), 2);
        assert!(monitor.validate().is_empty());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let cfg = MonitorConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg, MonitorConfig::default());
    }

    #[test]
    fn test_load_merges_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"pingInterval": "0 * * * * *", "endpoints": [{"url": "http://localhost:8080/health", "name": "Local"}]}"#,
        )
        .unwrap();

        let cfg = MonitorConfig::load(&path).unwrap();
        assert_eq!(cfg.ping_interval, "0 * * * * *");
        assert_eq!(cfg.endpoints, vec![EndpointConfig::new("Local", "http://localhost:8080/health")]);
        assert_eq!(cfg.data_retention_days, 3);
        assert_eq!(cfg.port, 3000);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(MonitorConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_collects_every_error() {
        let cfg = MonitorConfig {
            ping_interval: "every minute".to_string(),
            endpoints: vec![EndpointConfig::new("", "ftp://example.com")],
            log_pattern: "(".to_string(),
            data_retention_days: 31,
            port: 80,
            ..Default::default()
        };

        let errors = cfg.validate();
        assert_eq!(errors.len(), 6, "{:?}", errors);
        assert!(errors.iter().any(|e| e.starts_with("pingInterval")));
        assert!(errors.iter().any(|e| e.starts_with("endpoints[0].name")));
        assert!(errors.iter().any(|e| e.starts_with("endpoints[0].url")));
        assert!(errors.iter().any(|e| e.starts_with("logPattern")));
        assert!(errors.iter().any(|e| e.starts_with("dataRetentionDays")));
        assert!(errors.iter().any(|e| e.starts_with("port")));
    }

    #[test]
    fn test_apply_persists_and_publishes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let handle = ConfigHandle::new(MonitorConfig::default(), path.clone());

        let updated = handle
            .apply(ConfigUpdate {
                data_retention_days: Some(7),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(updated.data_retention_days, 7);
        assert_eq!(handle.current().data_retention_days, 7);
        assert_eq!(MonitorConfig::load(&path).unwrap().data_retention_days, 7);
    }

    #[test]
    fn test_apply_invalid_leaves_config_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let handle = ConfigHandle::new(MonitorConfig::default(), path.clone());

        let result = handle.apply(ConfigUpdate {
            data_retention_days: Some(0),
            ..Default::default()
        });

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert_eq!(handle.current(), MonitorConfig::default());
        assert!(!path.exists());
    }
}
