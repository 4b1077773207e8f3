//! Stubs shared by unit tests across modules.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::{ConfigHandle, EndpointConfig, MonitorConfig};
use crate::db::LogCheckResult;
use crate::logcheck::LogInspector;
use crate::probe::{HttpTransport, ProbeError};

/// Answers 200 to everything, optionally holding each request until a permit is released.
pub struct StubTransport {
    pub calls: AtomicU32,
    gate: Option<Arc<Semaphore>>,
}

impl StubTransport {
    pub fn open() -> Self {
        Self {
            calls: AtomicU32::new(0),
            gate: None,
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            gate: Some(gate),
        }
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn get(&self, _url: &str, _timeout: Duration) -> Result<u16, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| ProbeError::Network(e.to_string()))?;
        }
        Ok(200)
    }
}

pub struct StubInspector {
    pub success: bool,
}

#[async_trait]
impl LogInspector for StubInspector {
    async fn check(&self, _path: &Path, _pattern: &str) -> LogCheckResult {
        LogCheckResult {
            success: self.success,
            found_entries: u64::from(self.success),
            error: None,
        }
    }
}

/// A config handle probing `endpoints`, backed by a file nobody writes in these tests.
pub fn test_config(endpoints: &[&str]) -> ConfigHandle {
    let config = MonitorConfig {
        endpoints: endpoints
            .iter()
            .enumerate()
            .map(|(i, url)| EndpointConfig::new(&format!("endpoint-{}", i), url))
            .collect(),
        ..Default::default()
    };
    ConfigHandle::new(config, PathBuf::from("unused-config.json"))
}
