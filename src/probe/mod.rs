//! Probe module for endpoint monitoring.
//!
//! A probe is an HTTP GET against one endpoint, retried on transport
//! failure. Status codes never trigger a retry; they are recorded as-is.

mod endpoint;
mod http;

pub use endpoint::*;
pub use http::*;

use std::time::Duration;
use thiserror::Error;

/// Per-attempt request timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Total attempts per probe, first try included.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff unit; the wait after attempt `n` is `n * BACKOFF_STEP`.
pub const BACKOFF_STEP: Duration = Duration::from_millis(1000);

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}
