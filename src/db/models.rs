//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of probing one endpoint, retries included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The probed URL.
    pub endpoint: String,
    /// HTTP status code, or 0 when the endpoint could not be reached
    #[serde(rename = "status")]
    pub status_code: u16,
    /// Elapsed milliseconds, or -1 when the endpoint could not be reached
    #[serde(rename = "responseTime")]
    pub response_time_ms: i64,
}

impl ProbeResult {
    pub const UNREACHABLE_STATUS: u16 = 0;
    pub const UNREACHABLE_TIME: i64 = -1;

    /// Sentinel result for an endpoint whose attempts all failed in transport.
    pub fn unreachable(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            status_code: Self::UNREACHABLE_STATUS,
            response_time_ms: Self::UNREACHABLE_TIME,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.status_code == Self::UNREACHABLE_STATUS
    }

    /// True for any 2xx status.
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Verdict produced by the log inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCheckResult {
    pub success: bool,
    pub found_entries: u64,
    pub error: Option<String>,
}

impl LogCheckResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            found_entries: 0,
            error: Some(error.into()),
        }
    }
}

/// A snapshot that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub timestamp: DateTime<Utc>,
    pub ping_results: Vec<ProbeResult>,
    pub log_check: LogCheckResult,
}

/// One recorded monitoring cycle, as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub ping_results: Vec<ProbeResult>,
    pub log_check: LogCheckResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_result_wire_names() {
        let result = ProbeResult {
            endpoint: "https://example.com".to_string(),
            status_code: 204,
            response_time_ms: 12,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], 204);
        assert_eq!(json["responseTime"], 12);
        assert_eq!(json["endpoint"], "https://example.com");
    }

    #[test]
    fn test_log_check_null_error() {
        let check = LogCheckResult {
            success: true,
            found_entries: 4,
            error: None,
        };
        let json = serde_json::to_string(&check).unwrap();
        assert_eq!(json, r#"{"success":true,"foundEntries":4,"error":null}"#);
    }

    #[test]
    fn test_success_range() {
        let mut result = ProbeResult::unreachable("http://x");
        assert!(result.is_unreachable());
        assert!(!result.is_successful());

        for (code, ok) in [(199, false), (200, true), (299, true), (300, false), (503, false)] {
            result.status_code = code;
            assert_eq!(result.is_successful(), ok, "status {}", code);
        }
    }
}
