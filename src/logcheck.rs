//! Log source inspection.

use async_trait::async_trait;
use regex::Regex;
use std::path::Path;

use crate::db::LogCheckResult;

/// Produces a pass/fail verdict for a log source.
///
/// Implementations report failures inside the result rather than erroring.
#[async_trait]
pub trait LogInspector: Send + Sync {
    async fn check(&self, path: &Path, pattern: &str) -> LogCheckResult;
}

/// Counts the lines of a log file that match a pattern.
///
/// The check passes when the file is readable and at least one line matches.
#[derive(Debug, Default, Clone)]
pub struct FileLogInspector;

impl FileLogInspector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LogInspector for FileLogInspector {
    async fn check(&self, path: &Path, pattern: &str) -> LogCheckResult {
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return LogCheckResult::failed(format!("invalid log pattern: {}", e)),
        };

        let data = match tokio::fs::read(path).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Failed to read log file {}: {}", path.display(), e);
                return LogCheckResult::failed(format!("failed to read {}: {}", path.display(), e));
            }
        };

        let text = String::from_utf8_lossy(&data);
        let found_entries = text.lines().filter(|line| regex.is_match(line)).count() as u64;

        tracing::debug!("Log check on {}: {} matching entries", path.display(), found_entries);

        if found_entries == 0 {
            return LogCheckResult::failed(format!("no log entries matching {}", pattern));
        }

        LogCheckResult {
            success: true,
            found_entries,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn log_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_counts_matching_lines() {
        let file = log_file("boot ok\nSTEADY state reached\nworker steady\nshutdown\n");
        let result = tokio_test::block_on(FileLogInspector::new().check(file.path(), "(?i)steady"));

        assert_eq!(
            result,
            LogCheckResult {
                success: true,
                found_entries: 2,
                error: None,
            }
        );
    }

    #[test]
    fn test_no_matches_fails() {
        let file = log_file("boot ok\nshutdown\n");
        let result = tokio_test::block_on(FileLogInspector::new().check(file.path(), "steady"));

        assert!(!result.success);
        assert_eq!(result.found_entries, 0);
        assert_eq!(result.error.as_deref(), Some("no log entries matching steady"));
    }

    #[tokio::test]
    async fn test_missing_file_fails_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileLogInspector::new()
            .check(&dir.path().join("missing.log"), "steady")
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("failed to read"));
    }

    #[tokio::test]
    async fn test_invalid_pattern_fails() {
        let file = log_file("steady\n");
        let result = FileLogInspector::new().check(file.path(), "(").await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("invalid log pattern"));
    }
}
