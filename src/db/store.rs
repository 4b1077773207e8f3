//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Timestamp-ordered snapshot persistence.
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot and return its storage-assigned id.
    fn append_snapshot(&self, snapshot: &NewSnapshot) -> Result<i64, DbError>;

    /// The most recent snapshot, if any.
    fn latest_snapshot(&self) -> Result<Option<Snapshot>, DbError>;

    /// Up to `limit` snapshots, newest first, strictly older than `start_after` when given.
    ///
    /// A page shorter than `limit` means there is nothing further.
    fn snapshot_page(
        &self,
        limit: u32,
        start_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Snapshot>, DbError>;

    /// Delete every snapshot older than `cutoff`, returning how many went.
    fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError>;

    fn count_snapshots(&self) -> Result<i64, DbError>;
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }
}

/// A snapshot row before JSON columns are decoded.
struct SnapshotRow {
    id: i64,
    time: String,
    ping_results: String,
    log_check: String,
}

impl SnapshotRow {
    fn from_row(row: &rusqlite::Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get(0)?,
            time: row.get(1)?,
            ping_results: row.get(2)?,
            log_check: row.get(3)?,
        })
    }

    fn decode(self) -> Result<Snapshot, DbError> {
        let timestamp =
            parse_db_time(&self.time).ok_or_else(|| DbError::InvalidTimestamp(self.time.clone()))?;
        Ok(Snapshot {
            id: self.id,
            timestamp,
            ping_results: serde_json::from_str(&self.ping_results)?,
            log_check: serde_json::from_str(&self.log_check)?,
        })
    }
}

impl SnapshotStore for Store {
    fn append_snapshot(&self, snapshot: &NewSnapshot) -> Result<i64, DbError> {
        let ping_results = serde_json::to_string(&snapshot.ping_results)?;
        let log_check = serde_json::to_string(&snapshot.log_check)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO snapshots (time, ping_results, log_check) VALUES (?1, ?2, ?3)",
            params![format_db_time(snapshot.timestamp), ping_results, log_check],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn latest_snapshot(&self) -> Result<Option<Snapshot>, DbError> {
        Ok(self.snapshot_page(1, None)?.into_iter().next())
    }

    fn snapshot_page(
        &self,
        limit: u32,
        start_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Snapshot>, DbError> {
        let rows = {
            let conn = self.conn()?;
            match start_after {
                Some(cursor) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, time, ping_results, log_check FROM snapshots
                         WHERE time < ?1 ORDER BY time DESC, id DESC LIMIT ?2",
                    )?;
                    let rows = stmt
                        .query_map(params![format_db_time(cursor), limit], SnapshotRow::from_row)?
                        .collect::<SqlResult<Vec<_>>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, time, ping_results, log_check FROM snapshots
                         ORDER BY time DESC, id DESC LIMIT ?1",
                    )?;
                    let rows = stmt
                        .query_map(params![limit], SnapshotRow::from_row)?
                        .collect::<SqlResult<Vec<_>>>()?;
                    rows
                }
            }
        };

        rows.into_iter().map(SnapshotRow::decode).collect()
    }

    fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM snapshots WHERE time < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(deleted)
    }

    fn count_snapshots(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))?)
    }
}

/// Fixed-width UTC text, so lexical order in SQLite matches time order.
fn format_db_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
