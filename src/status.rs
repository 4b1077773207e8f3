//! Overall health verdict, derived from a snapshot at read time.

use serde::Serialize;

use crate::db::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverallStatus {
    /// Every endpoint answered 2xx and the log check passed
    Up,
    /// Exactly one of the two sub-checks passed
    PartiallyUp,
    Down,
}

impl OverallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OverallStatus::Up => "up",
            OverallStatus::PartiallyUp => "partially up",
            OverallStatus::Down => "down",
        }
    }
}

/// Derive the overall status of a single snapshot.
///
/// An empty endpoint list counts as all pings successful.
pub fn aggregate(snapshot: &Snapshot) -> OverallStatus {
    let pings_ok = snapshot.ping_results.iter().all(|r| r.is_successful());
    let log_ok = snapshot.log_check.success;

    match (pings_ok, log_ok) {
        (true, true) => OverallStatus::Up,
        (false, false) => OverallStatus::Down,
        _ => OverallStatus::PartiallyUp,
    }
}
