//! One monitoring cycle: probe every endpoint, inspect the log, persist a snapshot.

use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::ConfigHandle;
use crate::db::{NewSnapshot, SnapshotStore};
use crate::logcheck::LogInspector;
use crate::probe::{probe_all, HttpTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Idle,
    Running,
}

/// What a call to [`MonitoringCycle::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A snapshot was stored under this id.
    Completed(i64),
    /// Another cycle was running; nothing was done.
    Skipped,
    /// Probes and log check ran but the snapshot could not be stored.
    PersistFailed,
}

/// Runs monitoring cycles, never more than one at a time.
pub struct MonitoringCycle {
    config: ConfigHandle,
    transport: Arc<dyn HttpTransport>,
    inspector: Arc<dyn LogInspector>,
    store: Arc<dyn SnapshotStore>,
    state: Mutex<CycleState>,
}

/// Holds the Running state; dropping it returns the cycle to Idle.
struct RunningGuard<'a> {
    state: &'a Mutex<CycleState>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = CycleState::Idle;
    }
}

impl MonitoringCycle {
    pub fn new(
        config: ConfigHandle,
        transport: Arc<dyn HttpTransport>,
        inspector: Arc<dyn LogInspector>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config,
            transport,
            inspector,
            store,
            state: Mutex::new(CycleState::Idle),
        }
    }

    /// Idle -> Running, or `None` if a cycle is already running.
    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            CycleState::Running => None,
            CycleState::Idle => {
                *state = CycleState::Running;
                Some(RunningGuard { state: &self.state })
            }
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) == CycleState::Running
    }

    /// Run one cycle unless one is already in progress.
    ///
    /// Overlapping calls are dropped, not queued. Failures are logged and
    /// reported in the outcome; the cycle always ends Idle.
    pub async fn run(&self) -> CycleOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::warn!("Previous monitoring cycle still running, skipping this execution");
            return CycleOutcome::Skipped;
        };

        tracing::info!("Starting monitoring cycle");

        // Configuration is fixed for the duration of one cycle.
        let config = self.config.current();

        let (ping_results, log_check) = tokio::join!(
            probe_all(self.transport.as_ref(), &config.endpoints),
            self.inspector.check(&config.log_file_path, &config.log_pattern),
        );

        let snapshot = NewSnapshot {
            timestamp: Utc::now(),
            ping_results,
            log_check,
        };

        match self.store.append_snapshot(&snapshot) {
            Ok(id) => {
                tracing::info!("Monitoring cycle completed, snapshot {} stored", id);
                CycleOutcome::Completed(id)
            }
            Err(e) => {
                tracing::error!("Monitoring cycle failed to store snapshot: {}", e);
                CycleOutcome::PersistFailed
            }
        }
    }
}
