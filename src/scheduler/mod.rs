//! Scheduler module for running monitoring and retention cycles.

mod cron;
mod cycle;
mod retention;

pub use cron::*;
pub use cycle::*;
pub use retention::*;

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// Owns the monitoring and retention triggers.
pub struct Scheduler {
    cycle: Arc<MonitoringCycle>,
    retention: Arc<RetentionCycle>,
    triggers: Mutex<TriggerState>,
}

#[derive(Default)]
struct TriggerState {
    /// Bumped by every start and stop, so a start that was overtaken
    /// while running its initial cycle does not arm stale triggers.
    generation: u64,
    stop: Option<broadcast::Sender<()>>,
}

impl TriggerState {
    fn cancel(&mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.generation += 1;
        self.generation
    }
}

impl Scheduler {
    pub fn new(cycle: MonitoringCycle, retention: RetentionCycle) -> Self {
        Self {
            cycle: Arc::new(cycle),
            retention: Arc::new(retention),
            triggers: Mutex::new(TriggerState::default()),
        }
    }

    /// Start (or restart) both triggers.
    ///
    /// Runs one monitoring cycle and one retention pass before arming the
    /// periodic triggers. Any previously armed triggers are cancelled first.
    pub async fn start(&self, cadence: &str, retention_days: u32) -> Result<(), CronError> {
        let schedule = Schedule::parse(cadence)?;

        let generation = self.lock_triggers().cancel();

        self.cycle.run().await;
        self.retention.run(retention_days);

        let mut triggers = self.lock_triggers();
        if triggers.generation != generation {
            tracing::info!("Scheduler: start superseded before triggers were armed");
            return Ok(());
        }

        let (stop_tx, _) = broadcast::channel(1);

        let cycle = self.cycle.clone();
        tokio::spawn(run_trigger(
            "monitoring",
            schedule.clone(),
            stop_tx.subscribe(),
            move || {
                let cycle = cycle.clone();
                tokio::spawn(async move {
                    cycle.run().await;
                });
            },
        ));

        let retention = self.retention.clone();
        tokio::spawn(run_trigger(
            "retention",
            Schedule::daily_at_midnight(),
            stop_tx.subscribe(),
            move || {
                let retention = retention.clone();
                tokio::spawn(async move {
                    retention.run(retention_days);
                });
            },
        ));

        triggers.stop = Some(stop_tx);

        tracing::info!("Scheduled monitoring cycle with cadence: {}", schedule);
        tracing::info!("Scheduled retention cycle daily at midnight UTC ({} days kept)", retention_days);
        Ok(())
    }

    /// Cancel both triggers. A cycle already in flight runs to completion.
    pub fn stop(&self) {
        self.lock_triggers().cancel();
        tracing::info!("Scheduler: Stopped monitoring and retention triggers");
    }

    fn lock_triggers(&self) -> std::sync::MutexGuard<'_, TriggerState> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Call `fire` at every instant `schedule` names until told to stop.
async fn run_trigger<F>(
    name: &'static str,
    schedule: Schedule,
    mut stop_rx: broadcast::Receiver<()>,
    mut fire: F,
) where
    F: FnMut() + Send + 'static,
{
    let mut last_fire: DateTime<Utc> = Utc::now();

    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(last_fire.max(now)) else {
            tracing::warn!("Scheduler: {} schedule '{}' never fires again", name, schedule);
            break;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(wait) => {
                last_fire = next;
                fire();
            }
        }
    }

    tracing::debug!("Scheduler: {} trigger exited", name);
}
