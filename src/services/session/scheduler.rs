//! Periodic backup scheduler
//!
//! Runs a backup cycle every interval on a background task until stopped.
//! Each cycle runs on its own task, so a cycle that panics is logged and the
//! loop carries on at the same interval. Stopping is cooperative: it is
//! observed between cycles, never in the middle of one.

use super::cycle::BackupCycleEngine;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default time between backup cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(7);

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives [`BackupCycleEngine::run_cycle`] on a fixed interval
pub struct PeriodicScheduler {
    engine: Arc<BackupCycleEngine>,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl PeriodicScheduler {
    pub fn new(engine: Arc<BackupCycleEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Enable backups and start the loop
    ///
    /// A no-op if the loop is already running. Returns whether a loop is
    /// running afterwards; starting needs a tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return true;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime, backup scheduler not started");
            return false;
        };

        self.engine.set_enabled(true);

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = runtime.spawn(run_loop(self.engine.clone(), self.interval, stop_rx));
        *running = Some(RunningLoop { stop_tx, task });

        tracing::info!("Backup scheduler started ({:?} interval)", self.interval);
        true
    }

    /// Request the loop to stop
    ///
    /// A cycle already in progress is allowed to finish. Does not wait.
    pub fn stop(&self) {
        if let Some(running) = self.running().take() {
            let _ = running.stop_tx.send(true);
            tracing::info!("Backup scheduler stopping");
        }
    }

    /// Request the loop to stop and wait until it has exited
    pub async fn shutdown(&self) {
        let running = self.running().take();
        if let Some(running) = running {
            let _ = running.stop_tx.send(true);
            if let Err(e) = running.task.await {
                tracing::warn!("Backup scheduler exited abnormally: {}", e);
            }
            tracing::info!("Backup scheduler stopped");
        }
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    engine: Arc<BackupCycleEngine>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            // Also fires if the scheduler was dropped
            _ = stop_rx.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if *stop_rx.borrow() {
            break;
        }

        let engine = engine.clone();
        if let Err(e) = tokio::spawn(async move { engine.run_cycle().await }).await {
            tracing::error!("Backup cycle aborted: {}", e);
        }
    }
    tracing::debug!("Backup loop exited");
}
