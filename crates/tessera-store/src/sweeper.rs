//! Expiry sweeper for stateful stores.
//!
//! Runs on its own tokio task and removes expired entries at a fixed
//! interval: rows of the persistent token table, or idle sessions of a
//! [`SessionRegistry`]. The sweeper is owned by the store that started it:
//! dropping the store, or calling [`ExpirySweeper::shutdown`], stops the task.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for the JoinHandle because the lock is only
//! taken to store or take the handle and is never held across `.await`.
//! The SQLite DELETE runs on the blocking pool, not on the sweeper task.

use crate::database::{blocking, TokenTable};
use crate::session::SessionRegistry;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{Result, TesseraError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Background task deleting expired entries
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Start sweeping `table` every `interval` on the current tokio runtime
    pub fn spawn(table: Arc<TokenTable>, interval: Duration) -> Result<Self> {
        Self::spawn_with("tokens", interval, move || {
            blocking(table.clone(), TokenTable::delete_expired)
        })
    }

    /// Start purging idle sessions of `registry` every `interval`
    pub fn spawn_for_sessions(registry: SessionRegistry, interval: Duration) -> Result<Self> {
        Self::spawn_with("sessions", interval, move || {
            let registry = registry.clone();
            async move { Ok(registry.purge_expired().await) }
        })
    }

    fn spawn_with<F, Fut>(kind: &'static str, interval: Duration, mut sweep: F) -> Result<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<usize>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TesseraError::config("the expiry sweeper needs a running tokio runtime"))?;
        if interval.is_zero() {
            return Err(TesseraError::config("sweep interval must be positive"));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => report(kind, sweep().await),
                }
            }
            tracing::debug!(kind, "expiry sweeper stopped");
        });

        tracing::debug!(kind, interval_ms = interval.as_millis() as u64, "expiry sweeper started");
        Ok(Self {
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
            interval,
        })
    }

    /// Sweep interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the task is still scheduled
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the task; idempotent
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn report(kind: &'static str, swept: Result<usize>) {
    match swept {
        Ok(0) => {}
        Ok(deleted) => tracing::info!(kind, deleted, "swept expired entries"),
        // The next tick retries; reads never rely on the sweep for validity.
        Err(err) => tracing::warn!(kind, error = %err, "expiry sweep failed"),
    }
}
