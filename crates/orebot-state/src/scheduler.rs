//! Timer-driven persistence scheduler.
//!
//! On each tick the scheduler invokes a full save of the store and
//! reschedules itself; a failed save is logged and retried on the next
//! tick, since the previous primary and backups remain untouched. Saves
//! are synchronous and indivisible — the host model is single-threaded
//! and cooperative, so ticks simply run after the previous save
//! completes and no lock discipline is needed. Shutdown performs one
//! final flush before `run` returns; that flush is the only hard
//! ordering requirement at termination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::store::StateStore;

/// Recurring full-save driver for a [`StateStore`].
///
/// Cheaply cloneable; [`PersistenceScheduler::shutdown`] may be
/// signalled from any clone (typically a ctrl-c handler) while `run`
/// drives the tick loop.
#[derive(Clone)]
pub struct PersistenceScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    interval: Duration,
    shutdown: Notify,
    stopping: AtomicBool,
}

impl PersistenceScheduler {
    /// Create a scheduler that saves every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                interval,
                shutdown: Notify::new(),
                stopping: AtomicBool::new(false),
            }),
        }
    }

    /// Signal the run loop to flush once more and stop.
    pub fn shutdown(&self) {
        info!("persistence scheduler shutdown requested");
        self.inner.stopping.store(true, Ordering::Release);
        self.inner.shutdown.notify_waiters();
    }

    /// Drive periodic saves until shutdown, then flush one final time.
    pub async fn run(&self, store: &StateStore) {
        info!(
            interval_secs = self.inner.interval.as_secs(),
            "persistence scheduler started"
        );
        let mut ticker = tokio::time::interval(self.inner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // A tokio interval fires immediately; consume that first tick so
        // the loop waits a full period before its first save.
        ticker.tick().await;

        loop {
            if self.inner.stopping.load(Ordering::Acquire) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    match store.save() {
                        Ok(()) => debug!("scheduled save complete"),
                        Err(err) => warn!(error = %err, "scheduled save failed, retrying next tick"),
                    }
                }
                _ = self.inner.shutdown.notified() => break,
            }
        }

        match store.save() {
            Ok(()) => info!("final flush complete"),
            Err(err) => error!(error = %err, "final flush failed"),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
