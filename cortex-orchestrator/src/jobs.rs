//! Periodic Background Tasks
//!
//! The health controller runs two recurring jobs once the system is up:
//!
//! - a health check every `health_check_interval`
//! - a system optimization pass every `optimization_interval`
//!
//! Each job runs on its own task until the shutdown signal is received. A
//! task holds only a weak reference to its owner, so dropping the owner also
//! ends the task. Cycles that fall due while the owner is shutting down are
//! skipped.

use async_trait::async_trait;
use cortex_core::CortexResult;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// JOBS
// ============================================================================

/// A recurring job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    HealthCheck,
    Optimization,
}

impl Job {
    pub fn as_str(&self) -> &'static str {
        match self {
            Job::HealthCheck => "health_check",
            Job::Optimization => "optimization",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the work a periodic task performs.
#[async_trait]
pub trait PeriodicWork: Send + Sync + 'static {
    /// Run one cycle of `job`.
    async fn run_cycle(&self, job: Job) -> CortexResult<()>;

    /// Cycles are skipped while this returns true.
    fn is_shutting_down(&self) -> bool;
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for periodic task activity.
#[derive(Debug, Default)]
pub struct PeriodicTaskMetrics {
    /// Health check cycles run since startup
    pub health_cycles: AtomicU64,

    /// Optimization cycles run since startup
    pub optimization_cycles: AtomicU64,

    /// Cycles skipped because shutdown was in progress
    pub skipped_cycles: AtomicU64,

    /// Cycles that returned an error
    pub errors: AtomicU64,
}

impl PeriodicTaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_cycle(&self, job: Job) {
        let counter = match job {
            Job::HealthCheck => &self.health_cycles,
            Job::Optimization => &self.optimization_cycles,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PeriodicTaskSnapshot {
        PeriodicTaskSnapshot {
            health_cycles: self.health_cycles.load(Ordering::Relaxed),
            optimization_cycles: self.optimization_cycles.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of periodic task metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodicTaskSnapshot {
    pub health_cycles: u64,
    pub optimization_cycles: u64,
    pub skipped_cycles: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Spawn a task that runs `job` on `owner` every `period`.
///
/// The first cycle runs one full period after spawning. The task exits when
/// `shutdown_rx` holds or observes `true`, when its sender is dropped, or when
/// `owner` has been dropped.
pub fn spawn_periodic<W: PeriodicWork>(
    job: Job,
    owner: Weak<W>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<PeriodicTaskMetrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // A receiver subscribed after the signal never sees `changed()`
        if *shutdown_rx.borrow_and_update() {
            tracing::debug!(job = %job, "Shutdown already signalled, periodic task not started");
            return;
        }

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::info!(job = %job, period_ms = period.as_millis() as u64, "Periodic task started");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let Some(owner) = owner.upgrade() else {
                        break;
                    };
                    if owner.is_shutting_down() {
                        metrics.skipped_cycles.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(job = %job, "Skipping cycle during shutdown");
                        continue;
                    }

                    metrics.record_cycle(job);
                    if let Err(e) = owner.run_cycle(job).await {
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(job = %job, error = %e, "Periodic cycle failed");
                    }
                }
            }
        }

        tracing::info!(job = %job, "Periodic task stopped");
    })
}
