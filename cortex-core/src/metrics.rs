//! Timer and metrics recorder
//!
//! Records named duration samples and counters and keeps running
//! aggregates. Everything else in the workspace reports through one
//! [`MetricsRecorder`] owned by the application context.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// A running timer. Stop it through the recorder that started it.
#[derive(Debug)]
#[must_use = "a timer records nothing until it is stopped"]
pub struct Timer {
    name: String,
    started_at: Instant,
}

impl Timer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Running aggregate for one named duration series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimingStats {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
    pub last: Duration,
}

impl TimingStats {
    fn record(&mut self, sample: Duration) {
        if self.count == 0 || sample < self.min {
            self.min = sample;
        }
        if sample > self.max {
            self.max = sample;
        }
        self.count += 1;
        self.total += sample;
        self.last = sample;
    }

    /// Mean of all samples, zero when empty.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
        }
    }
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub timings: BTreeMap<String, TimingStats>,
    pub counters: BTreeMap<String, u64>,
}

/// Records duration samples and counters.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    timings: Mutex<BTreeMap<String, TimingStats>>,
    counters: Mutex<BTreeMap<String, u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a named timer.
    pub fn start_timer(&self, name: impl Into<String>) -> Timer {
        Timer {
            name: name.into(),
            started_at: Instant::now(),
        }
    }

    /// Stop a timer, record its sample, and return the elapsed time.
    pub fn stop_timer(&self, timer: Timer) -> Duration {
        let elapsed = timer.started_at.elapsed();
        self.record_duration(timer.name, elapsed);
        elapsed
    }

    /// Record a duration sample directly.
    pub fn record_duration(&self, name: impl Into<String>, sample: Duration) {
        lock(&self.timings)
            .entry(name.into())
            .or_default()
            .record(sample);
    }

    pub fn increment(&self, name: impl Into<String>) {
        self.increment_by(name, 1);
    }

    pub fn increment_by(&self, name: impl Into<String>, delta: u64) {
        let mut counters = lock(&self.counters);
        let counter = counters.entry(name.into()).or_insert(0);
        *counter = counter.saturating_add(delta);
    }

    pub fn counter(&self, name: &str) -> u64 {
        lock(&self.counters).get(name).copied().unwrap_or(0)
    }

    pub fn timing(&self, name: &str) -> Option<TimingStats> {
        lock(&self.timings).get(name).cloned()
    }

    /// Running average for a timing series.
    pub fn average(&self, name: &str) -> Option<Duration> {
        self.timing(name).map(|t| t.average())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timings: lock(&self.timings).clone(),
            counters: lock(&self.counters).clone(),
        }
    }

    pub fn reset(&self) {
        lock(&self.timings).clear();
        lock(&self.counters).clear();
    }
}
