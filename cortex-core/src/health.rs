//! Health types
//!
//! Shared health records for engines, the cache and the system as a whole.
//! The health controller is the only writer of [`SystemHealth`]; everyone
//! else sees snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Lifecycle state of the whole orchestration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    NotInitialized,
    Initializing,
    Healthy,
    Degraded,
    Error,
    Shutdown,
}

impl SystemStatus {
    /// Whether `initialize()` has completed successfully.
    pub fn is_initialized(&self) -> bool {
        matches!(self, SystemStatus::Healthy | SystemStatus::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::NotInitialized => "not_initialized",
            SystemStatus::Initializing => "initializing",
            SystemStatus::Healthy => "healthy",
            SystemStatus::Degraded => "degraded",
            SystemStatus::Error => "error",
            SystemStatus::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational health of a single engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine is fully operational
    Healthy,
    /// Engine is operational but degraded
    Degraded,
    /// Engine is not operational
    Error,
}

/// Severity of a recorded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// One entry of the system error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
}

/// Bounded error log. Once full, the oldest entry is dropped for each new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    entries: VecDeque<ErrorRecord>,
    capacity: usize,
    /// Entries dropped because the log was full.
    dropped: u64,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: impl Into<String>, severity: Severity) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(ErrorRecord {
            timestamp: Utc::now(),
            message: message.into(),
            severity,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ErrorRecord> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Overall cache health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHealthStatus {
    Healthy,
    Warning,
}

/// Per-namespace verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceStatus {
    Good,
    Poor,
}

/// Health snapshot of one cache namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceHealth {
    pub size: usize,
    pub max_size: usize,
    /// `size / max_size`, 0.0 to 1.0
    pub utilization: f64,
    /// Lifetime hit rate, 0.0 to 1.0
    pub hit_rate: f64,
    pub status: NamespaceStatus,
}

/// Health snapshot of the whole cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHealth {
    pub status: CacheHealthStatus,
    pub namespaces: BTreeMap<String, NamespaceHealth>,
    pub issues: Vec<String>,
}

/// Aggregate health record owned by the health controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: SystemStatus,
    pub engines: BTreeMap<String, EngineStatus>,
    pub cache: Option<CacheHealth>,
    pub last_check: Option<DateTime<Utc>>,
    pub errors: ErrorLog,
}

impl SystemHealth {
    pub fn new(error_capacity: usize) -> Self {
        Self {
            status: SystemStatus::NotInitialized,
            engines: BTreeMap::new(),
            cache: None,
            last_check: None,
            errors: ErrorLog::new(error_capacity),
        }
    }

    /// Engines not currently reporting healthy.
    pub fn unhealthy_engines(&self) -> Vec<String> {
        self.engines
            .iter()
            .filter(|(_, status)| **status != EngineStatus::Healthy)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_log_rotates_oldest_out() {
        let mut log = ErrorLog::new(3);
        for i in 0..5 {
            log.push(format!("error {i}"), Severity::Warning);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.dropped(), 2);
        let messages: Vec<&str> = log.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["error 2", "error 3", "error 4"]);
        assert_eq!(log.latest().unwrap().message, "error 4");
    }

    #[test]
    fn test_error_log_zero_capacity_keeps_one() {
        let mut log = ErrorLog::new(0);
        log.push("a", Severity::Info);
        log.push("b", Severity::Info);
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().unwrap().message, "b");
    }

    #[test]
    fn test_system_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SystemStatus::NotInitialized).unwrap(),
            "\"not_initialized\""
        );
        assert!(SystemStatus::Degraded.is_initialized());
        assert!(!SystemStatus::Error.is_initialized());
    }

    #[test]
    fn test_unhealthy_engines() {
        let mut health = SystemHealth::new(10);
        health.engines.insert("nlp".to_string(), EngineStatus::Healthy);
        health.engines.insert("predictive".to_string(), EngineStatus::Error);
        assert_eq!(health.unhealthy_engines(), vec!["predictive".to_string()]);
    }
}
