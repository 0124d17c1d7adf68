//! Cortex Core - Shared Types
//!
//! Types every other Cortex crate depends on: the error taxonomy,
//! configuration, request routing table, engine capability interface,
//! health records, the event bus, and the metrics recorder.

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod request;

pub use config::{BatchConfig, CacheTuning, CortexConfig, NamespaceConfig};
pub use engine::{Capability, Engine, EngineKind};
pub use error::{ConfigError, CortexError, CortexResult, EngineError, LifecycleError, RouterError};
pub use events::{EventBus, EventHandler, EventKind, SubscriptionId, SystemEvent};
pub use health::{
    CacheHealth, CacheHealthStatus, EngineStatus, ErrorLog, ErrorRecord, NamespaceHealth,
    NamespaceStatus, Severity, SystemHealth, SystemStatus,
};
pub use metrics::{MetricsRecorder, MetricsSnapshot, Timer, TimingStats};
pub use request::{BatchRequest, QueuedToken, RequestOptions, RequestOutcome, RequestType, Route};
