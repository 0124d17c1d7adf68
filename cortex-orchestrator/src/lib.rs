//! Cortex Orchestrator
//!
//! Routes typed CRM work requests to pluggable AI engines, serving repeated
//! work from the adaptive cache and grouping homogeneous work into batches.
//! A health controller brings the engines up, watches them on a fixed
//! cadence, and tears everything down again.
//!
//! # Example
//!
//! ```ignore
//! use cortex_orchestrator::{CortexSystem, EngineKind, RequestOptions};
//! use std::sync::Arc;
//!
//! let system = CortexSystem::builder()
//!     .config(cortex_core::CortexConfig::from_env())
//!     .engine(EngineKind::LeadScoring, Arc::new(my_scoring_engine))
//!     .build()?;
//!
//! system.initialize().await?;
//! let outcome = system
//!     .process_request("leadScoring", serde_json::json!({"leadId": 42}), RequestOptions::new())
//!     .await?;
//! system.shutdown().await;
//! ```

pub mod batch;
pub mod controller;
pub mod jobs;
pub mod registry;
pub mod router;
pub mod system;
pub mod telemetry;

pub use batch::{Batch, BatchAccumulator, BatchFlush, BatchProcessor, BatchStats, BatchTicket, FlushTrigger};
pub use controller::{HealthController, OptimizationSummary};
pub use jobs::{Job, PeriodicTaskMetrics, PeriodicTaskSnapshot, PeriodicWork};
pub use registry::{EngineRegistration, EngineRegistry, EngineUsage, EngineUsageSnapshot};
pub use router::{BatchItemError, BatchItemResult, BatchOptions, BatchReport, QueuedRequest, Router};
pub use system::{CortexSystem, CortexSystemBuilder, SystemMetrics};
pub use telemetry::{init_tracing, TelemetryConfig};

pub use cortex_core::{
    BatchRequest, Capability, CortexConfig, CortexError, CortexResult, Engine, EngineKind,
    EventKind, RequestOptions, RequestOutcome, RequestType, SystemEvent, SystemHealth,
    SystemStatus,
};
