//! Error types for Cortex operations

use std::time::Duration;
use thiserror::Error;

/// Request routing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Unknown request type: {request_type}")]
    UnknownRequestType { request_type: String },

    #[error("Request {request_type} timed out after {timeout:?}")]
    Timeout {
        request_type: String,
        timeout: Duration,
    },

    #[error("Orchestrator is shutting down, rejected {request_type}")]
    ShuttingDown { request_type: String },
}

/// Engine availability and execution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine {engine} unavailable: {reason}")]
    Unavailable { engine: String, reason: String },

    #[error("Engine {engine} failed during {operation}: {message}")]
    ExecutionFailed {
        engine: String,
        operation: String,
        message: String,
    },
}

/// Bootstrap and lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Engines not ready within {timeout:?}: {pending:?}")]
    InitializationTimeout {
        pending: Vec<String>,
        timeout: Duration,
    },

    #[error("Initialization failed: {reason}")]
    InitializationFailed { reason: String },

    #[error("Health check failed for {component}: {reason}")]
    HealthCheckFailure { component: String, reason: String },

    #[error("Telemetry setup failed: {reason}")]
    Telemetry { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all Cortex errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CortexError {
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CortexError {
    /// Shorthand for an engine execution failure.
    pub fn execution(
        engine: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CortexError::Engine(EngineError::ExecutionFailed {
            engine: engine.into(),
            operation: operation.into(),
            message: message.into(),
        })
    }

    /// Shorthand for an unavailable engine.
    pub fn unavailable(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        CortexError::Engine(EngineError::Unavailable {
            engine: engine.into(),
            reason: reason.into(),
        })
    }

    /// Whether a caller could reasonably retry the failed operation.
    ///
    /// Caller errors (unknown types, bad config) are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CortexError::Engine(_)
                | CortexError::Router(RouterError::Timeout { .. })
                | CortexError::Lifecycle(LifecycleError::InitializationTimeout { .. })
        )
    }
}

/// Result type alias for Cortex operations.
pub type CortexResult<T> = Result<T, CortexError>;

// =============================================================================
// TESTS
// =============================================================================
