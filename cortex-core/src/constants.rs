//! Constants for Cortex
//!
//! Default values for every configuration setting. Centralizing them makes
//! them easy to find, modify, and test.

// ============================================================================
// CACHE
// ============================================================================

/// Default capacity of a cache namespace
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;

/// Default time-to-live of a cache entry (5 minutes)
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

/// Hit rate below which a large namespace is trimmed during optimization
pub const LOW_UTILIZATION_HIT_RATE: f64 = 0.20;

/// Minimum entries before the low-utilization trim applies
pub const LOW_UTILIZATION_MIN_ENTRIES: usize = 100;

/// Fraction of entries evicted by the low-utilization trim
pub const LOW_UTILIZATION_EVICT_FRACTION: f64 = 0.30;

/// Hit rate below which a namespace is reported as poor
pub const POOR_HIT_RATE: f64 = 0.30;

/// Utilization above which a namespace is reported as poor
pub const HIGH_UTILIZATION: f64 = 0.90;

/// Entry count above which a namespace's backing map is compacted
pub const COMPACTION_THRESHOLD: usize = 1000;

// ============================================================================
// BATCHING
// ============================================================================

/// Default number of items that triggers a batch flush
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default time after the first queued item before a batch is flushed
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;

/// Default chunk size for multi-request submissions
pub const DEFAULT_BATCH_CHUNK_SIZE: usize = 10;

/// Default concurrent requests per chunk
pub const DEFAULT_MAX_BATCH_CONCURRENCY: usize = 5;

/// Default delay between chunks of a multi-request submission
pub const DEFAULT_CHUNK_THROTTLE_MS: u64 = 100;

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Default per-request deadline (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default time allowed for all engines to become ready (10 seconds)
pub const DEFAULT_ENGINE_INIT_TIMEOUT_MS: u64 = 10_000;

/// Default deadline for a single engine health probe (5 seconds)
pub const DEFAULT_HEALTH_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Default interval between health checks (30 seconds)
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Default interval between optimization sweeps (5 minutes)
pub const DEFAULT_OPTIMIZATION_INTERVAL_SECS: u64 = 300;

/// Default capacity of the system error log
pub const DEFAULT_MAX_ERROR_LOG: usize = 100;
