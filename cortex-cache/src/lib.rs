//! Cortex Cache - Adaptive Result Cache
//!
//! Multi-namespace cache for engine results. Each namespace has its own
//! capacity and time-to-live; entries are keyed by a SHA-256 hash of the
//! canonicalized request parameters and evicted least-recently-used first.
//! [`AdaptiveCache::optimize`] purges expired entries, trims namespaces with
//! poor hit rates, and compacts large ones.

mod adaptive;
mod entry;
mod key;
mod namespace;

pub use adaptive::{AdaptiveCache, OptimizationReport};
pub use entry::{CacheEntry, CacheStats};
pub use key::{cache_key, canonical_form};
