//! Multi-namespace adaptive cache.
//!
//! Namespaces live in a [`DashMap`]; each namespace store sits behind its own
//! mutex so traffic on one request type never contends with another. Locks
//! are held only for bookkeeping. [`AdaptiveCache::get_or_compute`] releases
//! the lock before running the compute future.

use crate::entry::{CacheEntry, CacheStats};
use crate::key::cache_key;
use crate::namespace::NamespaceStore;
use cortex_core::{
    CacheHealth, CacheHealthStatus, CacheTuning, CortexConfig, CortexResult, NamespaceConfig,
    NamespaceStatus,
};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, info};

type SharedStore = Arc<Mutex<NamespaceStore>>;

/// Outcome of one [`AdaptiveCache::optimize`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationReport {
    /// Entries removed because their TTL elapsed.
    pub expired: usize,
    /// Entries removed by the low-utilization sweep.
    pub low_utilization_evictions: usize,
    /// Namespaces whose backing storage was compacted.
    pub compacted_namespaces: usize,
    /// Namespaces the low-utilization sweep trimmed.
    pub trimmed_namespaces: Vec<String>,
}

/// Cache keyed by namespace and canonical parameter hash.
#[derive(Debug)]
pub struct AdaptiveCache {
    namespaces: DashMap<String, SharedStore>,
    tuning: CacheTuning,
    unregistered_lookups: AtomicU64,
}

fn lock(store: &SharedStore) -> MutexGuard<'_, NamespaceStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AdaptiveCache {
    pub fn new(tuning: CacheTuning) -> Self {
        Self {
            namespaces: DashMap::new(),
            tuning,
            unregistered_lookups: AtomicU64::new(0),
        }
    }

    /// Build a cache with every namespace listed in `config`.
    pub fn from_config(config: &CortexConfig) -> Self {
        let cache = Self::new(config.cache_tuning);
        for (name, ns) in &config.namespaces {
            cache.register_namespace(name.clone(), *ns);
        }
        cache
    }

    pub fn tuning(&self) -> &CacheTuning {
        &self.tuning
    }

    /// Register a namespace, or reconfigure it if it already exists.
    ///
    /// Shrinking an existing namespace evicts least-recently-used entries
    /// down to the new capacity.
    pub fn register_namespace(&self, name: impl Into<String>, config: NamespaceConfig) {
        let name = name.into();
        if let Some(existing) = self.store(&name) {
            let evicted = lock(&existing).reconfigure(config);
            debug!(namespace = %name, evicted, "Reconfigured cache namespace");
            return;
        }
        self.namespaces
            .entry(name)
            .or_insert_with(|| Arc::new(Mutex::new(NamespaceStore::new(config))));
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    /// Registered namespace names, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    fn store(&self, namespace: &str) -> Option<SharedStore> {
        self.namespaces.get(namespace).map(|e| Arc::clone(e.value()))
    }

    fn with_store<R>(&self, namespace: &str, f: impl FnOnce(&mut NamespaceStore) -> R) -> Option<R> {
        let store = self.store(namespace)?;
        let mut guard = lock(&store);
        Some(f(&mut guard))
    }

    /// Look up `params` in `namespace`.
    pub fn get(&self, namespace: &str, params: &Value) -> Option<Value> {
        if !self.has_namespace(namespace) {
            self.unregistered_lookups.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let key = cache_key(params);
        self.with_store(namespace, |store| store.get(&key, Instant::now()))
            .flatten()
    }

    /// Store `value` for `params`. Returns `false` for an unregistered namespace.
    pub fn set(&self, namespace: &str, params: &Value, value: Value) -> bool {
        let key = cache_key(params);
        match self.with_store(namespace, |store| store.set(key, value, Instant::now())) {
            Some(Some(evicted)) => {
                debug!(namespace, key = %evicted, "Evicted least recently used entry");
                true
            }
            Some(None) => true,
            None => false,
        }
    }

    /// Delete every entry matching `predicate`; returns the number removed.
    pub fn invalidate<F>(&self, namespace: &str, predicate: F) -> usize
    where
        F: FnMut(&str, &CacheEntry) -> bool,
    {
        self.with_store(namespace, |store| store.invalidate(predicate))
            .unwrap_or(0)
    }

    /// Delete the entry cached for `params`, if any.
    pub fn invalidate_params(&self, namespace: &str, params: &Value) -> bool {
        let key = cache_key(params);
        self.invalidate(namespace, |k, _| k == key) > 0
    }

    pub fn clear(&self, namespace: &str) -> usize {
        self.with_store(namespace, NamespaceStore::clear)
            .unwrap_or(0)
    }

    pub fn reset_stats(&self, namespace: &str) {
        self.with_store(namespace, NamespaceStore::reset_stats);
    }

    pub fn stats(&self, namespace: &str) -> Option<CacheStats> {
        self.with_store(namespace, |store| store.stats())
    }

    /// Statistics for every namespace.
    pub fn all_stats(&self) -> BTreeMap<String, CacheStats> {
        self.snapshot_stores()
            .into_iter()
            .map(|(name, store)| {
                let stats = lock(&store).stats();
                (name, stats)
            })
            .collect()
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.with_store(namespace, |store| store.len()).unwrap_or(0)
    }

    /// Lookups against namespaces that were never registered.
    pub fn unregistered_lookups(&self) -> u64 {
        self.unregistered_lookups.load(Ordering::Relaxed)
    }

    fn snapshot_stores(&self) -> Vec<(String, SharedStore)> {
        let mut stores: Vec<(String, SharedStore)> = self
            .namespaces
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        stores.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        stores
    }

    /// Read-through lookup: return the cached value, or run `compute`, store
    /// its result and return it. Errors from `compute` are not cached.
    pub async fn get_or_compute<F, Fut>(
        &self,
        namespace: &str,
        params: &Value,
        compute: F,
    ) -> CortexResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CortexResult<Value>>,
    {
        if let Some(hit) = self.get(namespace, params) {
            return Ok(hit);
        }
        let value = compute().await?;
        self.set(namespace, params, value.clone());
        Ok(value)
    }

    /// Run one maintenance pass over every namespace.
    pub fn optimize(&self) -> OptimizationReport {
        let now = Instant::now();
        let mut report = OptimizationReport::default();
        let tuning = self.tuning;

        for (name, store) in self.snapshot_stores() {
            let mut guard = lock(&store);

            report.expired += guard.purge_expired(now);

            let stats = guard.stats();
            if stats.lookups() > 0
                && stats.hit_rate() < tuning.low_utilization_hit_rate
                && guard.len() > tuning.low_utilization_min_entries
            {
                let trimmed = guard.trim_least_frequent(tuning.low_utilization_evict_fraction);
                if trimmed > 0 {
                    debug!(namespace = %name, trimmed, hit_rate = stats.hit_rate(), "Trimmed low-utilization namespace");
                    report.low_utilization_evictions += trimmed;
                    report.trimmed_namespaces.push(name.clone());
                }
            }

            if guard.len() > tuning.compaction_threshold {
                guard.compact();
                report.compacted_namespaces += 1;
            }
        }

        info!(
            expired = report.expired,
            evicted = report.low_utilization_evictions,
            compacted = report.compacted_namespaces,
            "Cache optimization complete"
        );
        report
    }

    /// Per-namespace health and an overall verdict.
    pub fn health_check(&self) -> CacheHealth {
        let mut namespaces = BTreeMap::new();
        let mut issues = Vec::new();

        for (name, store) in self.snapshot_stores() {
            let health = lock(&store).health(&self.tuning);
            if health.status == NamespaceStatus::Poor {
                if health.utilization > self.tuning.high_utilization {
                    issues.push(format!(
                        "{name}: utilization {:.0}% above {:.0}%",
                        health.utilization * 100.0,
                        self.tuning.high_utilization * 100.0
                    ));
                } else {
                    issues.push(format!(
                        "{name}: hit rate {:.0}% below {:.0}%",
                        health.hit_rate * 100.0,
                        self.tuning.poor_hit_rate * 100.0
                    ));
                }
            }
            namespaces.insert(name, health);
        }

        let status = if issues.is_empty() {
            CacheHealthStatus::Healthy
        } else {
            CacheHealthStatus::Warning
        };

        CacheHealth {
            status,
            namespaces,
            issues,
        }
    }

    /// Drop every cached entry. Namespaces stay registered.
    pub fn shutdown(&self) {
        let mut cleared = 0;
        for (_, store) in self.snapshot_stores() {
            cleared += lock(&store).clear();
        }
        info!(cleared, "Cache shut down");
    }
}

impl Default for AdaptiveCache {
    fn default() -> Self {
        Self::from_config(&CortexConfig::default())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// A namespace never holds more entries than its capacity.
        #[test]
        fn prop_len_never_exceeds_capacity(
            max_size in 1usize..20,
            keys in proptest::collection::vec(0u32..100, 0..200),
        ) {
            let cache = AdaptiveCache::new(CacheTuning::default());
            cache.register_namespace("ns", NamespaceConfig::new(max_size, Duration::from_secs(60)));
            for k in keys {
                cache.set("ns", &json!({"k": k}), json!(k));
                prop_assert!(cache.len("ns") <= max_size);
            }
        }

        /// The most recently written key is always retrievable.
        #[test]
        fn prop_last_write_survives(
            max_size in 1usize..10,
            keys in proptest::collection::vec(0u32..50, 1..100),
        ) {
            let cache = AdaptiveCache::new(CacheTuning::default());
            cache.register_namespace("ns", NamespaceConfig::new(max_size, Duration::from_secs(60)));
            for k in &keys {
                cache.set("ns", &json!(k), json!(k));
            }
            let last = keys[keys.len() - 1];
            prop_assert_eq!(cache.get("ns", &json!(last)), Some(json!(last)));
        }
    }
}
