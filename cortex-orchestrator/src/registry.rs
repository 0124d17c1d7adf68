//! Engine registry
//!
//! Binds each [`EngineKind`] to one engine instance. The capability set is
//! read once at registration and never changes afterwards; only operational
//! status, readiness and usage counters move.

use cortex_core::{
    Capability, CortexError, CortexResult, Engine, EngineKind, EngineStatus, Route,
};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

// ============================================================================
// USAGE COUNTERS
// ============================================================================

/// Per-engine usage counters.
#[derive(Debug, Default)]
pub struct EngineUsage {
    invocations: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_latency_us: AtomicU64,
}

impl EngineUsage {
    pub fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    fn add_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineUsageSnapshot {
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let total_latency = Duration::from_micros(self.total_latency_us.load(Ordering::Relaxed));
        let completed = successes + failures;
        let average_latency = if completed == 0 {
            Duration::ZERO
        } else {
            total_latency / u32::try_from(completed).unwrap_or(u32::MAX)
        };
        EngineUsageSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            successes,
            failures,
            total_latency,
            average_latency,
        }
    }
}

/// Point-in-time copy of [`EngineUsage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineUsageSnapshot {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_latency: Duration,
    pub average_latency: Duration,
}

// ============================================================================
// REGISTRATION
// ============================================================================

/// One registered engine.
pub struct EngineRegistration {
    kind: EngineKind,
    engine: Arc<dyn Engine>,
    capabilities: Vec<Capability>,
    status: RwLock<EngineStatus>,
    ready: AtomicBool,
    usage: EngineUsage,
}

impl EngineRegistration {
    fn new(kind: EngineKind, engine: Arc<dyn Engine>) -> Self {
        let capabilities = engine.capabilities().to_vec();
        Self {
            kind,
            engine,
            capabilities,
            status: RwLock::new(EngineStatus::Healthy),
            ready: AtomicBool::new(false),
            usage: EngineUsage::default(),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Capabilities captured at registration.
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: EngineStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn usage(&self) -> &EngineUsage {
        &self.usage
    }
}

impl std::fmt::Debug for EngineRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistration")
            .field("kind", &self.kind)
            .field("capabilities", &self.capabilities)
            .field("status", &self.status())
            .field("ready", &self.is_ready())
            .finish()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Registry of engines by kind.
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<BTreeMap<EngineKind, Arc<EngineRegistration>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine. Replaces any engine previously registered for `kind`.
    pub fn register(&self, kind: EngineKind, engine: Arc<dyn Engine>) -> Arc<EngineRegistration> {
        let registration = Arc::new(EngineRegistration::new(kind, engine));
        let previous = self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::clone(&registration));

        if previous.is_some() {
            tracing::warn!(engine = %kind, "Replaced previously registered engine");
        } else {
            tracing::debug!(
                engine = %kind,
                capabilities = ?registration.capabilities(),
                "Registered engine"
            );
        }
        registration
    }

    pub fn get(&self, kind: EngineKind) -> Option<Arc<EngineRegistration>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    /// All registrations, ordered by kind.
    pub fn all(&self) -> Vec<Arc<EngineRegistration>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn kinds(&self) -> Vec<EngineKind> {
        self.all().iter().map(|r| r.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Engines that have not finished initializing.
    pub fn pending(&self) -> Vec<EngineKind> {
        self.all()
            .iter()
            .filter(|r| !r.is_ready())
            .map(|r| r.kind())
            .collect()
    }

    /// Initialize every engine that is not ready yet, concurrently.
    ///
    /// Each engine is marked ready as soon as its own `initialize` succeeds.
    /// Returns the outcome per engine that was attempted.
    pub async fn initialize_all(&self) -> Vec<(EngineKind, CortexResult<()>)> {
        let pending: Vec<Arc<EngineRegistration>> =
            self.all().into_iter().filter(|r| !r.is_ready()).collect();

        let attempts = pending.into_iter().map(|registration| async move {
            let result = registration.engine().initialize().await;
            match &result {
                Ok(()) => {
                    registration.mark_ready();
                    tracing::info!(engine = %registration.kind(), "Engine ready");
                }
                Err(e) => {
                    tracing::error!(engine = %registration.kind(), error = %e, "Engine initialization failed");
                }
            }
            (registration.kind(), result)
        });

        join_all(attempts).await
    }

    /// Look up the engine for a route.
    ///
    /// # Errors
    /// `EngineError::Unavailable` when the engine is not registered, not
    /// ready, reporting `error`, or lacks the routed capability.
    pub fn resolve(&self, route: Route) -> CortexResult<Arc<EngineRegistration>> {
        let registration = self
            .get(route.engine)
            .ok_or_else(|| CortexError::unavailable(route.engine.as_str(), "not registered"))?;

        if !registration.is_ready() {
            return Err(CortexError::unavailable(route.engine.as_str(), "not initialized"));
        }
        if registration.status() == EngineStatus::Error {
            return Err(CortexError::unavailable(route.engine.as_str(), "reporting error status"));
        }
        if !registration.supports(route.capability) {
            return Err(CortexError::unavailable(
                route.engine.as_str(),
                format!("capability {} not supported", route.capability),
            ));
        }
        Ok(registration)
    }

    /// Status per engine, keyed by engine name.
    pub fn statuses(&self) -> BTreeMap<String, EngineStatus> {
        self.all()
            .iter()
            .map(|r| (r.kind().as_str().to_string(), r.status()))
            .collect()
    }

    /// Usage counters per engine, keyed by engine name.
    pub fn usage(&self) -> BTreeMap<String, EngineUsageSnapshot> {
        self.all()
            .iter()
            .map(|r| (r.kind().as_str().to_string(), r.usage().snapshot()))
            .collect()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::{EngineError, RequestType};
    use cortex_test_utils::MockEngine;

    fn scoring_engine() -> Arc<dyn Engine> {
        Arc::new(MockEngine::new(EngineKind::LeadScoring).with_capabilities(&[Capability::ScoreLead]))
    }

    #[tokio::test]
    async fn test_resolve_requires_ready_engine() {
        let registry = EngineRegistry::new();
        registry.register(EngineKind::LeadScoring, scoring_engine());
        let route = RequestType::LeadScoring.route();

        let err = registry.resolve(route).unwrap_err();
        assert!(matches!(err, CortexError::Engine(EngineError::Unavailable { .. })));
        assert_eq!(registry.pending(), vec![EngineKind::LeadScoring]);

        let results = registry.initialize_all().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
        assert!(registry.resolve(route).is_ok());
        assert!(registry.pending().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_rejects_unregistered_and_errored_engines() {
        let registry = EngineRegistry::new();
        let err = registry.resolve(RequestType::DealPrediction.route()).unwrap_err();
        assert_eq!(
            err,
            CortexError::unavailable("predictive", "not registered")
        );

        let registration = registry.register(EngineKind::LeadScoring, scoring_engine());
        registry.initialize_all().await;
        registration.set_status(EngineStatus::Error);
        assert!(registry.resolve(RequestType::LeadScoring.route()).is_err());

        registration.set_status(EngineStatus::Degraded);
        assert!(registry.resolve(RequestType::LeadScoring.route()).is_ok());
    }

    #[tokio::test]
    async fn test_resolve_rejects_missing_capability() {
        let registry = EngineRegistry::new();
        registry.register(
            EngineKind::Predictive,
            Arc::new(MockEngine::new(EngineKind::Predictive).with_capabilities(&[Capability::PredictDeal])),
        );
        registry.initialize_all().await;

        assert!(registry.resolve(RequestType::DealPrediction.route()).is_ok());
        let err = registry.resolve(RequestType::ChurnPrediction.route()).unwrap_err();
        assert!(err.to_string().contains("predictChurn"));
    }

    #[tokio::test]
    async fn test_initialize_all_skips_ready_engines() {
        let registry = EngineRegistry::new();
        let engine = Arc::new(MockEngine::new(EngineKind::LeadScoring));
        registry.register(EngineKind::LeadScoring, engine.clone());

        registry.initialize_all().await;
        let second = registry.initialize_all().await;
        assert!(second.is_empty());
        assert_eq!(engine.init_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_stays_pending() {
        let registry = EngineRegistry::new();
        registry.register(
            EngineKind::Nlp,
            Arc::new(MockEngine::new(EngineKind::Nlp).with_init_failure("model missing")),
        );

        let results = registry.initialize_all().await;
        assert!(results[0].1.is_err());
        assert_eq!(registry.pending(), vec![EngineKind::Nlp]);
    }

    #[test]
    fn test_capabilities_are_snapshotted() {
        let registry = EngineRegistry::new();
        let registration = registry.register(EngineKind::LeadScoring, scoring_engine());
        assert_eq!(registration.capabilities(), &[Capability::ScoreLead]);
        assert_eq!(registration.status(), EngineStatus::Healthy);
        assert!(!registration.is_ready());
    }

    #[test]
    fn test_usage_snapshot_averages_completed_calls() {
        let usage = EngineUsage::default();
        usage.record_invocation();
        usage.record_invocation();
        usage.record_success(Duration::from_millis(10));
        usage.record_failure(Duration::from_millis(30));

        let snapshot = usage.snapshot();
        assert_eq!(snapshot.invocations, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.total_latency, Duration::from_millis(40));
        assert_eq!(snapshot.average_latency, Duration::from_millis(20));
    }

    #[test]
    fn test_register_replaces_existing_engine() {
        let registry = EngineRegistry::new();
        registry.register(EngineKind::LeadScoring, scoring_engine());
        registry.register(EngineKind::LeadScoring, scoring_engine());
        assert_eq!(registry.len(), 1);
    }
}
