//! Cortex Test Utilities
//!
//! Shared test infrastructure for the Cortex workspace:
//! - A configurable mock engine with call counters and fault injection
//! - Proptest generators for request types, payloads and configuration
//! - Fixtures for common scenarios
//! - Assertions for Cortex error variants

pub use cortex_core::{
    BatchConfig, Capability, CortexConfig, CortexError, CortexResult, Engine, EngineError,
    EngineKind, EngineStatus, LifecycleError, NamespaceConfig, RequestType, RouterError,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK ENGINE
// ============================================================================

type FailurePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Capabilities a kind of engine serves according to the route table.
pub fn routed_capabilities(kind: EngineKind) -> Vec<Capability> {
    RequestType::ALL
        .iter()
        .map(|t| t.route())
        .filter(|r| r.engine == kind)
        .map(|r| r.capability)
        .collect()
}

/// Deterministic engine for tests.
///
/// Successful calls echo `{"engine", "capability", "input", "score"}` where
/// `score` is derived from the payload, so identical payloads give identical
/// results.
pub struct MockEngine {
    kind: EngineKind,
    capabilities: Vec<Capability>,
    latency: Duration,
    init_delay: Duration,
    init_failure: Option<String>,
    health_delay: Duration,
    optimize_failure: Option<String>,
    fail_when: Option<FailurePredicate>,
    status: Mutex<EngineStatus>,
    health_probe_fails: AtomicBool,
    init_calls: AtomicU64,
    shutdown_calls: AtomicU64,
    execute_calls: AtomicU64,
    batch_calls: AtomicU64,
    health_calls: AtomicU64,
    optimize_calls: AtomicU64,
}

impl MockEngine {
    /// Engine serving every capability routed to `kind`.
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            capabilities: routed_capabilities(kind),
            latency: Duration::ZERO,
            init_delay: Duration::ZERO,
            init_failure: None,
            health_delay: Duration::ZERO,
            optimize_failure: None,
            fail_when: None,
            status: Mutex::new(EngineStatus::Healthy),
            health_probe_fails: AtomicBool::new(false),
            init_calls: AtomicU64::new(0),
            shutdown_calls: AtomicU64::new(0),
            execute_calls: AtomicU64::new(0),
            batch_calls: AtomicU64::new(0),
            health_calls: AtomicU64::new(0),
            optimize_calls: AtomicU64::new(0),
        }
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    /// Delay every `execute` call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn with_init_failure(mut self, reason: impl Into<String>) -> Self {
        self.init_failure = Some(reason.into());
        self
    }

    /// Delay every health probe.
    pub fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = delay;
        self
    }

    pub fn with_optimize_failure(mut self, reason: impl Into<String>) -> Self {
        self.optimize_failure = Some(reason.into());
        self
    }

    /// Fail `execute` for every payload matching `predicate`.
    pub fn with_failure_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    /// Status reported by subsequent health probes.
    pub fn set_status(&self, status: EngineStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Make subsequent health probes return an error.
    pub fn fail_health_probe(&self, fail: bool) {
        self.health_probe_fails.store(fail, Ordering::SeqCst);
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn init_calls(&self) -> u64 {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> u64 {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> u64 {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> u64 {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> u64 {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn optimize_calls(&self) -> u64 {
        self.optimize_calls.load(Ordering::SeqCst)
    }

    fn score(payload: &Value) -> u64 {
        payload
            .to_string()
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
            % 101
    }
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine")
            .field("kind", &self.kind)
            .field("capabilities", &self.capabilities)
            .field("execute_calls", &self.execute_calls())
            .finish()
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn execute(&self, capability: Capability, payload: Value) -> CortexResult<Value> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.latency).await;

        if !self.capabilities.contains(&capability) {
            return Err(CortexError::execution(
                self.kind.as_str(),
                capability.as_str(),
                "unsupported capability",
            ));
        }
        if self.fail_when.as_ref().is_some_and(|f| f(&payload)) {
            return Err(CortexError::execution(
                self.kind.as_str(),
                capability.as_str(),
                "injected failure",
            ));
        }

        let score = Self::score(&payload);
        Ok(json!({
            "engine": self.kind.as_str(),
            "capability": capability.as_str(),
            "input": payload,
            "score": score,
        }))
    }

    async fn execute_batch(
        &self,
        capability: Capability,
        payloads: Vec<Value>,
    ) -> Vec<CortexResult<Value>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut results = Vec::with_capacity(payloads.len());
        for payload in payloads {
            results.push(self.execute(capability, payload).await);
        }
        results
    }

    async fn initialize(&self) -> CortexResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.init_delay).await;
        match &self.init_failure {
            Some(reason) => Err(CortexError::execution(self.kind.as_str(), "initialize", reason.clone())),
            None => Ok(()),
        }
    }

    async fn shutdown(&self) -> CortexResult<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> CortexResult<EngineStatus> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.health_delay).await;
        if self.health_probe_fails.load(Ordering::SeqCst) {
            return Err(CortexError::Lifecycle(LifecycleError::HealthCheckFailure {
                component: self.kind.as_str().to_string(),
                reason: "probe failed".to_string(),
            }));
        }
        Ok(*self.status.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn optimize(&self) -> CortexResult<()> {
        self.optimize_calls.fetch_add(1, Ordering::SeqCst);
        match &self.optimize_failure {
            Some(reason) => Err(CortexError::execution(self.kind.as_str(), "optimize", reason.clone())),
            None => Ok(()),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Cortex inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Map;

    pub fn arb_request_type() -> impl Strategy<Value = RequestType> {
        prop::sample::select(RequestType::ALL.to_vec())
    }

    pub fn arb_engine_kind() -> impl Strategy<Value = EngineKind> {
        prop::sample::select(EngineKind::ALL.to_vec())
    }

    /// A scalar JSON value.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ]
    }

    /// A request payload: an object of up to eight fields, one level of nesting.
    pub fn arb_params() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            arb_scalar(),
            prop::collection::vec(arb_scalar(), 0..4).prop_map(Value::Array),
        ]
        .boxed();
        let nested = prop::collection::btree_map("[a-z]{1,6}", leaf.clone(), 0..4)
            .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()));
        prop::collection::btree_map("[a-zA-Z]{1,10}", prop_oneof![leaf, nested], 0..8)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    pub fn arb_namespace_config() -> impl Strategy<Value = NamespaceConfig> {
        (1usize..5000, 1u64..86_400_000)
            .prop_map(|(max_size, ttl_ms)| NamespaceConfig::new(max_size, Duration::from_millis(ttl_ms)))
    }

    pub fn arb_batch_config() -> impl Strategy<Value = BatchConfig> {
        (1usize..100, 1u64..10_000)
            .prop_map(|(size, ms)| BatchConfig::new(size, Duration::from_millis(ms)))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// Development configuration with short intervals and no chunk throttle.
    pub fn test_config() -> CortexConfig {
        CortexConfig {
            health_check_interval: Duration::from_secs(1),
            optimization_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
            engine_init_timeout: Duration::from_secs(1),
            health_probe_timeout: Duration::from_millis(200),
            chunk_throttle_delay: Duration::from_millis(1),
            ..CortexConfig::development()
        }
    }

    /// One healthy mock engine per engine kind.
    pub fn crm_engines() -> Vec<(EngineKind, Arc<MockEngine>)> {
        EngineKind::ALL
            .iter()
            .map(|kind| (*kind, Arc::new(MockEngine::new(*kind))))
            .collect()
    }

    pub fn lead(id: u64) -> Value {
        json!({
            "leadId": id,
            "company": format!("Company {id}"),
            "source": "website",
            "engagement": {"emailsOpened": id % 7, "meetings": id % 3},
        })
    }

    pub fn deal(id: u64) -> Value {
        json!({
            "dealId": id,
            "stage": "negotiation",
            "amount": 1_000 * id,
        })
    }

    pub fn message(text: &str) -> Value {
        json!({ "text": text })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Cortex error variants.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CortexResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &CortexResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a result is an `EngineError::Unavailable` for `engine`.
    #[track_caller]
    pub fn assert_unavailable<T: std::fmt::Debug>(result: &CortexResult<T>, engine: EngineKind) {
        match result {
            Err(CortexError::Engine(EngineError::Unavailable { engine: e, .. })) => {
                assert_eq!(e, engine.as_str(), "Wrong engine in Unavailable error");
            }
            other => panic!("Expected Unavailable error for {engine}, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_timeout<T: std::fmt::Debug>(result: &CortexResult<T>) {
        match result {
            Err(CortexError::Router(RouterError::Timeout { .. })) => {}
            other => panic!("Expected Timeout error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_unknown_request_type<T: std::fmt::Debug>(result: &CortexResult<T>) {
        match result {
            Err(CortexError::Router(RouterError::UnknownRequestType { .. })) => {}
            other => panic!("Expected UnknownRequestType error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_execution_failed<T: std::fmt::Debug>(result: &CortexResult<T>) {
        match result {
            Err(CortexError::Engine(EngineError::ExecutionFailed { .. })) => {}
            other => panic!("Expected ExecutionFailed error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routed_capabilities_cover_route_table() {
        let all: Vec<Capability> = EngineKind::ALL
            .iter()
            .flat_map(|k| routed_capabilities(*k))
            .collect();
        assert_eq!(all.len(), RequestType::ALL.len());
        assert_eq!(
            routed_capabilities(EngineKind::Predictive),
            vec![Capability::PredictDeal, Capability::PredictChurn, Capability::ForecastRevenue]
        );
    }

    #[tokio::test]
    async fn test_mock_engine_is_deterministic() {
        let engine = MockEngine::new(EngineKind::LeadScoring);
        let a = engine.execute(Capability::ScoreLead, fixtures::lead(1)).await.unwrap();
        let b = engine.execute(Capability::ScoreLead, fixtures::lead(1)).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a["engine"], "leadScoring");
        assert_eq!(engine.execute_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_engine_injected_failure() {
        let engine = MockEngine::new(EngineKind::LeadScoring)
            .with_failure_when(|p| p["leadId"] == 5);
        let ok = engine.execute(Capability::ScoreLead, fixtures::lead(4)).await;
        let err = engine.execute(Capability::ScoreLead, fixtures::lead(5)).await;
        assertions::assert_ok(&ok);
        assertions::assert_execution_failed(&err);
    }

    #[tokio::test]
    async fn test_mock_engine_health_controls() {
        let engine = MockEngine::new(EngineKind::Nlp);
        assert_eq!(engine.health_check().await.unwrap(), EngineStatus::Healthy);
        engine.set_status(EngineStatus::Degraded);
        assert_eq!(engine.health_check().await.unwrap(), EngineStatus::Degraded);
        engine.fail_health_probe(true);
        assertions::assert_err(&engine.health_check().await);
        assert_eq!(engine.health_calls(), 3);
    }
}
