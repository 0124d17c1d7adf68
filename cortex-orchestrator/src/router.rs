//! Request router
//!
//! Parses a request type, resolves its engine through the registry, serves
//! from the cache when possible, and otherwise executes the routed
//! capability, either directly under a deadline or through a per-type
//! [`BatchAccumulator`].

use crate::batch::{Batch, BatchAccumulator, BatchFlush, BatchProcessor, BatchStats};
use crate::registry::{EngineRegistration, EngineRegistry};
use async_trait::async_trait;
use cortex_cache::AdaptiveCache;
use cortex_core::{
    BatchRequest, CortexConfig, CortexError, CortexResult, EventBus, MetricsRecorder,
    QueuedToken, RequestOptions, RequestOutcome, RequestType, RouterError, SystemEvent,
};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// TYPES
// ============================================================================

/// Overrides for [`Router::process_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Requests per chunk; defaults to `batch_chunk_size`.
    pub batch_size: Option<usize>,
    /// Requests in flight per chunk; defaults to `max_batch_concurrency`.
    pub max_concurrency: Option<usize>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }
}

/// A successful item of a multi-request submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemResult {
    /// Position in the submitted list.
    pub index: usize,
    pub request_type: String,
    pub outcome: RequestOutcome,
}

/// A failed item of a multi-request submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemError {
    pub index: usize,
    pub request_type: String,
    pub error: CortexError,
}

/// Outcome of [`Router::process_batch`]. Items are ordered by index.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub results: Vec<BatchItemResult>,
    pub errors: Vec<BatchItemError>,
    pub success_count: usize,
    pub error_count: usize,
    /// Percentage of successful items, 0 to 100.
    pub success_rate: f64,
}

/// An item waiting in a request-type accumulator.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub data: Value,
    pub skip_cache: bool,
    pub correlation_id: Option<String>,
    pub enqueued_at: Instant,
}

// ============================================================================
// SHARED STATE
// ============================================================================

/// Everything the direct path and the batch processors both need.
struct RouterCore {
    config: Arc<CortexConfig>,
    registry: Arc<EngineRegistry>,
    cache: Arc<AdaptiveCache>,
    events: Arc<EventBus>,
    metrics: Arc<MetricsRecorder>,
}

impl RouterCore {
    fn emit_error(&self, request_type: &str, response_time: Duration, error: &CortexError) {
        self.events.emit(&SystemEvent::RequestError {
            request_type: request_type.to_string(),
            response_time,
            error: error.to_string(),
        });
    }

    /// Every request records its end-to-end time under `request.<namespace>`.
    fn record_request_time(&self, request_type: RequestType, elapsed: Duration) {
        self.metrics
            .record_duration(format!("request.{}", request_type.namespace()), elapsed);
    }

    fn emit_success(&self, request_type: RequestType, response_time: Duration, result: &Value, cached: bool) {
        self.events.emit(&SystemEvent::RequestSuccess {
            request_type: request_type.as_str().to_string(),
            response_time,
            result: result.clone(),
            cached,
        });
    }
}

/// Runs flushed batches of one request type against its engine.
struct RequestBatchProcessor {
    request_type: RequestType,
    core: Arc<RouterCore>,
}

#[async_trait]
impl BatchProcessor<QueuedRequest> for RequestBatchProcessor {
    async fn process(&self, batch: Batch<QueuedRequest>) -> CortexResult<()> {
        let core = &self.core;
        let request_type = self.request_type;
        let route = request_type.route();
        let size = batch.items.len();
        let timer = core
            .metrics
            .start_timer(format!("batch.{}", request_type.namespace()));

        let outcome = match core.registry.resolve(route) {
            Ok(registration) => {
                let payloads: Vec<Value> = batch.items.iter().map(|i| i.data.clone()).collect();
                let deadline = core.config.request_timeout;
                match tokio::time::timeout(
                    deadline,
                    registration.engine().execute_batch(route.capability, payloads),
                )
                .await
                {
                    Ok(results) => Ok((registration, results)),
                    Err(_) => Err(CortexError::Router(RouterError::Timeout {
                        request_type: request_type.as_str().to_string(),
                        timeout: deadline,
                    })),
                }
            }
            Err(e) => Err(e),
        };
        let elapsed = core.metrics.stop_timer(timer);

        let (registration, mut results) = match outcome {
            Ok(ok) => ok,
            Err(e) => {
                for item in &batch.items {
                    let response_time = item.enqueued_at.elapsed();
                    core.record_request_time(request_type, response_time);
                    core.emit_error(request_type.as_str(), response_time, &e);
                }
                if let Some(registration) = core.registry.get(route.engine) {
                    for _ in 0..size {
                        registration.usage().record_failure(elapsed);
                    }
                }
                core.events.emit(&SystemEvent::BatchProcessed {
                    request_type: request_type.as_str().to_string(),
                    batch_id: batch.id.clone(),
                    size,
                    succeeded: 0,
                    failed: size,
                });
                return Err(e);
            }
        };

        // An engine returning fewer results than payloads fails the remainder
        results.truncate(size);
        while results.len() < size {
            results.push(Err(CortexError::execution(
                route.engine.as_str(),
                route.capability.as_str(),
                "batch result missing",
            )));
        }

        let per_item = elapsed / u32::try_from(size.max(1)).unwrap_or(u32::MAX);
        let mut succeeded = 0;
        for (item, result) in batch.items.iter().zip(results) {
            let response_time = item.enqueued_at.elapsed();
            core.record_request_time(request_type, response_time);
            match result {
                Ok(value) => {
                    succeeded += 1;
                    registration.usage().record_success(per_item);
                    if !item.skip_cache {
                        core.cache.set(request_type.namespace(), &item.data, value.clone());
                    }
                    core.emit_success(request_type, response_time, &value, false);
                }
                Err(e) => {
                    registration.usage().record_failure(per_item);
                    core.emit_error(request_type.as_str(), response_time, &e);
                }
            }
        }

        tracing::debug!(
            request_type = %request_type,
            batch_id = %batch.id,
            size,
            succeeded,
            "Processed request batch"
        );
        core.events.emit(&SystemEvent::BatchProcessed {
            request_type: request_type.as_str().to_string(),
            batch_id: batch.id,
            size,
            succeeded,
            failed: size - succeeded,
        });
        Ok(())
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Routes typed requests to engines.
pub struct Router {
    core: Arc<RouterCore>,
    accumulators: DashMap<RequestType, BatchAccumulator<QueuedRequest>>,
    closed: AtomicBool,
}

impl Router {
    pub fn new(
        config: Arc<CortexConfig>,
        registry: Arc<EngineRegistry>,
        cache: Arc<AdaptiveCache>,
        events: Arc<EventBus>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            core: Arc::new(RouterCore {
                config,
                registry,
                cache,
                events,
                metrics,
            }),
            accumulators: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Stop accepting requests. Already queued batch items still flush.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Process one request.
    ///
    /// # Errors
    /// - `RouterError::UnknownRequestType` for an unrecognized type string
    /// - `RouterError::ShuttingDown` after [`close`](Router::close)
    /// - `EngineError::Unavailable` when the routed engine cannot serve
    /// - `RouterError::Timeout` when the engine exceeds the deadline
    /// - any error the engine itself returns
    pub async fn process_request(
        &self,
        request_type: &str,
        data: Value,
        options: RequestOptions,
    ) -> CortexResult<RequestOutcome> {
        let core = &self.core;
        let received = Instant::now();

        let parsed = match request_type.parse::<RequestType>() {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(request_type, "Rejected unknown request type");
                core.emit_error(request_type, received.elapsed(), &e);
                return Err(e);
            }
        };

        if self.is_closed() {
            let e = CortexError::Router(RouterError::ShuttingDown {
                request_type: parsed.as_str().to_string(),
            });
            core.emit_error(parsed.as_str(), received.elapsed(), &e);
            return Err(e);
        }

        let route = parsed.route();
        let registration = match core.registry.resolve(route) {
            Ok(r) => r,
            Err(e) => {
                core.metrics.increment(format!("request.{}.error", parsed.namespace()));
                core.emit_error(parsed.as_str(), received.elapsed(), &e);
                return Err(e);
            }
        };
        registration.usage().record_invocation();
        let started = Instant::now();

        if !options.skip_cache {
            if let Some(hit) = core.cache.get(parsed.namespace(), &data) {
                let elapsed = started.elapsed();
                core.record_request_time(parsed, elapsed);
                registration.usage().record_success(elapsed);
                core.metrics.increment(format!("cache.{}.hit", parsed.namespace()));
                core.emit_success(parsed, elapsed, &hit, true);
                return Ok(RequestOutcome::Cached(hit));
            }
            core.metrics.increment(format!("cache.{}.miss", parsed.namespace()));
        }

        if options.batch_mode {
            core.metrics.increment(format!("request.{}.queued", parsed.namespace()));
            // Timed by the batch processor once the item completes
            return Ok(self.enqueue(parsed, data, options, started).await);
        }

        let deadline = options.timeout.unwrap_or(core.config.request_timeout);
        let result = self
            .execute_with_deadline(parsed, &registration, data.clone(), deadline)
            .await;
        let elapsed = started.elapsed();
        core.record_request_time(parsed, elapsed);

        match result {
            Ok(value) => {
                registration.usage().record_success(elapsed);
                if !options.skip_cache {
                    core.cache.set(parsed.namespace(), &data, value.clone());
                }
                core.emit_success(parsed, elapsed, &value, false);
                Ok(RequestOutcome::Computed(value))
            }
            Err(e) => {
                registration.usage().record_failure(elapsed);
                core.metrics.increment(format!("request.{}.error", parsed.namespace()));
                tracing::warn!(request_type = %parsed, error = %e, "Request failed");
                core.emit_error(parsed.as_str(), elapsed, &e);
                Err(e)
            }
        }
    }

    async fn execute_with_deadline(
        &self,
        request_type: RequestType,
        registration: &EngineRegistration,
        data: Value,
        deadline: Duration,
    ) -> CortexResult<Value> {
        let capability = request_type.route().capability;
        match tokio::time::timeout(deadline, registration.engine().execute(capability, data)).await {
            Ok(result) => result,
            Err(_) => Err(CortexError::Router(RouterError::Timeout {
                request_type: request_type.as_str().to_string(),
                timeout: deadline,
            })),
        }
    }

    async fn enqueue(
        &self,
        request_type: RequestType,
        data: Value,
        options: RequestOptions,
        started: Instant,
    ) -> RequestOutcome {
        let accumulator = self.accumulator(request_type);
        let ticket = accumulator
            .add(QueuedRequest {
                data,
                skip_cache: options.skip_cache,
                correlation_id: options.batch_id.clone(),
                enqueued_at: started,
            })
            .await;

        tracing::debug!(
            request_type = %request_type,
            batch_id = %ticket.batch_id,
            position = ticket.position,
            "Queued request"
        );
        self.core.events.emit(&SystemEvent::RequestQueued {
            request_type: request_type.as_str().to_string(),
            batch_id: ticket.batch_id.clone(),
        });

        RequestOutcome::Queued(QueuedToken {
            queued: true,
            batch_id: ticket.batch_id,
            correlation_id: options.batch_id,
        })
    }

    fn accumulator(&self, request_type: RequestType) -> BatchAccumulator<QueuedRequest> {
        self.accumulators
            .entry(request_type)
            .or_insert_with(|| {
                let processor = Arc::new(RequestBatchProcessor {
                    request_type,
                    core: Arc::clone(&self.core),
                });
                BatchAccumulator::new(
                    request_type.as_str(),
                    self.core.config.batch_config(request_type),
                    processor,
                )
            })
            .clone()
    }

    /// Process many requests in throttled chunks with bounded concurrency.
    ///
    /// Each item succeeds or fails on its own; a failing item never affects
    /// its siblings.
    pub async fn process_batch(&self, requests: Vec<BatchRequest>, options: BatchOptions) -> BatchReport {
        let config = &self.core.config;
        let chunk_size = options.batch_size.unwrap_or(config.batch_chunk_size).max(1);
        let concurrency = options
            .max_concurrency
            .unwrap_or(config.max_batch_concurrency)
            .max(1);
        let throttle = config.chunk_throttle_delay;
        let total = requests.len();

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut items = requests.into_iter().enumerate();
        let mut first_chunk = true;

        loop {
            let chunk: Vec<(usize, BatchRequest)> = items.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            if !first_chunk && !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }
            first_chunk = false;

            let outcomes: Vec<(usize, String, CortexResult<RequestOutcome>)> = stream::iter(chunk)
                .map(|(index, request)| async move {
                    let outcome = self
                        .process_request(&request.request_type, request.data, request.options)
                        .await;
                    (index, request.request_type, outcome)
                })
                .buffered(concurrency)
                .collect()
                .await;

            for (index, request_type, outcome) in outcomes {
                match outcome {
                    Ok(outcome) => results.push(BatchItemResult {
                        index,
                        request_type,
                        outcome,
                    }),
                    Err(error) => errors.push(BatchItemError {
                        index,
                        request_type,
                        error,
                    }),
                }
            }
        }

        let success_count = results.len();
        let error_count = errors.len();
        let success_rate = if total == 0 {
            0.0
        } else {
            success_count as f64 / total as f64 * 100.0
        };

        tracing::info!(total, success_count, error_count, "Processed request batch submission");

        BatchReport {
            results,
            errors,
            success_count,
            error_count,
            success_rate,
        }
    }

    /// Force-flush every request-type accumulator.
    pub async fn flush_all(&self) -> Vec<BatchFlush> {
        let accumulators: Vec<BatchAccumulator<QueuedRequest>> =
            self.accumulators.iter().map(|e| e.value().clone()).collect();

        let mut flushes = Vec::new();
        for accumulator in accumulators {
            if let Some(flush) = accumulator.flush().await {
                flushes.push(flush);
            }
        }
        flushes
    }

    /// Items waiting in accumulators, by request type.
    pub fn pending(&self) -> BTreeMap<String, usize> {
        self.accumulators
            .iter()
            .map(|e| (e.key().as_str().to_string(), e.value().pending()))
            .collect()
    }

    /// Accumulator counters, by request type.
    pub fn batch_stats(&self) -> BTreeMap<String, BatchStats> {
        self.accumulators
            .iter()
            .map(|e| (e.key().as_str().to_string(), e.value().stats()))
            .collect()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("engines", &self.core.registry.kinds())
            .field("accumulators", &self.accumulators.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::{EngineKind, EventKind};
    use cortex_test_utils::{assertions, fixtures, MockEngine};
    use serde_json::json;
    use std::sync::Mutex;

    struct Harness {
        router: Router,
        events: Arc<EventBus>,
        cache: Arc<AdaptiveCache>,
        registry: Arc<EngineRegistry>,
        metrics: Arc<MetricsRecorder>,
    }

    async fn harness(config: CortexConfig, engines: Vec<(EngineKind, Arc<MockEngine>)>) -> Harness {
        let config = Arc::new(config);
        let registry = Arc::new(EngineRegistry::new());
        for (kind, engine) in engines {
            registry.register(kind, engine);
        }
        registry.initialize_all().await;
        let cache = Arc::new(AdaptiveCache::from_config(&config));
        let events = Arc::new(EventBus::new());
        let metrics = Arc::new(MetricsRecorder::new());
        let router = Router::new(
            config,
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&events),
            Arc::clone(&metrics),
        );
        Harness {
            router,
            events,
            cache,
            registry,
            metrics,
        }
    }

    fn capture(events: &EventBus, kind: EventKind) -> Arc<Mutex<Vec<SystemEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.on(kind, move |e: &SystemEvent| sink.lock().unwrap().push(e.clone()));
        seen
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let engine = Arc::new(MockEngine::new(EngineKind::LeadScoring));
        let h = harness(fixtures::test_config(), vec![(EngineKind::LeadScoring, engine.clone())]).await;
        let successes = capture(&h.events, EventKind::RequestSuccess);

        let first = h
            .router
            .process_request("leadScoring", fixtures::lead(1), RequestOptions::new())
            .await
            .unwrap();
        let second = h
            .router
            .process_request("leadScoring", fixtures::lead(1), RequestOptions::new())
            .await
            .unwrap();

        assert!(!first.is_cached());
        assert!(second.is_cached());
        assert_eq!(first.value(), second.value());
        assert_eq!(engine.execute_calls(), 1);

        let seen = successes.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[1], SystemEvent::RequestSuccess { cached: true, .. }));
    }

    #[tokio::test]
    async fn test_skip_cache_always_executes() {
        let engine = Arc::new(MockEngine::new(EngineKind::LeadScoring));
        let h = harness(fixtures::test_config(), vec![(EngineKind::LeadScoring, engine.clone())]).await;

        for _ in 0..3 {
            h.router
                .process_request("leadScoring", fixtures::lead(2), RequestOptions::new().skip_cache())
                .await
                .unwrap();
        }
        assert_eq!(engine.execute_calls(), 3);
        assert_eq!(h.cache.len("leadScoring"), 0);
    }

    #[tokio::test]
    async fn test_unknown_type_emits_error() {
        let h = harness(fixtures::test_config(), fixtures::crm_engines()).await;
        let errors = capture(&h.events, EventKind::RequestError);

        let result = h
            .router
            .process_request("fortuneTelling", json!({}), RequestOptions::new())
            .await;
        assertions::assert_unknown_request_type(&result);
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_engine_does_not_block_others() {
        let h = harness(
            fixtures::test_config(),
            vec![(EngineKind::LeadScoring, Arc::new(MockEngine::new(EngineKind::LeadScoring)))],
        )
        .await;

        let missing = h
            .router
            .process_request("sentimentAnalysis", fixtures::message("great"), RequestOptions::new())
            .await;
        assertions::assert_unavailable(&missing, EngineKind::Nlp);

        let ok = h
            .router
            .process_request("leadScoring", fixtures::lead(3), RequestOptions::new())
            .await;
        assertions::assert_ok(&ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let slow = Arc::new(MockEngine::new(EngineKind::Predictive).with_latency(Duration::from_secs(10)));
        let h = harness(fixtures::test_config(), vec![(EngineKind::Predictive, slow)]).await;

        let result = h
            .router
            .process_request(
                "dealPrediction",
                fixtures::deal(1),
                RequestOptions::new().with_timeout(Duration::from_millis(50)),
            )
            .await;
        assertions::assert_timeout(&result);
        assert_eq!(h.cache.len("dealPrediction"), 0);

        let usage = h.registry.usage();
        assert_eq!(usage["predictive"].failures, 1);
    }

    #[tokio::test]
    async fn test_process_batch_isolates_failures() {
        let engine = Arc::new(
            MockEngine::new(EngineKind::LeadScoring).with_failure_when(|p| p["leadId"] == 5),
        );
        let h = harness(fixtures::test_config(), vec![(EngineKind::LeadScoring, engine)]).await;

        let requests: Vec<BatchRequest> = (1..=10)
            .map(|i| BatchRequest::new("leadScoring", fixtures::lead(i)))
            .collect();
        let report = h
            .router
            .process_batch(requests, BatchOptions::new().with_batch_size(4).with_max_concurrency(2))
            .await;

        assert_eq!(report.success_count, 9);
        assert_eq!(report.error_count, 1);
        assert!((report.success_rate - 90.0).abs() < f64::EPSILON);
        assert_eq!(report.errors[0].index, 4);
        let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_process_batch_empty() {
        let h = harness(fixtures::test_config(), fixtures::crm_engines()).await;
        let report = h.router.process_batch(Vec::new(), BatchOptions::new()).await;
        assert_eq!(report.success_count + report.error_count, 0);
        assert_eq!(report.success_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_mode_queues_and_delivers_through_events() {
        let engine = Arc::new(MockEngine::new(EngineKind::Nlp));
        let mut config = fixtures::test_config();
        config.batching.insert(
            "sentimentAnalysis".to_string(),
            cortex_core::BatchConfig::new(3, Duration::from_millis(100)),
        );
        let h = harness(config, vec![(EngineKind::Nlp, engine.clone())]).await;
        let successes = capture(&h.events, EventKind::RequestSuccess);
        let batches = capture(&h.events, EventKind::BatchProcessed);
        let queued = capture(&h.events, EventKind::RequestQueued);

        let mut batch_ids = Vec::new();
        for text in ["good", "bad"] {
            let outcome = h
                .router
                .process_request(
                    "sentimentAnalysis",
                    fixtures::message(text),
                    RequestOptions::new().batched().with_batch_id("campaign-7"),
                )
                .await
                .unwrap();
            match outcome {
                RequestOutcome::Queued(token) => {
                    assert!(token.queued);
                    assert_eq!(token.correlation_id.as_deref(), Some("campaign-7"));
                    batch_ids.push(token.batch_id);
                }
                other => panic!("expected queued outcome, got {other:?}"),
            }
        }
        assert_eq!(batch_ids[0], batch_ids[1]);
        assert_eq!(queued.lock().unwrap().len(), 2);
        assert_eq!(h.router.pending()["sentimentAnalysis"], 2);
        assert_eq!(engine.execute_calls(), 0);
        assert!(h.metrics.timing("request.sentimentAnalysis").is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(engine.batch_calls(), 1);
        let timing = h.metrics.timing("request.sentimentAnalysis").unwrap();
        assert_eq!(timing.count, 2);
        assert!(timing.max >= Duration::from_millis(100));
        assert_eq!(successes.lock().unwrap().len(), 2);
        match &batches.lock().unwrap()[0] {
            SystemEvent::BatchProcessed { size, succeeded, batch_id, .. } => {
                assert_eq!(*size, 2);
                assert_eq!(*succeeded, 2);
                assert_eq!(batch_id, &batch_ids[0]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        // Batched results populate the cache
        let hit = h
            .router
            .process_request("sentimentAnalysis", fixtures::message("good"), RequestOptions::new())
            .await
            .unwrap();
        assert!(hit.is_cached());
    }

    #[tokio::test]
    async fn test_flush_all_drains_accumulators() {
        let engine = Arc::new(MockEngine::new(EngineKind::LeadScoring));
        let h = harness(fixtures::test_config(), vec![(EngineKind::LeadScoring, engine.clone())]).await;

        h.router
            .process_request("leadScoring", fixtures::lead(9), RequestOptions::new().batched())
            .await
            .unwrap();
        let flushes = h.router.flush_all().await;

        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].size, 1);
        assert_eq!(engine.batch_calls(), 1);
        assert_eq!(h.router.pending()["leadScoring"], 0);
    }

    #[tokio::test]
    async fn test_closed_router_rejects_requests() {
        let h = harness(fixtures::test_config(), fixtures::crm_engines()).await;
        h.router.close();
        let result = h
            .router
            .process_request("leadScoring", fixtures::lead(1), RequestOptions::new())
            .await;
        assert!(matches!(
            result,
            Err(CortexError::Router(RouterError::ShuttingDown { .. }))
        ));
    }
}
