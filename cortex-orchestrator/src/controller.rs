//! Health and bootstrap controller
//!
//! Owns [`SystemHealth`] and drives the system state machine:
//!
//! ```text
//! not_initialized -> initializing -> {healthy, degraded, error} -> shutdown
//! ```
//!
//! `initialize` brings engines up under a deadline, installs the periodic
//! health and optimization tasks, and derives the first status from a
//! synchronous health check. `shutdown` stops the tasks, drains pending
//! batches, and releases engines and cache.

use crate::jobs::{spawn_periodic, Job, PeriodicTaskMetrics, PeriodicTaskSnapshot, PeriodicWork};
use crate::registry::{EngineRegistration, EngineRegistry};
use crate::router::Router;
use async_trait::async_trait;
use chrono::Utc;
use cortex_cache::{AdaptiveCache, OptimizationReport};
use cortex_core::{
    CortexConfig, CortexError, CortexResult, EngineStatus, EventBus, LifecycleError,
    MetricsRecorder, Severity, SystemEvent, SystemHealth, SystemStatus,
};
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type InitFuture = Shared<BoxFuture<'static, CortexResult<SystemStatus>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of one [`HealthController::optimize_system`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationSummary {
    pub cache: OptimizationReport,
    /// Engines whose `optimize` succeeded.
    pub engines_optimized: usize,
    /// Failure message per engine name.
    pub engine_failures: BTreeMap<String, String>,
    pub duration: Duration,
}

struct ControllerInner {
    config: Arc<CortexConfig>,
    registry: Arc<EngineRegistry>,
    cache: Arc<AdaptiveCache>,
    router: Arc<Router>,
    events: Arc<EventBus>,
    metrics: Arc<MetricsRecorder>,
    health: RwLock<SystemHealth>,
    init: Mutex<Option<InitFuture>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutting_down: AtomicBool,
    task_metrics: Arc<PeriodicTaskMetrics>,
}

/// Drives initialization, health aggregation, optimization and shutdown.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct HealthController {
    inner: Arc<ControllerInner>,
}

impl HealthController {
    pub fn new(
        config: Arc<CortexConfig>,
        registry: Arc<EngineRegistry>,
        cache: Arc<AdaptiveCache>,
        router: Arc<Router>,
        events: Arc<EventBus>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let health = SystemHealth::new(config.max_error_log);
        Self {
            inner: Arc::new(ControllerInner {
                config,
                registry,
                cache,
                router,
                events,
                metrics,
                health: RwLock::new(health),
                init: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                shutdown_tx,
                shutting_down: AtomicBool::new(false),
                task_metrics: Arc::new(PeriodicTaskMetrics::new()),
            }),
        }
    }

    pub fn status(&self) -> SystemStatus {
        self.inner.status()
    }

    /// Snapshot of the current health record.
    pub fn health(&self) -> SystemHealth {
        self.inner
            .health
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn task_metrics(&self) -> PeriodicTaskSnapshot {
        self.inner.task_metrics.snapshot()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.is_shutting_down()
    }

    /// Bring the system up.
    ///
    /// Returns the current status without side effects when already
    /// initialized. Concurrent callers share one attempt and its outcome. A
    /// failed attempt leaves status `error` and may be retried.
    ///
    /// # Errors
    /// - `LifecycleError::InitializationTimeout` when engines miss `engine_init_timeout`
    /// - `LifecycleError::InitializationFailed` when an engine fails to initialize
    ///   or the system has been shut down
    pub async fn initialize(&self) -> CortexResult<SystemStatus> {
        let current = self.status();
        if current.is_initialized() {
            return Ok(current);
        }
        if self.inner.is_shutting_down() {
            return Err(CortexError::Lifecycle(LifecycleError::InitializationFailed {
                reason: "system has been shut down".to_string(),
            }));
        }

        let attempt = {
            let mut slot = lock(&self.inner.init);
            match slot.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let attempt = inner.run_initialize().boxed().shared();
                    *slot = Some(attempt.clone());
                    attempt
                }
            }
        };

        let result = attempt.clone().await;

        {
            let mut slot = lock(&self.inner.init);
            if slot.as_ref().is_some_and(|s| s.ptr_eq(&attempt)) {
                *slot = None;
            }
        }
        result
    }

    /// Probe every engine and the cache, then update the system status.
    pub async fn perform_health_check(&self) -> SystemHealth {
        self.inner.perform_health_check().await
    }

    /// Run cache and engine optimization once.
    pub async fn optimize_system(&self) -> OptimizationSummary {
        self.inner.optimize_system().await
    }

    /// Stop the system. Idempotent and safe before `initialize`.
    pub async fn shutdown(&self) {
        self.inner.shutdown().await
    }
}

impl std::fmt::Debug for HealthController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthController")
            .field("status", &self.status())
            .field("shutting_down", &self.is_shutting_down())
            .field("tasks", &lock(&self.inner.tasks).len())
            .finish()
    }
}

// ============================================================================
// STATE MACHINE
// ============================================================================

fn shut_down_during_initialization() -> CortexError {
    CortexError::Lifecycle(LifecycleError::InitializationFailed {
        reason: "system was shut down during initialization".to_string(),
    })
}

impl ControllerInner {
    fn status(&self) -> SystemStatus {
        self.health
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: SystemStatus) -> SystemStatus {
        let mut health = self.health.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut health.status, status)
    }

    fn record_error(&self, message: impl Into<String>, severity: Severity) {
        self.health
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .push(message, severity);
    }

    fn fail_initialization(&self, error: CortexError) -> CortexResult<SystemStatus> {
        tracing::error!(error = %error, "System initialization failed");
        self.record_error(error.to_string(), Severity::Critical);
        self.set_status(SystemStatus::Error);
        Err(error)
    }

    async fn run_initialize(self: Arc<Self>) -> CortexResult<SystemStatus> {
        let started = Instant::now();
        let previous = self.set_status(SystemStatus::Initializing);
        tracing::info!(previous = %previous, engines = self.registry.len(), "Initializing system");

        // Core services
        for (name, ns) in &self.config.namespaces {
            if !self.cache.has_namespace(name) {
                self.cache.register_namespace(name.clone(), *ns);
            }
        }
        self.metrics.increment("lifecycle.initialize");

        // Engines
        let timeout = self.config.engine_init_timeout;
        let outcomes = match tokio::time::timeout(timeout, self.registry.initialize_all()).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                let pending = self
                    .registry
                    .pending()
                    .iter()
                    .map(|k| k.as_str().to_string())
                    .collect();
                return self.fail_initialization(CortexError::Lifecycle(
                    LifecycleError::InitializationTimeout { pending, timeout },
                ));
            }
        };
        let failures: Vec<String> = outcomes
            .iter()
            .filter_map(|(kind, outcome)| outcome.as_ref().err().map(|e| format!("{kind}: {e}")))
            .collect();
        if !failures.is_empty() {
            return self.fail_initialization(CortexError::Lifecycle(
                LifecycleError::InitializationFailed {
                    reason: failures.join("; "),
                },
            ));
        }

        if self.is_shutting_down() {
            return Err(shut_down_during_initialization());
        }

        // Periodic tasks
        self.spawn_tasks();

        let health = self.perform_health_check().await;
        if self.is_shutting_down() {
            return Err(shut_down_during_initialization());
        }

        let duration = started.elapsed();
        self.metrics.record_duration("lifecycle.initialize", duration);
        tracing::info!(
            status = %health.status,
            duration_ms = duration.as_millis() as u64,
            "System initialized"
        );
        self.events.emit(&SystemEvent::SystemInitialized {
            status: health.status,
            duration,
        });
        Ok(health.status)
    }

    fn spawn_tasks(self: &Arc<Self>) {
        // `shutdown` raises the flag before draining this list
        let mut tasks = lock(&self.tasks);
        if !tasks.is_empty() || self.is_shutting_down() {
            return;
        }
        for (job, period) in [
            (Job::HealthCheck, self.config.health_check_interval),
            (Job::Optimization, self.config.optimization_interval),
        ] {
            tasks.push(spawn_periodic(
                job,
                Arc::downgrade(self),
                period,
                self.shutdown_tx.subscribe(),
                Arc::clone(&self.task_metrics),
            ));
        }
    }

    async fn probe(&self, registration: &EngineRegistration) -> EngineStatus {
        let deadline = self.config.health_probe_timeout;
        match tokio::time::timeout(deadline, registration.engine().health_check()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::warn!(engine = %registration.kind(), error = %e, "Engine health probe failed");
                self.record_error(format!("{}: {e}", registration.kind()), Severity::Error);
                EngineStatus::Error
            }
            Err(_) => {
                tracing::warn!(engine = %registration.kind(), timeout_ms = deadline.as_millis() as u64, "Engine health probe timed out");
                self.record_error(
                    format!("{}: health probe timed out after {deadline:?}", registration.kind()),
                    Severity::Error,
                );
                EngineStatus::Error
            }
        }
    }

    async fn perform_health_check(&self) -> SystemHealth {
        let registrations = self.registry.all();
        let statuses = join_all(registrations.iter().map(|r| self.probe(r))).await;

        let mut engines = BTreeMap::new();
        for (registration, status) in registrations.iter().zip(statuses) {
            registration.set_status(status);
            engines.insert(registration.kind().as_str().to_string(), status);
        }
        let all_healthy = engines.values().all(|s| *s == EngineStatus::Healthy);
        let cache = self.cache.health_check();

        let (previous, snapshot) = {
            let mut health = self.health.write().unwrap_or_else(PoisonError::into_inner);
            let previous = health.status;
            health.engines = engines;
            health.cache = Some(cache);
            health.last_check = Some(Utc::now());
            if matches!(
                previous,
                SystemStatus::Initializing | SystemStatus::Healthy | SystemStatus::Degraded
            ) {
                health.status = if all_healthy {
                    SystemStatus::Healthy
                } else {
                    SystemStatus::Degraded
                };
            }
            (previous, health.clone())
        };

        self.metrics.increment("health.checks");
        tracing::debug!(status = %snapshot.status, "Health check complete");
        self.events.emit(&SystemEvent::HealthCheck {
            health: Box::new(snapshot.clone()),
        });

        match (previous, snapshot.status) {
            (SystemStatus::Degraded, SystemStatus::Degraded) => {}
            (_, SystemStatus::Degraded) => {
                let unhealthy_engines = snapshot.unhealthy_engines();
                tracing::warn!(previous = %previous, unhealthy = ?unhealthy_engines, "System degraded");
                self.events.emit(&SystemEvent::SystemDegraded {
                    previous,
                    unhealthy_engines,
                });
            }
            (SystemStatus::Degraded, SystemStatus::Healthy) => {
                tracing::info!("System recovered");
                self.events.emit(&SystemEvent::SystemRecovered { previous });
            }
            _ => {}
        }

        snapshot
    }

    async fn optimize_system(&self) -> OptimizationSummary {
        let started = Instant::now();
        let cache = self.cache.optimize();

        let ready: Vec<Arc<EngineRegistration>> = self
            .registry
            .all()
            .into_iter()
            .filter(|r| r.is_ready())
            .collect();
        let outcomes = join_all(ready.iter().map(|r| async move {
            (r.kind(), r.engine().optimize().await)
        }))
        .await;

        let mut engines_optimized = 0;
        let mut engine_failures = BTreeMap::new();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(()) => engines_optimized += 1,
                Err(e) => {
                    tracing::warn!(engine = %kind, error = %e, "Engine optimization failed");
                    self.record_error(format!("{kind}: {e}"), Severity::Warning);
                    engine_failures.insert(kind.as_str().to_string(), e.to_string());
                }
            }
        }

        let duration = started.elapsed();
        self.metrics.record_duration("optimization", duration);
        self.events.emit(&SystemEvent::SystemOptimized {
            expired: cache.expired,
            evicted: cache.low_utilization_evictions,
            compacted_namespaces: cache.compacted_namespaces,
            engines_optimized,
            engine_failures: engine_failures.len(),
            duration,
        });

        OptimizationSummary {
            cache,
            engines_optimized,
            engine_failures,
            duration,
        }
    }

    async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(status = %self.status(), "Shutting down system");

        self.shutdown_tx.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for task in tasks {
            task.abort();
        }

        // Let an in-flight initialize settle so every engine it readied is released below
        let in_flight = lock(&self.init).clone();
        if let Some(attempt) = in_flight {
            if let Err(e) = attempt.await {
                tracing::debug!(error = %e, "Initialization abandoned by shutdown");
            }
        }

        self.router.close();
        for flush in self.router.flush_all().await {
            if let Some(e) = &flush.error {
                tracing::warn!(batch_id = %flush.batch_id, size = flush.size, error = %e, "Batch failed during shutdown");
            }
        }

        let ready: Vec<Arc<EngineRegistration>> = self
            .registry
            .all()
            .into_iter()
            .filter(|r| r.is_ready())
            .collect();
        let outcomes = join_all(ready.iter().map(|r| async move {
            (r.kind(), r.engine().shutdown().await)
        }))
        .await;
        for (kind, outcome) in outcomes {
            if let Err(e) = outcome {
                tracing::warn!(engine = %kind, error = %e, "Engine shutdown failed");
                self.record_error(format!("{kind}: {e}"), Severity::Warning);
            }
        }

        self.cache.shutdown();
        self.set_status(SystemStatus::Shutdown);
        tracing::info!("System shut down");
        self.events.emit(&SystemEvent::SystemShutdown);
    }
}

#[async_trait]
impl PeriodicWork for ControllerInner {
    async fn run_cycle(&self, job: Job) -> CortexResult<()> {
        match job {
            Job::HealthCheck => {
                self.perform_health_check().await;
                Ok(())
            }
            Job::Optimization => {
                let summary = self.optimize_system().await;
                match summary.engine_failures.into_iter().next() {
                    Some((engine, message)) => Err(CortexError::execution(engine, "optimize", message)),
                    None => Ok(()),
                }
            }
        }
    }

    fn is_shutting_down(&self) -> bool {
        ControllerInner::is_shutting_down(self)
    }
}
