//! Application context
//!
//! [`CortexSystem`] owns one cache, one engine registry, one router and one
//! health controller, wired together at build time. There is no global
//! state; create as many independent systems as needed.

use crate::batch::BatchStats;
use crate::controller::{HealthController, OptimizationSummary};
use crate::jobs::PeriodicTaskSnapshot;
use crate::registry::{EngineRegistry, EngineUsageSnapshot};
use crate::router::{BatchOptions, BatchReport, Router};
use cortex_cache::{AdaptiveCache, CacheStats};
use cortex_core::{
    BatchRequest, CortexConfig, CortexResult, Engine, EngineKind, EventBus, EventHandler,
    EventKind, MetricsRecorder, MetricsSnapshot, RequestOptions, RequestOutcome, SubscriptionId,
    SystemHealth, SystemStatus,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything [`CortexSystem::metrics`] reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub status: SystemStatus,
    pub requests: MetricsSnapshot,
    pub cache: BTreeMap<String, CacheStats>,
    pub engines: BTreeMap<String, EngineUsageSnapshot>,
    pub batches: BTreeMap<String, BatchStats>,
    pub periodic: PeriodicTaskSnapshot,
    /// Cache lookups against namespaces that were never registered.
    pub unregistered_cache_lookups: u64,
}

/// Builder for [`CortexSystem`].
#[derive(Default)]
pub struct CortexSystemBuilder {
    config: Option<CortexConfig>,
    engines: Vec<(EngineKind, Arc<dyn Engine>)>,
}

impl CortexSystemBuilder {
    pub fn config(mut self, config: CortexConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register an engine. A later registration for the same kind replaces
    /// the earlier one.
    pub fn engine(mut self, kind: EngineKind, engine: Arc<dyn Engine>) -> Self {
        self.engines.push((kind, engine));
        self
    }

    /// Validate the configuration and wire the system together.
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` when the configuration fails validation.
    pub fn build(self) -> CortexResult<CortexSystem> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let config = Arc::new(config);

        let registry = Arc::new(EngineRegistry::new());
        for (kind, engine) in self.engines {
            registry.register(kind, engine);
        }
        let cache = Arc::new(AdaptiveCache::from_config(&config));
        let events = Arc::new(EventBus::new());
        let metrics = Arc::new(MetricsRecorder::new());
        let router = Arc::new(Router::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&events),
            Arc::clone(&metrics),
        ));
        let controller = HealthController::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&router),
            Arc::clone(&events),
            Arc::clone(&metrics),
        );

        tracing::debug!(engines = registry.len(), namespaces = config.namespaces.len(), "Built Cortex system");

        Ok(CortexSystem {
            config,
            registry,
            cache,
            events,
            metrics,
            router,
            controller,
        })
    }
}

/// The orchestration layer as one object.
pub struct CortexSystem {
    config: Arc<CortexConfig>,
    registry: Arc<EngineRegistry>,
    cache: Arc<AdaptiveCache>,
    events: Arc<EventBus>,
    metrics: Arc<MetricsRecorder>,
    router: Arc<Router>,
    controller: HealthController,
}

impl CortexSystem {
    pub fn builder() -> CortexSystemBuilder {
        CortexSystemBuilder::default()
    }

    /// Bring engines up and start the periodic tasks.
    pub async fn initialize(&self) -> CortexResult<SystemStatus> {
        self.controller.initialize().await
    }

    /// Stop periodic tasks, drain batches, release engines and cache.
    pub async fn shutdown(&self) {
        self.controller.shutdown().await
    }

    pub async fn process_request(
        &self,
        request_type: &str,
        data: Value,
        options: RequestOptions,
    ) -> CortexResult<RequestOutcome> {
        self.router.process_request(request_type, data, options).await
    }

    pub async fn process_batch(&self, requests: Vec<BatchRequest>, options: BatchOptions) -> BatchReport {
        self.router.process_batch(requests, options).await
    }

    /// Current health record.
    pub fn system_status(&self) -> SystemHealth {
        self.controller.health()
    }

    pub fn status(&self) -> SystemStatus {
        self.controller.status()
    }

    pub async fn perform_health_check(&self) -> SystemHealth {
        self.controller.perform_health_check().await
    }

    pub async fn optimize_system(&self) -> OptimizationSummary {
        self.controller.optimize_system().await
    }

    /// Subscribe to an event.
    pub fn on(&self, kind: EventKind, handler: impl EventHandler + 'static) -> SubscriptionId {
        self.events.on(kind, handler)
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.events.off(subscription)
    }

    pub fn metrics(&self) -> SystemMetrics {
        SystemMetrics {
            status: self.status(),
            requests: self.metrics.snapshot(),
            cache: self.cache.all_stats(),
            engines: self.registry.usage(),
            batches: self.router.batch_stats(),
            periodic: self.controller.task_metrics(),
            unregistered_cache_lookups: self.cache.unregistered_lookups(),
        }
    }

    pub fn config(&self) -> &CortexConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AdaptiveCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

impl std::fmt::Debug for CortexSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CortexSystem")
            .field("status", &self.status())
            .field("registry", &self.registry)
            .field("router", &self.router)
            .finish()
    }
}
