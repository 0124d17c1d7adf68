//! End-to-end smoke tests for the Cortex orchestrator

use cortex_core::{BatchConfig, EngineStatus, Severity};
use cortex_orchestrator::*;
use cortex_test_utils::{assertions, fixtures, MockEngine};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn crm_system(config: CortexConfig) -> (CortexSystem, Vec<(EngineKind, Arc<MockEngine>)>) {
    let engines = fixtures::crm_engines();
    let mut builder = CortexSystem::builder().config(config);
    for (kind, engine) in &engines {
        builder = builder.engine(*kind, Arc::clone(engine) as Arc<dyn Engine>);
    }
    (builder.build().expect("valid config"), engines)
}

fn record(system: &CortexSystem, kinds: &[EventKind]) -> Arc<Mutex<Vec<SystemEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let sink = Arc::clone(&log);
        system.on(*kind, move |e: &SystemEvent| sink.lock().unwrap().push(e.clone()));
    }
    log
}

#[tokio::test(start_paused = true)]
async fn smoke_test_full_lifecycle() -> CortexResult<()> {
    let (system, engines) = crm_system(fixtures::test_config());
    let events = record(
        &system,
        &[
            EventKind::SystemInitialized,
            EventKind::HealthCheck,
            EventKind::SystemOptimized,
            EventKind::SystemShutdown,
        ],
    );

    assert_eq!(system.initialize().await?, SystemStatus::Healthy);

    for request_type in RequestType::ALL {
        let outcome = system
            .process_request(request_type.as_str(), json!({"accountId": 7}), RequestOptions::new())
            .await?;
        assert!(!outcome.is_cached());
        assert_eq!(outcome.value().unwrap()["engine"], request_type.route().engine.as_str());
    }

    let summary = system.optimize_system().await;
    assert_eq!(summary.engines_optimized, 4);
    assert!(summary.engine_failures.is_empty());

    system.shutdown().await;
    assert_eq!(system.status(), SystemStatus::Shutdown);
    for (_, engine) in &engines {
        assert_eq!(engine.init_calls(), 1);
        assert_eq!(engine.shutdown_calls(), 1);
    }
    for request_type in RequestType::ALL {
        assert_eq!(system.cache().len(request_type.namespace()), 0);
    }

    let kinds: Vec<EventKind> = events.lock().unwrap().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::HealthCheck,
            EventKind::SystemInitialized,
            EventKind::SystemOptimized,
            EventKind::SystemShutdown,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn smoke_test_requests_after_shutdown_are_rejected() {
    let (system, _) = crm_system(fixtures::test_config());
    system.initialize().await.unwrap();
    system.shutdown().await;

    let result = system
        .process_request("leadScoring", fixtures::lead(1), RequestOptions::new())
        .await;
    assert!(matches!(
        result,
        Err(CortexError::Router(cortex_core::RouterError::ShuttingDown { .. }))
    ));
}

#[tokio::test]
async fn smoke_test_router_isolation() {
    let engine = Arc::new(MockEngine::new(EngineKind::LeadScoring).with_failure_when(|p| p["leadId"] == 5));
    let system = CortexSystem::builder()
        .config(fixtures::test_config())
        .engine(EngineKind::LeadScoring, engine)
        .build()
        .unwrap();
    system.initialize().await.unwrap();

    let requests = (1..=10)
        .map(|i| BatchRequest::new("leadScoring", fixtures::lead(i)))
        .collect();
    let report = system.process_batch(requests, BatchOptions::new()).await;

    assert_eq!(report.success_count, 9);
    assert_eq!(report.error_count, 1);
    assert!((report.success_rate - 90.0).abs() < 1e-9);
    assertions::assert_execution_failed(&Err::<(), _>(report.errors[0].error.clone()));
    system.shutdown().await;
}

#[tokio::test]
async fn smoke_test_errored_engine_does_not_block_others() {
    let (system, engines) = crm_system(fixtures::test_config());
    let predictive = &engines[1].1;
    predictive.set_status(EngineStatus::Error);

    assert_eq!(system.initialize().await.unwrap(), SystemStatus::Degraded);
    assert_eq!(system.system_status().engines["predictive"], EngineStatus::Error);

    let blocked = system
        .process_request("dealPrediction", fixtures::deal(3), RequestOptions::new())
        .await;
    assertions::assert_unavailable(&blocked, EngineKind::Predictive);

    let served = system
        .process_request("sentimentAnalysis", fixtures::message("thanks!"), RequestOptions::new())
        .await;
    assertions::assert_ok(&served);

    // Engine recovers; the next check restores service
    predictive.set_status(EngineStatus::Healthy);
    assert_eq!(system.perform_health_check().await.status, SystemStatus::Healthy);
    let recovered = system
        .process_request("dealPrediction", fixtures::deal(3), RequestOptions::new())
        .await;
    assertions::assert_ok(&recovered);
    system.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn smoke_test_shutdown_drains_queued_batches() {
    let mut config = fixtures::test_config();
    config
        .batching
        .insert("leadScoring".to_string(), BatchConfig::new(50, Duration::from_secs(60)));
    let (system, engines) = crm_system(config);
    let processed = record(&system, &[EventKind::BatchProcessed, EventKind::RequestSuccess]);
    system.initialize().await.unwrap();

    for i in 0..3 {
        let outcome = system
            .process_request("leadScoring", fixtures::lead(i), RequestOptions::new().batched())
            .await
            .unwrap();
        assert!(outcome.is_queued());
    }
    assert_eq!(engines[0].1.batch_calls(), 0);

    system.shutdown().await;

    assert_eq!(engines[0].1.batch_calls(), 1);
    let events = processed.lock().unwrap();
    let successes = events
        .iter()
        .filter(|e| e.kind() == EventKind::RequestSuccess)
        .count();
    assert_eq!(successes, 3);
    assert!(events.iter().any(|e| matches!(
        e,
        SystemEvent::BatchProcessed { size: 3, succeeded: 3, failed: 0, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn smoke_test_periodic_optimization_expires_entries() {
    let mut config = fixtures::test_config();
    config.namespaces.insert(
        "nextBestAction".to_string(),
        cortex_core::NamespaceConfig::new(10, Duration::from_secs(2)),
    );
    let (system, _) = crm_system(config);
    let optimized = record(&system, &[EventKind::SystemOptimized]);
    system.initialize().await.unwrap();

    system
        .process_request("nextBestAction", json!({"contactId": 1}), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(system.cache().len("nextBestAction"), 1);

    // The optimization task fires every 5s
    tokio::time::sleep(Duration::from_millis(5_500)).await;

    assert_eq!(system.cache().len("nextBestAction"), 0);
    match &optimized.lock().unwrap()[0] {
        SystemEvent::SystemOptimized { expired, .. } => assert_eq!(*expired, 1),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(system.metrics().periodic.optimization_cycles >= 1);
    system.shutdown().await;
}

#[tokio::test]
async fn smoke_test_failing_handler_does_not_stop_delivery() {
    struct Rejecting;
    impl cortex_core::EventHandler for Rejecting {
        fn handle(&self, _event: &SystemEvent) -> CortexResult<()> {
            Err(CortexError::execution("observer", "handle", "rejected"))
        }
    }

    let (system, _) = crm_system(fixtures::test_config());
    system.on(EventKind::RequestSuccess, Rejecting);
    let seen = record(&system, &[EventKind::RequestSuccess]);
    system.initialize().await.unwrap();

    system
        .process_request("emailGeneration", json!({"template": "follow-up"}), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
    system.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn smoke_test_initialization_timeout_records_error() {
    let slow = Arc::new(MockEngine::new(EngineKind::Recommendation).with_init_delay(Duration::from_secs(30)));
    let system = CortexSystem::builder()
        .config(fixtures::test_config())
        .engine(EngineKind::Recommendation, slow)
        .build()
        .unwrap();

    let err = system.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        CortexError::Lifecycle(cortex_core::LifecycleError::InitializationTimeout { .. })
    ));
    let health = system.system_status();
    assert_eq!(health.status, SystemStatus::Error);
    assert_eq!(health.errors.latest().unwrap().severity, Severity::Critical);

    let blocked = system
        .process_request("nextBestAction", json!({}), RequestOptions::new())
        .await;
    assertions::assert_unavailable(&blocked, EngineKind::Recommendation);
}
