//! Property-Based Tests for Request Routing
//!
//! **Read-through caching**: for any request type and payload, a repeated
//! request is served from the cache with the value the engine produced.
//!
//! **Batch isolation**: for any set of failing items, a multi-request
//! submission reports exactly those items as errors and every other item as
//! a success, in submission order.

use cortex_orchestrator::*;
use cortex_test_utils::{fixtures, generators, MockEngine};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("Failed to create runtime")
}

fn crm_system() -> CortexSystem {
    let mut builder = CortexSystem::builder().config(fixtures::test_config());
    for (kind, engine) in fixtures::crm_engines() {
        builder = builder.engine(kind, engine);
    }
    builder.build().expect("valid config")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_repeated_request_is_cached(
        request_type in generators::arb_request_type(),
        params in generators::arb_params(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let system = crm_system();
            system.initialize().await.unwrap();

            let first = system
                .process_request(request_type.as_str(), params.clone(), RequestOptions::new())
                .await
                .unwrap();
            let second = system
                .process_request(request_type.as_str(), params.clone(), RequestOptions::new())
                .await
                .unwrap();

            prop_assert!(!first.is_cached());
            prop_assert!(second.is_cached());
            prop_assert_eq!(first.value(), second.value());

            let stats = system.cache().stats(request_type.namespace()).unwrap();
            prop_assert_eq!(stats.hits, 1);
            prop_assert_eq!(stats.misses, 1);

            system.shutdown().await;
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_batch_failures_are_isolated(
        size in 0usize..25,
        failing in proptest::collection::btree_set(0u64..25, 0..8),
        chunk in 1usize..8,
        concurrency in 1usize..6,
    ) {
        let rt = runtime();
        rt.block_on(async {
            let failing_ids = failing.clone();
            let engine = Arc::new(MockEngine::new(EngineKind::LeadScoring).with_failure_when(move |p| {
                p["leadId"].as_u64().is_some_and(|id| failing_ids.contains(&id))
            }));
            let system = CortexSystem::builder()
                .config(fixtures::test_config())
                .engine(EngineKind::LeadScoring, engine)
                .build()
                .unwrap();
            system.initialize().await.unwrap();

            let requests = (0..size as u64)
                .map(|i| BatchRequest::new("leadScoring", fixtures::lead(i)))
                .collect();
            let report = system
                .process_batch(
                    requests,
                    BatchOptions::new().with_batch_size(chunk).with_max_concurrency(concurrency),
                )
                .await;

            let expected_errors: BTreeSet<usize> = failing
                .iter()
                .map(|id| *id as usize)
                .filter(|id| *id < size)
                .collect();
            let actual_errors: BTreeSet<usize> = report.errors.iter().map(|e| e.index).collect();
            prop_assert_eq!(&actual_errors, &expected_errors);
            prop_assert_eq!(report.success_count + report.error_count, size);

            let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
            let mut sorted = indices.clone();
            sorted.sort_unstable();
            prop_assert_eq!(indices, sorted);

            if size == 0 {
                prop_assert_eq!(report.success_rate, 0.0);
            } else {
                let expected = report.success_count as f64 / size as f64 * 100.0;
                prop_assert!((report.success_rate - expected).abs() < 1e-9);
            }

            system.shutdown().await;
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_unknown_request_types_are_rejected(name in "[a-z]{3,12}") {
        prop_assume!(name.parse::<RequestType>().is_err());
        let rt = runtime();
        rt.block_on(async {
            let system = crm_system();
            let result = system.process_request(&name, Value::Null, RequestOptions::new()).await;
            let is_unknown_request_type = matches!(
                result,
                Err(CortexError::Router(cortex_core::RouterError::UnknownRequestType { .. }))
            );
            prop_assert!(is_unknown_request_type);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
