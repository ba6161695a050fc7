//! Transient-failure retry behavior during a pass, and resuming after a
//! failed run.

mod common;

use std::sync::Arc;

use dsr_engine::{run_access_request, EngineError};
use dsr_state::{InMemoryStateStore, RequestStateStore};
use dsr_types::{ActionType, ExecutionLogStatus};

use common::{addr, connectors, fast_config, postgres_graph, seeded_mock, seeds};

#[tokio::test]
async fn transient_failures_within_budget_recover() {
    let mock = seeded_mock();
    let orders = addr("postgres_example", "orders");
    mock.fail_transiently(&orders, 2);
    let store: Arc<dyn RequestStateStore> = Arc::new(InMemoryStateStore::new());

    let results = run_access_request(
        "req-1",
        postgres_graph(),
        connectors(Arc::clone(&mock)),
        seeds(),
        Arc::clone(&store),
        fast_config(),
    )
    .await
    .unwrap()
    .completed()
    .unwrap();
    assert_eq!(results[&orders].len(), 2);

    let statuses: Vec<_> = store
        .get_log("req-1")
        .unwrap()
        .iter()
        .filter(|e| e.collection_name == "orders")
        .map(|e| (e.status, e.attempt))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (ExecutionLogStatus::InProcessing, 1),
            (ExecutionLogStatus::Retrying, 1),
            (ExecutionLogStatus::Retrying, 1),
            (ExecutionLogStatus::Complete, 1),
        ]
    );
}

#[tokio::test]
async fn exhausted_retries_fail_the_run_but_keep_sibling_work() {
    let mock = seeded_mock();
    let orders = addr("postgres_example", "orders");
    // More failures than the budget of 3 re-attempts can absorb.
    mock.fail_transiently(&orders, 10);
    let store: Arc<dyn RequestStateStore> = Arc::new(InMemoryStateStore::new());

    let err = run_access_request(
        "req-1",
        postgres_graph(),
        connectors(Arc::clone(&mock)),
        seeds(),
        Arc::clone(&store),
        fast_config(),
    )
    .await
    .unwrap_err();
    match err {
        EngineError::Connector { collection, source } => {
            assert_eq!(collection, orders);
            assert!(source.is_transient());
        }
        other => panic!("expected connector error, got {other}"),
    }

    // The failed node's log ends in error; completed siblings keep their rows.
    let log = store.get_log("req-1").unwrap();
    let last_orders = log
        .iter()
        .filter(|e| e.collection_name == "orders")
        .next_back()
        .unwrap();
    assert_eq!(last_orders.status, ExecutionLogStatus::Error);
    assert!(store
        .get_rows("req-1", &addr("postgres_example", "customer"))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn rerun_after_failure_retries_only_the_failed_node() {
    let mock = seeded_mock();
    let orders = addr("postgres_example", "orders");
    mock.fail_transiently(&orders, 4);
    let store: Arc<dyn RequestStateStore> = Arc::new(InMemoryStateStore::new());
    let graph = postgres_graph();
    let connector_map = connectors(Arc::clone(&mock));

    // First run burns through the budget (1 try + 3 retries) and fails.
    run_access_request(
        "req-1",
        Arc::clone(&graph),
        Arc::clone(&connector_map),
        seeds(),
        Arc::clone(&store),
        fast_config(),
    )
    .await
    .unwrap_err();

    let results = run_access_request(
        "req-1",
        graph,
        connector_map,
        seeds(),
        Arc::clone(&store),
        fast_config(),
    )
    .await
    .unwrap()
    .completed()
    .unwrap();
    assert_eq!(results[&orders].len(), 2);

    // Customer was recorded during the failed run and never re-fetched.
    assert_eq!(mock.retrieve_call_count(&addr("postgres_example", "customer")), 1);

    // The second visit of orders logs under attempt 2.
    let attempts: Vec<_> = store
        .get_log("req-1")
        .unwrap()
        .iter()
        .filter(|e| {
            e.collection_name == "orders"
                && e.step == ActionType::Access
                && e.status == ExecutionLogStatus::InProcessing
        })
        .map(|e| e.attempt)
        .collect();
    assert_eq!(attempts, vec![1, 2]);
}

#[tokio::test]
async fn permanent_failures_are_surfaced_without_retrying() {
    let mock = seeded_mock();
    let customer = addr("postgres_example", "customer");
    mock.fail_permanently(&customer);
    let store: Arc<dyn RequestStateStore> = Arc::new(InMemoryStateStore::new());

    let err = run_access_request(
        "req-1",
        postgres_graph(),
        connectors(Arc::clone(&mock)),
        seeds(),
        Arc::clone(&store),
        fast_config(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Connector { .. }));

    let statuses: Vec<_> = store
        .get_log("req-1")
        .unwrap()
        .iter()
        .filter(|e| e.collection_name == "customer")
        .map(|e| e.status)
        .collect();
    assert_eq!(
        statuses,
        vec![ExecutionLogStatus::InProcessing, ExecutionLogStatus::Error]
    );
}
