use outbox::destination::memory::MemoryDestination;
use outbox::error::ErrorKind;
use outbox::store::memory::MemoryStore;
use outbox::test_utils::event::{append_event, base_moment, entity, moment_after};
use outbox::pipeline::Pipeline;
use outbox::test_utils::pipeline::{
    create_pipeline, create_sharded_pipeline, test_pipeline_config, wait_until,
};
use outbox::types::{EventType, IndexOperation, RoutingDescriptor};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn pending_events_are_dispatched_and_removed_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    let moment = base_moment();
    for i in 0..3 {
        append_event(
            &store,
            entity("user", i),
            EventType::Add,
            RoutingDescriptor::unrouted(),
            moment_after(moment, i),
        )
        .await;
    }

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone());
    pipeline.start().await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("change log drained", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    assert_eq!(destination.document_count().await, 3);
    assert!(destination.contains("user", None, "0").await);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.events_fetched, 3);
    assert_eq!(metrics.events_processed, 3);
    assert_eq!(metrics.events_lost, 0);

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn redundant_events_collapse_to_one_operation_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    let moment = base_moment();
    let user = entity("user", "1");
    append_event(
        &store,
        user.clone(),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        moment,
    )
    .await;
    append_event(
        &store,
        user.clone(),
        EventType::AddOrUpdate,
        RoutingDescriptor::unrouted(),
        moment_after(moment, 1),
    )
    .await;
    append_event(
        &store,
        user.clone(),
        EventType::Delete,
        RoutingDescriptor::unrouted(),
        moment_after(moment, 2),
    )
    .await;

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone());
    pipeline.start().await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("change log drained", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    // The whole history of the entity nets out to a single delete.
    assert_eq!(destination.document_count().await, 0);
    let operations = destination.operations().await;
    assert_eq!(operations.len(), 1);
    assert_eq!(
        operations[0],
        IndexOperation::Delete {
            entity: user,
            routes: vec![None],
        }
    );

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_ignores_renumbered_event_ids_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    let moment = base_moment();
    let user = entity("user", "1");
    let delete_id = append_event(
        &store,
        user.clone(),
        EventType::Delete,
        RoutingDescriptor::unrouted(),
        moment,
    )
    .await;
    let recreate_id = append_event(
        &store,
        user.clone(),
        EventType::AddOrUpdate,
        RoutingDescriptor::unrouted(),
        moment_after(moment, 1),
    )
    .await;

    // Give the causally-later recreate the smaller id. Ordering by
    // (moment, id) must still process the delete first.
    store.swap_event_ids(delete_id, recreate_id).await;

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone());
    pipeline.start().await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("change log drained", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    assert!(destination.contains("user", None, "1").await);
    let operations = destination.operations().await;
    assert_eq!(operations.len(), 1);
    assert!(matches!(
        operations[0],
        IndexOperation::AddOrUpdate { .. }
    ));

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn node_without_assigned_shards_never_polls_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    append_event(
        &store,
        entity("user", "1"),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        base_moment(),
    )
    .await;

    let mut pipeline = create_sharded_pipeline(1, store.clone(), destination.clone(), 2, vec![]);
    pipeline.start().await.unwrap();
    pipeline.process_now();

    // Several poll intervals worth of time.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert_eq!(store.pending_count().await, 1);
    assert_eq!(destination.document_count().await, 0);
    assert_eq!(pipeline.metrics().batches, 0);

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_processing_keeps_accepting_writes_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    let mut config = test_pipeline_config(1);
    config.processing.enabled = false;
    let mut pipeline = Pipeline::new(config, store.clone(), destination.clone());

    pipeline.start().await.unwrap();

    append_event(
        &store,
        entity("user", "1"),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        base_moment(),
    )
    .await;

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert_eq!(store.pending_count().await, 1);
    assert_eq!(destination.document_count().await, 0);

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn restarted_pipeline_picks_up_pending_events_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    let moment = base_moment();
    append_event(
        &store,
        entity("user", "1"),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        moment,
    )
    .await;

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone());
    pipeline.start().await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("first event processed", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    pipeline.shutdown_and_wait().await.unwrap();

    // Events appended while no pipeline is running wait in the log.
    append_event(
        &store,
        entity("user", "2"),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        moment_after(moment, 1),
    )
    .await;

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone());
    pipeline.start().await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("second event processed", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    assert!(destination.contains("user", None, "2").await);

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_shard_configuration_fails_at_startup_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    // Shard index out of range.
    let mut pipeline = create_sharded_pipeline(1, store, destination, 2, vec![5]);

    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kinds(), vec![ErrorKind::ConfigError]);
}
