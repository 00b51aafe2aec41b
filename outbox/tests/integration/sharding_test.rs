use outbox::destination::memory::MemoryDestination;
use outbox::store::memory::MemoryStore;
use outbox::test_utils::event::{append_event, base_moment, entity, moment_after};
use outbox::test_utils::pipeline::{create_sharded_pipeline, wait_until};
use outbox::types::{EventType, RoutingDescriptor};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn disjoint_nodes_process_every_event_exactly_once_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    let moment = base_moment();
    for i in 0..100 {
        append_event(
            &store,
            entity("user", i),
            EventType::Add,
            RoutingDescriptor::unrouted(),
            moment_after(moment, i),
        )
        .await;
    }

    // Two nodes sharing one store and one index, with disjoint shards.
    let mut first =
        create_sharded_pipeline(1, store.clone(), destination.clone(), 2, vec![0]);
    let mut second =
        create_sharded_pipeline(2, store.clone(), destination.clone(), 2, vec![1]);
    first.start().await.unwrap();
    second.start().await.unwrap();
    first.process_now();
    second.process_now();

    let polled_store = store.clone();
    wait_until("change log drained by both nodes", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    // Every event landed exactly once: no duplicates, no gaps.
    assert_eq!(destination.document_count().await, 100);
    assert_eq!(destination.operations().await.len(), 100);

    let first_metrics = first.metrics();
    let second_metrics = second.metrics();
    assert_eq!(
        first_metrics.events_processed + second_metrics.events_processed,
        100
    );
    assert!(first_metrics.events_processed > 0);
    assert!(second_metrics.events_processed > 0);

    first.shutdown_and_wait().await.unwrap();
    second.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn shard_load_follows_assignment_share_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    let moment = base_moment();
    for i in 0..1000 {
        append_event(
            &store,
            entity("user", i),
            EventType::Add,
            RoutingDescriptor::unrouted(),
            moment_after(moment, i),
        )
        .await;
    }

    let mut small =
        create_sharded_pipeline(1, store.clone(), destination.clone(), 4, vec![0]);
    let mut large =
        create_sharded_pipeline(2, store.clone(), destination.clone(), 4, vec![1, 2, 3]);
    small.start().await.unwrap();
    large.start().await.unwrap();
    small.process_now();
    large.process_now();

    let polled_store = store.clone();
    wait_until("change log drained by both nodes", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    let small_share = small.metrics().events_processed;
    let large_share = large.metrics().events_processed;
    assert_eq!(small_share + large_share, 1000);
    // One shard out of four should carry roughly a quarter of the load.
    assert!(
        (188..=312).contains(&small_share),
        "single-shard node processed {small_share} events"
    );

    small.shutdown_and_wait().await.unwrap();
    large.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn events_of_one_entity_stay_on_one_shard_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    // Many events for the same entity, spread over time.
    let moment = base_moment();
    let user = entity("user", "42");
    append_event(
        &store,
        user.clone(),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        moment,
    )
    .await;
    for i in 1..10 {
        append_event(
            &store,
            user.clone(),
            EventType::AddOrUpdate,
            RoutingDescriptor::unrouted(),
            moment_after(moment, i),
        )
        .await;
    }

    let mut first =
        create_sharded_pipeline(1, store.clone(), destination.clone(), 2, vec![0]);
    let mut second =
        create_sharded_pipeline(2, store.clone(), destination.clone(), 2, vec![1]);
    first.start().await.unwrap();
    second.start().await.unwrap();
    first.process_now();
    second.process_now();

    let polled_store = store.clone();
    wait_until("change log drained", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    // All events of the entity hash to the same shard, so exactly one node
    // saw them, and it merged them into a single operation.
    assert_eq!(destination.operations().await.len(), 1);
    let first_metrics = first.metrics();
    let second_metrics = second.metrics();
    assert_eq!(
        first_metrics.events_processed + second_metrics.events_processed,
        10
    );
    assert!(first_metrics.events_processed == 0 || second_metrics.events_processed == 0);

    first.shutdown_and_wait().await.unwrap();
    second.shutdown_and_wait().await.unwrap();
}
