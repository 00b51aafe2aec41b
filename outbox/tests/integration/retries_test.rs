use std::sync::Arc;

use outbox::destination::memory::MemoryDestination;
use outbox::failure::FailureKind;
use outbox::store::memory::MemoryStore;
use outbox::test_utils::destination::FlakyDestination;
use outbox::test_utils::event::{append_event, base_moment, entity, moment_after};
use outbox::test_utils::failure::CollectingFailureHandler;
use outbox::test_utils::pipeline::{create_pipeline, wait_until};
use outbox::types::{EventType, RoutingDescriptor};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried_until_success_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = FlakyDestination::wrap(MemoryDestination::new());
    let failure_handler = CollectingFailureHandler::new();

    let user = entity("user", "1");
    destination.fail_times(user.clone(), 3).await;
    append_event(
        &store,
        user.clone(),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        base_moment(),
    )
    .await;

    // max_retries is 3, so three failures still leave one attempt.
    let mut pipeline = create_pipeline(1, store.clone(), destination.clone())
        .with_failure_handler(Arc::new(failure_handler.clone()));
    pipeline.start().await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("event dispatched after retries", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    assert!(destination.inner().contains("user", None, "1").await);
    assert_eq!(destination.attempts(&user).await, 4);
    assert_eq!(failure_handler.transient_count(), 3);
    assert_eq!(failure_handler.exhausted_count(), 0);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.dispatch_failures, 3);
    assert_eq!(metrics.events_processed, 1);
    assert_eq!(metrics.events_lost, 0);

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_drop_the_event_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = FlakyDestination::wrap(MemoryDestination::new());
    let failure_handler = CollectingFailureHandler::new();

    let user = entity("user", "1");
    destination.fail_always(user.clone()).await;
    append_event(
        &store,
        user.clone(),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        base_moment(),
    )
    .await;

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone())
        .with_failure_handler(Arc::new(failure_handler.clone()));
    pipeline.start().await.unwrap();
    pipeline.process_now();

    // The row is removed even though dispatch never succeeded, so a
    // terminally failing event cannot block its shard.
    let polled_store = store.clone();
    wait_until("event dropped after exhausting retries", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    assert!(!destination.inner().contains("user", None, "1").await);
    assert_eq!(destination.attempts(&user).await, 4);
    assert_eq!(failure_handler.transient_count(), 3);
    assert_eq!(failure_handler.exhausted_count(), 1);

    let reports = failure_handler.reports();
    let exhausted = reports
        .iter()
        .find(|report| report.kind == FailureKind::RetriesExhausted)
        .unwrap();
    assert_eq!(exhausted.entities, vec![user]);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.events_lost, 1);
    assert_eq!(metrics.events_processed, 0);

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_entity_does_not_block_healthy_ones_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = FlakyDestination::wrap(MemoryDestination::new());
    let failure_handler = CollectingFailureHandler::new();

    let moment = base_moment();
    let broken = entity("user", "broken");
    let healthy = entity("user", "healthy");
    destination.fail_always(broken.clone()).await;
    append_event(
        &store,
        broken.clone(),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        moment,
    )
    .await;
    append_event(
        &store,
        healthy.clone(),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        moment_after(moment, 1),
    )
    .await;

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone())
        .with_failure_handler(Arc::new(failure_handler.clone()));
    pipeline.start().await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("both events resolved", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    assert!(destination.inner().contains("user", None, "healthy").await);
    assert!(!destination.inner().contains("user", None, "broken").await);
    assert_eq!(failure_handler.exhausted_count(), 1);

    pipeline.shutdown_and_wait().await.unwrap();
}
