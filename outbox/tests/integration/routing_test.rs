use outbox::destination::memory::MemoryDestination;
use outbox::store::memory::MemoryStore;
use outbox::test_utils::event::{append_event, base_moment, entity, moment_after};
use outbox::test_utils::pipeline::{create_pipeline, wait_until};
use outbox::types::{EventType, IndexOperation, RoutingDescriptor};
use outbox::writer::ChangePlan;
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn route_migration_in_one_batch_skips_intermediate_routes_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();
    let user = entity("user", "1");

    // Three transactions move the entity across routes before any
    // processing happens.
    let mut plan = ChangePlan::new();
    plan.add(user.clone(), RoutingDescriptor::route("FIRST"));
    plan.commit(&store).await.unwrap();

    let mut plan = ChangePlan::new();
    plan.update(
        user.clone(),
        RoutingDescriptor::route("SECOND").with_previous_route("FIRST"),
    );
    plan.commit(&store).await.unwrap();

    let mut plan = ChangePlan::new();
    plan.update(
        user.clone(),
        RoutingDescriptor::route("THIRD")
            .with_previous_route("FIRST")
            .with_previous_route("SECOND"),
    );
    plan.commit(&store).await.unwrap();

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone());
    pipeline.start().await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("change log drained", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    // The document only ever materializes at its final route.
    assert!(destination.contains("user", Some("THIRD"), "1").await);
    assert!(!destination.contains("user", Some("FIRST"), "1").await);
    assert!(!destination.contains("user", Some("SECOND"), "1").await);

    let operations = destination.operations().await;
    assert_eq!(operations.len(), 1);
    assert_eq!(
        operations[0],
        IndexOperation::AddOrUpdate {
            entity: user,
            route: Some("THIRD".to_string()),
            stale_routes: vec!["FIRST".to_string(), "SECOND".to_string()],
        }
    );

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn route_migration_across_batches_retires_old_routes_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();
    let user = entity("user", "1");

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone());
    pipeline.start().await.unwrap();

    let drain = |store: MemoryStore| async move {
        wait_until("change log drained", || {
            let store = store.clone();
            async move { store.pending_count().await == 0 }
        })
        .await;
    };

    let mut plan = ChangePlan::new();
    plan.add(user.clone(), RoutingDescriptor::route("FIRST"));
    plan.commit(&store).await.unwrap();
    pipeline.process_now();
    drain(store.clone()).await;

    assert!(destination.contains("user", Some("FIRST"), "1").await);

    let mut plan = ChangePlan::new();
    plan.update(
        user.clone(),
        RoutingDescriptor::route("SECOND").with_previous_route("FIRST"),
    );
    plan.commit(&store).await.unwrap();
    pipeline.process_now();
    drain(store.clone()).await;

    // The move both indexes at the new route and removes the old copy.
    assert!(destination.contains("user", Some("SECOND"), "1").await);
    assert!(!destination.contains("user", Some("FIRST"), "1").await);
    assert_eq!(destination.document_count().await, 1);

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_document_from_all_routes_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();
    let user = entity("user", "1");

    let mut pipeline = create_pipeline(1, store.clone(), destination.clone());
    pipeline.start().await.unwrap();

    let mut plan = ChangePlan::new();
    plan.add(user.clone(), RoutingDescriptor::route("FIRST"));
    plan.commit(&store).await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("add processed", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    // Delete while a routing move is in flight in the same transaction.
    let mut plan = ChangePlan::new();
    plan.update(
        user.clone(),
        RoutingDescriptor::route("SECOND").with_previous_route("FIRST"),
    );
    plan.delete(
        user.clone(),
        RoutingDescriptor::route("SECOND").with_previous_route("FIRST"),
    );
    plan.commit(&store).await.unwrap();
    pipeline.process_now();

    let polled_store = store.clone();
    wait_until("delete processed", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    assert_eq!(destination.document_count().await, 0);

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_routing_payload_does_not_stall_the_queue_test() {
    init_test_tracing();

    let store = MemoryStore::new();
    let destination = MemoryDestination::new();

    let moment = base_moment();
    let corrupt_id = append_event(
        &store,
        entity("user", "1"),
        EventType::Add,
        RoutingDescriptor::unrouted(),
        moment,
    )
    .await;
    store.corrupt_payload(corrupt_id).await;
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
    wait_until("change log drained", || {
        let store = polled_store.clone();
        async move { store.pending_count().await == 0 }
    })
    .await;

    // The corrupt event degrades to default routing instead of poisoning
    // the batch.
    assert!(destination.contains("user", None, "1").await);
    assert!(destination.contains("user", None, "2").await);

    pipeline.shutdown_and_wait().await.unwrap();
}
