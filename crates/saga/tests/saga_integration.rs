//! Integration tests for the order saga.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use domain::Aggregate;
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreError, InMemoryEventStore, Snapshot,
    Version,
};
use order_saga::{
    CoordinatorOptions, InMemoryParticipant, LegKind, LegStatus, NotifyPolicy,
    ParticipantCall, ProductInfo, SagaCoordinator, SagaError, SagaStatus,
};

type TestCoordinator = SagaCoordinator<InMemoryEventStore, InMemoryParticipant, InMemoryParticipant>;

struct TestHarness {
    coordinator: TestCoordinator,
    store: InMemoryEventStore,
    shipment: InMemoryParticipant,
    invoice: InMemoryParticipant,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_options(CoordinatorOptions::default())
    }

    fn with_options(options: CoordinatorOptions) -> Self {
        let store = InMemoryEventStore::new();
        let shipment = InMemoryParticipant::new();
        let invoice = InMemoryParticipant::new();

        let coordinator =
            SagaCoordinator::with_options(store.clone(), shipment.clone(), invoice.clone(), options);

        Self {
            coordinator,
            store,
            shipment,
            invoice,
        }
    }

    async fn start(&self, order_id: &str) -> AggregateId {
        let saga_id = AggregateId::from(order_id);
        self.coordinator
            .start(saga_id.clone(), product())
            .await
            .unwrap();
        saga_id
    }

    /// Starts a saga and reports both legs successful.
    async fn start_and_succeed(&self, order_id: &str) -> AggregateId {
        let saga_id = self.start(order_id).await;
        self.coordinator
            .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string())
            .await
            .unwrap();
        self.coordinator
            .report_leg_success(LegKind::Invoice, &saga_id, "INV-1".to_string())
            .await
            .unwrap();
        saga_id
    }

    async fn saga(&self, saga_id: &AggregateId) -> order_saga::OrderSaga {
        self.coordinator.get_saga(saga_id).await.unwrap().unwrap()
    }
}

fn product() -> ProductInfo {
    ProductInfo(serde_json::json!({"sku": "X", "name": "productX", "qty": 1}))
}

#[tokio::test]
async fn test_start_requests_both_legs() {
    let h = TestHarness::new();

    let saga_id = h.start("O1").await;

    let saga = h.saga(&saga_id).await;
    assert_eq!(saga.id(), Some(&saga_id));
    assert_eq!(saga.status(), SagaStatus::Started);
    assert_eq!(saga.product(), Some(&product()));
    assert_eq!(saga.shipment().status, LegStatus::Requested);
    assert_eq!(saga.invoice().status, LegStatus::Requested);
    assert!(saga.started_at().is_some());

    for participant in [&h.shipment, &h.invoice] {
        assert_eq!(
            participant.calls(),
            vec![ParticipantCall::Request {
                saga_id: saga_id.clone(),
                product: product(),
            }]
        );
    }
}

#[tokio::test]
async fn test_both_successes_then_complete() {
    let h = TestHarness::new();
    let saga_id = h.start("O1").await;

    let receipt = h
        .coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string())
        .await
        .unwrap();
    assert_eq!(receipt.status, SagaStatus::InProgress);
    assert!(receipt.notifications.is_empty());

    let receipt = h
        .coordinator
        .report_leg_success(LegKind::Invoice, &saga_id, "INV-1".to_string())
        .await
        .unwrap();
    assert_eq!(receipt.status, SagaStatus::Completing);

    let receipt = h.coordinator.complete(&saga_id).await.unwrap();
    assert_eq!(receipt.status, SagaStatus::Completed);

    let saga = h.saga(&saga_id).await;
    assert_eq!(saga.status(), SagaStatus::Completed);
    assert_eq!(saga.shipment().status, LegStatus::Succeeded);
    assert_eq!(saga.invoice().status, LegStatus::Succeeded);
    assert_eq!(saga.shipment().external_id.as_deref(), Some("SHIP-1"));
    assert_eq!(saga.invoice().external_id.as_deref(), Some("INV-1"));
    assert!(saga.finished_at().is_some());
    assert!(h.shipment.compensated_ids().is_empty());
    assert!(h.invoice.compensated_ids().is_empty());
}

#[tokio::test]
async fn test_failure_before_any_success_compensates_without_calls() {
    let h = TestHarness::new();
    let saga_id = h.start("O1").await;

    let receipt = h
        .coordinator
        .report_leg_failure(LegKind::Shipment, &saga_id, "out of stock".to_string())
        .await
        .unwrap();

    assert_eq!(receipt.status, SagaStatus::Compensated);
    assert!(receipt.notifications.is_empty());

    let saga = h.saga(&saga_id).await;
    assert_eq!(saga.shipment().status, LegStatus::Compensated);
    assert_eq!(saga.invoice().status, LegStatus::Compensated);
    assert_eq!(saga.failure_cause(), Some("out of stock"));
    assert!(h.shipment.compensated_ids().is_empty());
    assert!(h.invoice.compensated_ids().is_empty());
}

#[tokio::test]
async fn test_compensation_after_both_successes() {
    let h = TestHarness::new();
    let saga_id = h.start_and_succeed("O1").await;

    let receipt = h
        .coordinator
        .init_compensation(&saga_id, "fraud detected".to_string())
        .await
        .unwrap();
    assert_eq!(receipt.status, SagaStatus::Compensating);
    assert!(receipt.notifications.all_delivered());
    assert_eq!(h.shipment.compensated_ids(), vec!["SHIP-1".to_string()]);
    assert_eq!(h.invoice.compensated_ids(), vec!["INV-1".to_string()]);
    assert!(matches!(
        h.invoice.calls().last(),
        Some(ParticipantCall::Compensate { cause, .. }) if cause == "fraud detected"
    ));

    let receipt = h
        .coordinator
        .notify_leg_compensated(LegKind::Shipment, &saga_id)
        .await
        .unwrap();
    assert_eq!(receipt.status, SagaStatus::Compensating);

    let receipt = h
        .coordinator
        .notify_leg_compensated(LegKind::Invoice, &saga_id)
        .await
        .unwrap();
    assert_eq!(receipt.status, SagaStatus::Compensated);

    let saga = h.saga(&saga_id).await;
    assert!(saga.all_legs_compensated());
    assert!(saga.finished_at().is_some());
}

#[tokio::test]
async fn test_late_failure_after_compensation_is_ignored() {
    let h = TestHarness::new();
    let saga_id = h.start("O1").await;
    h.coordinator
        .report_leg_failure(LegKind::Shipment, &saga_id, "out of stock".to_string())
        .await
        .unwrap();
    let before = h.saga(&saga_id).await;

    let receipt = h
        .coordinator
        .report_leg_failure(LegKind::Shipment, &saga_id, "out of stock".to_string())
        .await
        .unwrap();

    assert_eq!(receipt.version, before.version());
    assert_eq!(h.saga(&saga_id).await, before);
}

#[tokio::test]
async fn test_partial_success_compensates_only_the_created_resource() {
    let h = TestHarness::new();
    let saga_id = h.start("O1").await;
    h.coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string())
        .await
        .unwrap();

    let receipt = h
        .coordinator
        .report_leg_failure(LegKind::Invoice, &saga_id, "card declined".to_string())
        .await
        .unwrap();

    assert_eq!(receipt.status, SagaStatus::Compensating);
    assert_eq!(h.shipment.compensated_ids(), vec!["SHIP-1".to_string()]);
    assert!(h.invoice.compensated_ids().is_empty());

    let saga = h.saga(&saga_id).await;
    assert_eq!(saga.shipment().status, LegStatus::Compensating);
    assert_eq!(saga.invoice().status, LegStatus::Compensated);
    assert!(saga.invoice().external_id.is_none());

    let receipt = h
        .coordinator
        .notify_leg_compensated(LegKind::Shipment, &saga_id)
        .await
        .unwrap();
    assert_eq!(receipt.status, SagaStatus::Compensated);
}

#[tokio::test]
async fn test_duplicate_success_leaves_state_unchanged() {
    let h = TestHarness::new();
    let saga_id = h.start("O1").await;
    h.coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string())
        .await
        .unwrap();
    let before = h.saga(&saga_id).await;

    let receipt = h
        .coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-2".to_string())
        .await
        .unwrap();

    assert_eq!(receipt.version, before.version());
    let after = h.saga(&saga_id).await;
    assert_eq!(after, before);
    assert_eq!(after.shipment().external_id.as_deref(), Some("SHIP-1"));
}

#[tokio::test]
async fn test_complete_requires_both_successes() {
    let h = TestHarness::new();
    let saga_id = h.start("O1").await;
    h.coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string())
        .await
        .unwrap();

    let err = h.coordinator.complete(&saga_id).await.unwrap_err();
    assert!(matches!(
        err,
        SagaError::InvalidTransition {
            status: SagaStatus::InProgress,
            ..
        }
    ));
}

#[tokio::test]
async fn test_no_way_out_of_completed() {
    let h = TestHarness::new();
    let saga_id = h.start_and_succeed("O1").await;
    h.coordinator.complete(&saga_id).await.unwrap();

    let err = h
        .coordinator
        .init_compensation(&saga_id, "too late".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::InvalidTransition { .. }));

    let receipt = h
        .coordinator
        .report_leg_failure(LegKind::Invoice, &saga_id, "late".to_string())
        .await
        .unwrap();
    assert_eq!(receipt.status, SagaStatus::Completed);
    assert!(h.invoice.compensated_ids().is_empty());
}

#[tokio::test]
async fn test_compensated_leg_rejects_second_compensated_notice() {
    let h = TestHarness::new();
    let saga_id = h.start("O1").await;
    h.coordinator
        .report_leg_failure(LegKind::Shipment, &saga_id, "out of stock".to_string())
        .await
        .unwrap();

    let err = h
        .coordinator
        .notify_leg_compensated(LegKind::Invoice, &saga_id)
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::InvalidLegTransition { .. }));
}

#[tokio::test]
async fn test_success_after_compensation_does_not_change_state() {
    let h = TestHarness::new();
    let saga_id = h.start("O1").await;
    h.coordinator
        .init_compensation(&saga_id, "customer cancelled".to_string())
        .await
        .unwrap();
    let before = h.saga(&saga_id).await;
    assert_eq!(before.status(), SagaStatus::Compensated);

    h.coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-9".to_string())
        .await
        .unwrap();

    assert_eq!(h.saga(&saga_id).await, before);
}

#[tokio::test]
async fn test_versions_strictly_increase() {
    let h = TestHarness::new();
    let saga_id = AggregateId::from("O1");

    let started = h.coordinator.start(saga_id.clone(), product()).await.unwrap();
    let first = h
        .coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string())
        .await
        .unwrap();
    let second = h
        .coordinator
        .report_leg_success(LegKind::Invoice, &saga_id, "INV-1".to_string())
        .await
        .unwrap();
    let completed = h.coordinator.complete(&saga_id).await.unwrap();

    assert!(started.version > Version::initial());
    assert!(first.version > started.version);
    assert!(second.version > first.version);
    assert!(completed.version > second.version);

    let events = h.coordinator.saga_events(&saga_id).await.unwrap();
    assert_eq!(events.last().map(|e| e.version), Some(completed.version));
    assert!(events.windows(2).all(|w| w[0].version < w[1].version));
}

#[tokio::test]
async fn test_event_log_records_the_saga_history() {
    let h = TestHarness::new();
    let saga_id = h.start_and_succeed("O1").await;
    h.coordinator.complete(&saga_id).await.unwrap();

    let events = h.store.get_events_for_aggregate(&saga_id).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();

    assert_eq!(
        types,
        vec![
            "SagaStarted",
            "LegRequested",
            "LegRequested",
            "LegSucceeded",
            "LegSucceeded",
            "SagaCompleted",
        ]
    );
    assert!(events.iter().all(|e| e.aggregate_type == "OrderSaga"));
}

#[tokio::test]
async fn test_saga_reloads_identically_from_store() {
    let h = TestHarness::new();
    let saga_id = h.start_and_succeed("O1").await;

    let first = h.saga(&saga_id).await;

    let other = SagaCoordinator::new(
        h.store.clone(),
        InMemoryParticipant::new(),
        InMemoryParticipant::new(),
    );
    let second = other.get_saga(&saga_id).await.unwrap().unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_notification_failure_keeps_committed_transition() {
    let h = TestHarness::new();
    let saga_id = h.start_and_succeed("O1").await;
    h.invoice.set_failing(true);

    let receipt = h
        .coordinator
        .init_compensation(&saga_id, "fraud detected".to_string())
        .await
        .unwrap();

    assert_eq!(receipt.notifications.failures().count(), 1);
    assert!(receipt.notifications.ensure_delivered().is_err());

    let saga = h.saga(&saga_id).await;
    assert_eq!(saga.status(), SagaStatus::Compensating);
    assert_eq!(saga.invoice().status, LegStatus::Compensating);
    assert_eq!(h.invoice.compensated_ids(), vec!["INV-1".to_string()]);
}

#[tokio::test]
async fn test_concurrent_sagas_are_independent() {
    let h = TestHarness::new();

    let ids: Vec<AggregateId> = (0..10).map(|i| AggregateId::from(format!("O{i}"))).collect();
    let starts = ids
        .iter()
        .map(|id| h.coordinator.start(id.clone(), product()));
    for result in futures_util::future::join_all(starts).await {
        result.unwrap();
    }

    for id in &ids {
        assert_eq!(h.saga(id).await.status(), SagaStatus::Started);
    }
    assert_eq!(h.shipment.calls().len(), ids.len());
    assert_eq!(h.invoice.calls().len(), ids.len());
}

#[tokio::test]
async fn test_concurrent_callbacks_converge() {
    let h = TestHarness::with_options(CoordinatorOptions {
        conflict_retries: 10,
        ..CoordinatorOptions::default()
    });
    let saga_id = h.start("O1").await;

    let (shipment, invoice, compensation) = tokio::join!(
        h.coordinator
            .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string()),
        h.coordinator
            .report_leg_success(LegKind::Invoice, &saga_id, "INV-1".to_string()),
        h.coordinator
            .init_compensation(&saga_id, "customer cancelled".to_string()),
    );
    shipment.unwrap();
    invoice.unwrap();
    compensation.unwrap();

    let saga = h.saga(&saga_id).await;
    assert!(matches!(
        saga.status(),
        SagaStatus::Compensating | SagaStatus::Compensated
    ));
    // Every leg that succeeded before compensation is undone.
    for leg in LegKind::ALL {
        if let Some(external_id) = &saga.leg(leg).external_id {
            let participant = match leg {
                LegKind::Shipment => &h.shipment,
                LegKind::Invoice => &h.invoice,
            };
            assert!(participant.compensated_ids().contains(external_id));
        }
    }
}

#[tokio::test]
async fn test_notify_timeout_applies_to_participant_calls() {
    let h = TestHarness::with_options(CoordinatorOptions {
        notify: NotifyPolicy {
            timeout: std::time::Duration::from_millis(20),
            ..NotifyPolicy::default()
        },
        ..CoordinatorOptions::default()
    });
    h.shipment
        .set_delay(Some(std::time::Duration::from_millis(500)));

    let receipt = h
        .coordinator
        .start(AggregateId::from("O1"), product())
        .await
        .unwrap();

    assert_eq!(receipt.notifications.acknowledged_requests(), vec![LegKind::Invoice]);
    let saga = h.saga(&AggregateId::from("O1")).await;
    assert_eq!(saga.shipment().status, LegStatus::NotRequested);
    assert_eq!(saga.invoice().status, LegStatus::Requested);
}

/// Store that rejects the next `n` appends as if another writer got there
/// first, then behaves like the wrapped in-memory store.
#[derive(Clone, Default)]
struct ContendedStore {
    inner: InMemoryEventStore,
    pending_conflicts: Arc<AtomicUsize>,
}

impl ContendedStore {
    fn lose_next_appends(&self, n: usize) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventStore for ContendedStore {
    async fn append(
        &self,
        events: Vec<EventEnvelope>,
        options: AppendOptions,
    ) -> event_store::Result<Version> {
        if self.take_conflict() {
            let expected = options.expected_version.unwrap_or_else(Version::initial);
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: events[0].aggregate_id.clone(),
                expected,
                actual: expected.next(),
            });
        }
        self.inner.append(events, options).await
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        self.inner.get_events_for_aggregate(aggregate_id).await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        self.inner
            .get_events_for_aggregate_from_version(aggregate_id, from_version)
            .await
    }

    async fn get_aggregate_version(
        &self,
        aggregate_id: &AggregateId,
    ) -> event_store::Result<Option<Version>> {
        self.inner.get_aggregate_version(aggregate_id).await
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> event_store::Result<()> {
        self.inner.save_snapshot(snapshot).await
    }

    async fn get_snapshot(
        &self,
        aggregate_id: &AggregateId,
    ) -> event_store::Result<Option<Snapshot>> {
        self.inner.get_snapshot(aggregate_id).await
    }
}

fn contended_coordinator(
    conflict_retries: usize,
) -> (
    SagaCoordinator<ContendedStore, InMemoryParticipant, InMemoryParticipant>,
    ContendedStore,
) {
    let store = ContendedStore::default();
    let coordinator = SagaCoordinator::with_options(
        store.clone(),
        InMemoryParticipant::new(),
        InMemoryParticipant::new(),
        CoordinatorOptions {
            conflict_retries,
            conflict_min_delay: Duration::from_millis(1),
            conflict_max_delay: Duration::from_millis(5),
            ..CoordinatorOptions::default()
        },
    );
    (coordinator, store)
}

#[tokio::test]
async fn test_lost_races_within_retry_budget_are_absorbed() {
    let (coordinator, store) = contended_coordinator(2);
    let saga_id = AggregateId::from("O1");
    coordinator.start(saga_id.clone(), product()).await.unwrap();

    store.lose_next_appends(2);
    let receipt = coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string())
        .await
        .unwrap();

    assert_eq!(receipt.status, SagaStatus::InProgress);
    assert_eq!(store.pending_conflicts.load(Ordering::SeqCst), 0);
    let saga = coordinator.get_saga(&saga_id).await.unwrap().unwrap();
    assert_eq!(saga.shipment().status, LegStatus::Succeeded);
    assert_eq!(saga.shipment().external_id.as_deref(), Some("SHIP-1"));
}

#[tokio::test]
async fn test_lost_races_beyond_retry_budget_surface_as_conflict() {
    let (coordinator, store) = contended_coordinator(2);
    let saga_id = AggregateId::from("O1");
    coordinator.start(saga_id.clone(), product()).await.unwrap();
    let before = coordinator.get_saga(&saga_id).await.unwrap().unwrap();

    store.lose_next_appends(3);
    let result = coordinator
        .report_leg_success(LegKind::Shipment, &saga_id, "SHIP-1".to_string())
        .await;

    assert!(matches!(
        result,
        Err(SagaError::ConcurrencyConflict { ref saga_id, .. }) if saga_id.as_str() == "O1"
    ));
    assert_eq!(store.pending_conflicts.load(Ordering::SeqCst), 0);
    let after = coordinator.get_saga(&saga_id).await.unwrap().unwrap();
    assert_eq!(after.status(), SagaStatus::Started);
    assert_eq!(after.version(), before.version());
    assert_eq!(after.shipment().status, LegStatus::Requested);
}
