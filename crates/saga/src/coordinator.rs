//! Saga coordinator: the public operations of the order saga.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use common::AggregateId;
use domain::{AggregateRepository, CommandResult};
use event_store::{EventEnvelope, EventStore, Version};

use crate::aggregate::OrderSaga;
use crate::error::{Result, SagaError};
use crate::events::{ProductInfo, SagaEvent};
use crate::intent::SagaIntent;
use crate::leg::LegKind;
use crate::notifier::{DispatchReport, NotifyPolicy, ParticipantNotifier};
use crate::participants::ParticipantClient;
use crate::state::{LegStatus, SagaStatus};
use crate::transitions::SagaCommand;

/// Tuning for a [`SagaCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Times a command is re-read and re-applied after losing a
    /// concurrency race.
    pub conflict_retries: usize,
    pub conflict_min_delay: Duration,
    pub conflict_max_delay: Duration,
    pub notify: NotifyPolicy,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            conflict_retries: 5,
            conflict_min_delay: Duration::from_millis(10),
            conflict_max_delay: Duration::from_millis(200),
            notify: NotifyPolicy::default(),
        }
    }
}

/// Outcome of a saga operation.
#[derive(Debug)]
pub struct SagaReceipt {
    pub saga_id: AggregateId,
    /// Version of the saga after the operation.
    pub version: Version,
    pub status: SagaStatus,
    /// Participant calls made after the state change was committed.
    pub notifications: DispatchReport,
}

/// Drives order sagas.
///
/// Every operation follows the same sequence: the command is run against the
/// stored saga and its events are committed with the version that was read;
/// the notifications implied by the committed events are then sent to the
/// participants. Participants are never called for a change that was not
/// committed, and a failed call never rolls the change back.
pub struct SagaCoordinator<S, Sh, Inv>
where
    S: EventStore,
    Sh: ParticipantClient,
    Inv: ParticipantClient,
{
    repository: AggregateRepository<S, OrderSaga>,
    notifier: ParticipantNotifier<Sh, Inv>,
    options: CoordinatorOptions,
}

impl<S, Sh, Inv> SagaCoordinator<S, Sh, Inv>
where
    S: EventStore,
    Sh: ParticipantClient,
    Inv: ParticipantClient,
{
    pub fn new(store: S, shipment: Sh, invoice: Inv) -> Self {
        Self::with_options(store, shipment, invoice, CoordinatorOptions::default())
    }

    pub fn with_options(store: S, shipment: Sh, invoice: Inv, options: CoordinatorOptions) -> Self {
        Self {
            repository: AggregateRepository::new(store),
            notifier: ParticipantNotifier::new(shipment, invoice, options.notify),
            options,
        }
    }

    pub fn store(&self) -> &S {
        self.repository.store()
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Starts the saga of an order and asks both participants to act.
    ///
    /// The order id becomes the saga id. Requests the participants
    /// acknowledge are recorded as `Requested`.
    #[tracing::instrument(skip(self, order_id, product), fields(saga_id = %order_id))]
    pub async fn start(&self, order_id: AggregateId, product: ProductInfo) -> Result<SagaReceipt> {
        let command = SagaCommand::Start { product };
        let name = command.name();
        let result = self
            .repository
            .create(&order_id, |saga| saga.handle(&order_id, command))
            .await?;
        self.record(&order_id, name, &result).await;

        let mut receipt = self.notify(&order_id, result).await;

        for leg in receipt.notifications.acknowledged_requests() {
            match self
                .apply(&order_id, SagaCommand::MarkLegRequested { leg })
                .await
            {
                Ok(result) => {
                    receipt.version = result.new_version;
                    receipt.status = result.aggregate.status();
                }
                Err(error) => {
                    tracing::warn!(saga_id = %order_id, %leg, %error, "failed to record leg request");
                }
            }
        }

        Ok(receipt)
    }

    /// Records the success of a leg along with the participant's resource id.
    #[tracing::instrument(skip(self, saga_id), fields(%saga_id))]
    pub async fn report_leg_success(
        &self,
        leg: LegKind,
        saga_id: &AggregateId,
        external_id: String,
    ) -> Result<SagaReceipt> {
        let command = SagaCommand::ProcessLegSuccess {
            leg,
            external_id: external_id.clone(),
        };
        let result = self.apply(saga_id, command).await?;

        let status = result.aggregate.leg(leg).status;
        if result.events.is_empty()
            && matches!(status, LegStatus::Compensating | LegStatus::Compensated)
        {
            // The participant holds a resource the saga will not undo.
            tracing::warn!(
                %saga_id,
                %leg,
                %external_id,
                "success reported after compensation; resource left in place"
            );
        }

        Ok(self.notify(saga_id, result).await)
    }

    /// Records the failure of a leg and compensates the saga.
    #[tracing::instrument(skip(self, saga_id), fields(%saga_id))]
    pub async fn report_leg_failure(
        &self,
        leg: LegKind,
        saga_id: &AggregateId,
        cause: String,
    ) -> Result<SagaReceipt> {
        self.run(saga_id, SagaCommand::ProcessLegFailure { leg, cause })
            .await
    }

    /// Completes a saga whose legs both succeeded.
    #[tracing::instrument(skip(self, saga_id), fields(%saga_id))]
    pub async fn complete(&self, saga_id: &AggregateId) -> Result<SagaReceipt> {
        self.run(saga_id, SagaCommand::Complete).await
    }

    /// Starts compensating every leg of the saga.
    #[tracing::instrument(skip(self, saga_id), fields(%saga_id))]
    pub async fn init_compensation(&self, saga_id: &AggregateId, cause: String) -> Result<SagaReceipt> {
        self.run(saga_id, SagaCommand::InitCompensation { cause })
            .await
    }

    /// Records that a participant undid its resource.
    #[tracing::instrument(skip(self, saga_id), fields(%saga_id))]
    pub async fn notify_leg_compensated(
        &self,
        leg: LegKind,
        saga_id: &AggregateId,
    ) -> Result<SagaReceipt> {
        self.run(saga_id, SagaCommand::LegCompensated { leg }).await
    }

    /// Loads the current state of a saga.
    pub async fn get_saga(&self, saga_id: &AggregateId) -> Result<Option<OrderSaga>> {
        Ok(self.repository.load_existing(saga_id).await?)
    }

    /// Returns the recorded events of a saga, oldest first.
    pub async fn saga_events(&self, saga_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        let events = self.store().get_events_for_aggregate(saga_id).await?;
        if events.is_empty() {
            return Err(SagaError::NotFound(saga_id.clone()));
        }
        Ok(events)
    }

    async fn run(&self, saga_id: &AggregateId, command: SagaCommand) -> Result<SagaReceipt> {
        let result = self.apply(saga_id, command).await?;
        Ok(self.notify(saga_id, result).await)
    }

    /// Runs a command against the stored saga, re-reading and retrying when
    /// another writer got there first.
    async fn apply(
        &self,
        saga_id: &AggregateId,
        command: SagaCommand,
    ) -> Result<CommandResult<OrderSaga>> {
        let name = command.name();

        let result = (|| async {
            self.repository
                .update(saga_id, None, |saga| saga.handle(saga_id, command.clone()))
                .await
        })
        .retry(self.conflict_backoff())
        .when(SagaError::is_conflict)
        .notify(|error, delay| {
            metrics::counter!("saga_command_conflicts_total").increment(1);
            tracing::debug!(%saga_id, command = name, %error, ?delay, "retrying after concurrency conflict");
        })
        .await;

        let result = match result {
            Ok(result) => result,
            Err(error) => {
                if error.is_conflict() {
                    metrics::counter!("saga_command_conflicts_total").increment(1);
                    tracing::warn!(%saga_id, command = name, %error, "giving up after repeated conflicts");
                }
                return Err(error);
            }
        };

        self.record(saga_id, name, &result).await;
        Ok(result)
    }

    async fn record(&self, saga_id: &AggregateId, command: &'static str, result: &CommandResult<OrderSaga>) {
        let status = result.aggregate.status();
        if result.events.is_empty() {
            tracing::info!(%saga_id, command, %status, "command had no effect");
            return;
        }

        for event in &result.events {
            match event {
                SagaEvent::SagaStarted(_) => metrics::counter!("saga_started_total").increment(1),
                SagaEvent::SagaCompleted(_) => {
                    metrics::counter!("saga_completed_total").increment(1)
                }
                SagaEvent::SagaCompensated(_) => {
                    metrics::counter!("saga_compensated_total").increment(1)
                }
                _ => {}
            }
        }

        tracing::info!(
            %saga_id,
            command,
            version = %result.new_version,
            %status,
            events = result.events.len(),
            "saga updated"
        );

        self.repository.snapshot_if_due(&result.aggregate).await;
    }

    async fn notify(&self, saga_id: &AggregateId, result: CommandResult<OrderSaga>) -> SagaReceipt {
        let intents = SagaIntent::from_events(saga_id, &result.events);
        let notifications = self.notifier.dispatch(intents).await;

        SagaReceipt {
            saga_id: saga_id.clone(),
            version: result.new_version,
            status: result.aggregate.status(),
            notifications,
        }
    }

    fn conflict_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.options.conflict_min_delay)
            .with_max_delay(self.options.conflict_max_delay)
            .with_max_times(self.options.conflict_retries)
            .with_jitter()
    }
}
