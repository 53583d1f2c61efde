//! Participant notifier.
//!
//! Delivers [`SagaIntent`]s to the shipment and invoice participants. Calls
//! run concurrently and each one is bounded by a timeout. Outcomes are
//! logged, counted and returned to the caller; the notifier never changes
//! saga state.

use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use futures_util::future::join_all;

use crate::error::{NotifierError, SagaError};
use crate::intent::SagaIntent;
use crate::leg::LegKind;
use crate::participants::{Ack, ParticipantClient};

/// Timeout and retry settings for participant calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyPolicy {
    /// Upper bound for a single call.
    pub timeout: Duration,
    /// Extra attempts after a transient failure. `0` sends each call once.
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl NotifyPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Result of delivering one intent.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub intent: SagaIntent,
    pub result: Result<Ack, NotifierError>,
}

/// Results of a dispatch, in the order the intents were given.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Returns true if every call was acknowledged.
    pub fn all_delivered(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Returns the outcomes whose call failed.
    pub fn failures(&self) -> impl Iterator<Item = &DispatchOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Returns the legs whose request notification was acknowledged.
    pub fn acknowledged_requests(&self) -> Vec<LegKind> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.intent, SagaIntent::Request { .. }) && o.result.is_ok())
            .map(|o| o.intent.leg())
            .collect()
    }

    /// Fails with the first delivery error, if any.
    pub fn ensure_delivered(&self) -> Result<(), SagaError> {
        match self.outcomes.iter().find_map(|o| o.result.as_ref().err()) {
            Some(error) => Err(SagaError::NotifierTransport(error.clone())),
            None => Ok(()),
        }
    }
}

/// Sends intents to the participant owning each leg.
pub struct ParticipantNotifier<Sh, Inv> {
    shipment: Sh,
    invoice: Inv,
    policy: NotifyPolicy,
}

impl<Sh, Inv> ParticipantNotifier<Sh, Inv>
where
    Sh: ParticipantClient,
    Inv: ParticipantClient,
{
    pub fn new(shipment: Sh, invoice: Inv, policy: NotifyPolicy) -> Self {
        Self {
            shipment,
            invoice,
            policy,
        }
    }

    pub fn policy(&self) -> &NotifyPolicy {
        &self.policy
    }

    /// Delivers every intent concurrently and waits for all of them.
    pub async fn dispatch(&self, intents: Vec<SagaIntent>) -> DispatchReport {
        if intents.is_empty() {
            return DispatchReport::default();
        }

        let calls = intents.into_iter().map(|intent| async move {
            let result = self.deliver(&intent).await;
            DispatchOutcome { intent, result }
        });

        DispatchReport {
            outcomes: join_all(calls).await,
        }
    }

    async fn deliver(&self, intent: &SagaIntent) -> Result<Ack, NotifierError> {
        let participant = intent.leg().as_str();
        let action = intent.action();
        let start = Instant::now();

        let result = (|| async { self.call_once(intent).await })
            .retry(self.policy.backoff())
            .when(NotifierError::is_transient)
            .notify(|error, delay| {
                tracing::debug!(participant, action, %error, ?delay, "retrying participant call");
            })
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(NotifierError::Timeout(_)) => "timeout",
            Err(_) => "failure",
        };
        metrics::counter!(
            "participant_calls_total",
            "participant" => participant,
            "action" => action,
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!(
            "participant_call_duration_seconds",
            "participant" => participant,
            "action" => action
        )
        .record(start.elapsed().as_secs_f64());

        let saga_id = intent.saga_id();
        match &result {
            Ok(ack) => {
                tracing::info!(%saga_id, participant, action, body = %ack.body, "participant notified");
            }
            Err(error) => {
                tracing::warn!(%saga_id, participant, action, %error, "participant notification failed");
            }
        }

        result
    }

    async fn call_once(&self, intent: &SagaIntent) -> Result<Ack, NotifierError> {
        let participant: &dyn ParticipantClient = match intent.leg() {
            LegKind::Shipment => &self.shipment,
            LegKind::Invoice => &self.invoice,
        };

        let call = async {
            match intent {
                SagaIntent::Request {
                    saga_id, product, ..
                } => participant.request_action(saga_id, product).await,
                SagaIntent::Compensate {
                    saga_id,
                    external_id,
                    cause,
                    ..
                } => {
                    participant
                        .compensate_action(saga_id, external_id, cause)
                        .await
                }
            }
        };

        tokio::time::timeout(self.policy.timeout, call)
            .await
            .map_err(|_| NotifierError::Timeout(self.policy.timeout))?
    }
}
