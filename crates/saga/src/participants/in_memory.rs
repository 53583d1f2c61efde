//! In-memory participant.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;

use super::{Ack, ParticipantClient};
use crate::error::NotifierError;
use crate::events::ProductInfo;

/// A call received by an [`InMemoryParticipant`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParticipantCall {
    Request {
        saga_id: AggregateId,
        product: ProductInfo,
    },
    Compensate {
        saga_id: AggregateId,
        external_id: String,
        cause: String,
    },
}

#[derive(Debug, Default)]
struct InMemoryParticipantState {
    calls: Vec<ParticipantCall>,
    failing: bool,
    delay: Option<Duration>,
}

/// In-memory participant for tests and local runs.
///
/// Records every call it receives. It can be told to fail, or to answer
/// slowly so callers hit their timeout.
#[derive(Debug, Clone, Default)]
pub struct InMemoryParticipant {
    state: Arc<Mutex<InMemoryParticipantState>>,
}

impl InMemoryParticipant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Delays every following call by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    /// Returns the calls received so far, oldest first.
    pub fn calls(&self) -> Vec<ParticipantCall> {
        self.lock().calls.clone()
    }

    /// Returns the external ids the participant was asked to undo.
    pub fn compensated_ids(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ParticipantCall::Compensate { external_id, .. } => Some(external_id.clone()),
                ParticipantCall::Request { .. } => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryParticipantState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn receive(&self, call: ParticipantCall) -> Result<Ack, NotifierError> {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.calls.push(call);
        if state.failing {
            return Err(NotifierError::Transport("participant unavailable".to_string()));
        }
        Ok(Ack {
            body: "accepted".to_string(),
        })
    }
}

#[async_trait]
impl ParticipantClient for InMemoryParticipant {
    async fn request_action(
        &self,
        saga_id: &AggregateId,
        product: &ProductInfo,
    ) -> Result<Ack, NotifierError> {
        self.receive(ParticipantCall::Request {
            saga_id: saga_id.clone(),
            product: product.clone(),
        })
        .await
    }

    async fn compensate_action(
        &self,
        saga_id: &AggregateId,
        external_id: &str,
        cause: &str,
    ) -> Result<Ack, NotifierError> {
        self.receive(ParticipantCall::Compensate {
            saga_id: saga_id.clone(),
            external_id: external_id.to_string(),
            cause: cause.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls() {
        let participant = InMemoryParticipant::new();
        let saga_id = AggregateId::from("O1");

        participant
            .request_action(&saga_id, &ProductInfo(serde_json::json!({"sku": "X"})))
            .await
            .unwrap();
        participant
            .compensate_action(&saga_id, "SHIP-1", "fraud")
            .await
            .unwrap();

        assert_eq!(participant.calls().len(), 2);
        assert_eq!(participant.compensated_ids(), vec!["SHIP-1".to_string()]);
    }

    #[tokio::test]
    async fn failing_participant_still_records_the_attempt() {
        let participant = InMemoryParticipant::new();
        participant.set_failing(true);

        let result = participant
            .request_action(&AggregateId::from("O1"), &ProductInfo(serde_json::json!({})))
            .await;

        assert!(matches!(result, Err(NotifierError::Transport(_))));
        assert_eq!(participant.calls().len(), 1);
    }
}
