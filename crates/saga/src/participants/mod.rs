//! Clients for the shipment and invoice services.

pub mod http;
pub mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;

use crate::error::NotifierError;
use crate::events::ProductInfo;

pub use http::HttpParticipant;
pub use in_memory::{InMemoryParticipant, ParticipantCall};

/// Transport-level acknowledgement of a participant call.
///
/// The participant reports the outcome of its action later through the
/// saga's callbacks; the body is only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    pub body: String,
}

/// A participant service taking part in the order saga.
#[async_trait]
pub trait ParticipantClient: Send + Sync {
    /// Asks the participant to perform its action for the saga.
    async fn request_action(
        &self,
        saga_id: &AggregateId,
        product: &ProductInfo,
    ) -> Result<Ack, NotifierError>;

    /// Asks the participant to undo the resource identified by `external_id`.
    async fn compensate_action(
        &self,
        saga_id: &AggregateId,
        external_id: &str,
        cause: &str,
    ) -> Result<Ack, NotifierError>;
}

#[async_trait]
impl<T: ParticipantClient + ?Sized> ParticipantClient for Arc<T> {
    async fn request_action(
        &self,
        saga_id: &AggregateId,
        product: &ProductInfo,
    ) -> Result<Ack, NotifierError> {
        (**self).request_action(saga_id, product).await
    }

    async fn compensate_action(
        &self,
        saga_id: &AggregateId,
        external_id: &str,
        cause: &str,
    ) -> Result<Ack, NotifierError> {
        (**self).compensate_action(saga_id, external_id, cause).await
    }
}
