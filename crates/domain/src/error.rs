//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

/// Errors raised by the aggregate repository.
#[derive(Debug, Error)]
pub enum DomainError {
    /// `create` was called for an id that already has events.
    #[error("{aggregate_type} {aggregate_id} already exists")]
    AlreadyExists {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// `update` was called for an id that has no events.
    #[error("{aggregate_type} {aggregate_id} not found")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// An error occurred in the event store, including version conflicts.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true when the write lost an optimistic concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_conflict())
    }
}
