//! Saga error types.

use std::time::Duration;

use common::AggregateId;
use domain::DomainError;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::leg::LegKind;
use crate::state::{LegStatus, SagaStatus};

/// Errors returned by saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No saga exists for the id.
    #[error("Saga not found: {0}")]
    NotFound(AggregateId),

    /// A saga already exists for the id.
    #[error("Saga already exists: {0}")]
    AlreadyExists(AggregateId),

    /// Another writer changed the saga first.
    #[error("Concurrency conflict on saga {saga_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        saga_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The saga's status does not allow the action.
    #[error("Cannot {action} a saga in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: SagaStatus,
    },

    /// The leg's status does not allow the action.
    #[error("Cannot {action} the {leg} leg in status {status}")]
    InvalidLegTransition {
        action: &'static str,
        leg: LegKind,
        status: LegStatus,
    },

    /// A participant could not be reached.
    #[error("Participant notification failed: {0}")]
    NotifierTransport(#[from] NotifierError),

    /// Event store error.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Returns true for errors that may succeed when the operation is repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SagaError::ConcurrencyConflict { .. } | SagaError::NotifierTransport(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SagaError::ConcurrencyConflict { .. })
    }
}

impl From<EventStoreError> for SagaError {
    fn from(e: EventStoreError) -> Self {
        match e {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => SagaError::ConcurrencyConflict {
                saga_id: aggregate_id,
                expected,
                actual,
            },
            EventStoreError::AggregateNotFound(id) => SagaError::NotFound(id),
            EventStoreError::Serialization(e) => SagaError::Serialization(e),
            other => SagaError::EventStore(other),
        }
    }
}

impl From<DomainError> for SagaError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::AlreadyExists { aggregate_id, .. } => {
                SagaError::AlreadyExists(aggregate_id)
            }
            DomainError::NotFound { aggregate_id, .. } => SagaError::NotFound(aggregate_id),
            DomainError::EventStore(e) => e.into(),
            DomainError::Serialization(e) => SagaError::Serialization(e),
        }
    }
}

/// Errors from a single participant call.
#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    /// The request could not be delivered.
    #[error("transport error: {0}")]
    Transport(String),

    /// No response within the configured timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The participant answered with a non-success status.
    #[error("participant answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl NotifierError {
    /// Returns true for failures worth retrying: transport errors, timeouts
    /// and server-side rejections.
    pub fn is_transient(&self) -> bool {
        match self {
            NotifierError::Transport(_) | NotifierError::Timeout(_) => true,
            NotifierError::Rejected { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

impl From<reqwest::Error> for NotifierError {
    fn from(e: reqwest::Error) -> Self {
        NotifierError::Transport(e.to_string())
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
