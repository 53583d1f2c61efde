//! Saga domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::leg::LegKind;

/// Opaque description of what was ordered.
///
/// Never interpreted by the saga; forwarded verbatim to participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductInfo(pub serde_json::Value);

impl From<serde_json::Value> for ProductInfo {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Facts recorded in a saga's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// The saga was created for an order.
    SagaStarted(SagaStartedData),

    /// A request notification for the leg was acknowledged.
    LegRequested(LegData),

    /// The participant reported success and returned a resource id.
    LegSucceeded(LegSucceededData),

    /// The participant reported failure.
    LegFailed(LegFailedData),

    /// The saga was completed.
    SagaCompleted(SagaCompletedData),

    /// Compensation of the saga began.
    CompensationStarted(CompensationData),

    /// An undo request is to be sent for a leg's resource.
    LegCompensationRequested(LegCompensationRequestedData),

    /// The leg has nothing left to undo.
    LegCompensated(LegData),

    /// Every leg is compensated.
    SagaCompensated(SagaCompensatedData),
}

impl DomainEvent for SagaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::LegRequested(_) => "LegRequested",
            SagaEvent::LegSucceeded(_) => "LegSucceeded",
            SagaEvent::LegFailed(_) => "LegFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::LegCompensationRequested(_) => "LegCompensationRequested",
            SagaEvent::LegCompensated(_) => "LegCompensated",
            SagaEvent::SagaCompensated(_) => "SagaCompensated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: AggregateId,
    pub product: ProductInfo,
    pub started_at: DateTime<Utc>,
}

/// Data for events that only name a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegData {
    pub leg: LegKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegSucceededData {
    pub leg: LegKind,
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegFailedData {
    pub leg: LegKind,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationData {
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegCompensationRequestedData {
    pub leg: LegKind,
    /// Resource the participant must undo.
    pub external_id: String,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaCompensatedData {
    pub compensated_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn saga_started(saga_id: AggregateId, product: ProductInfo) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id,
            product,
            started_at: Utc::now(),
        })
    }

    pub fn leg_requested(leg: LegKind) -> Self {
        SagaEvent::LegRequested(LegData { leg })
    }

    pub fn leg_succeeded(leg: LegKind, external_id: impl Into<String>) -> Self {
        SagaEvent::LegSucceeded(LegSucceededData {
            leg,
            external_id: external_id.into(),
        })
    }

    pub fn leg_failed(leg: LegKind, cause: impl Into<String>) -> Self {
        SagaEvent::LegFailed(LegFailedData {
            leg,
            cause: cause.into(),
        })
    }

    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            completed_at: Utc::now(),
        })
    }

    pub fn compensation_started(cause: impl Into<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationData {
            cause: cause.into(),
        })
    }

    pub fn leg_compensation_requested(
        leg: LegKind,
        external_id: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        SagaEvent::LegCompensationRequested(LegCompensationRequestedData {
            leg,
            external_id: external_id.into(),
            cause: cause.into(),
        })
    }

    pub fn leg_compensated(leg: LegKind) -> Self {
        SagaEvent::LegCompensated(LegData { leg })
    }

    pub fn saga_compensated() -> Self {
        SagaEvent::SagaCompensated(SagaCompensatedData {
            compensated_at: Utc::now(),
        })
    }
}
