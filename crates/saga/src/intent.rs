//! Participant notifications implied by committed saga events.

use common::AggregateId;

use crate::events::{ProductInfo, SagaEvent};
use crate::leg::LegKind;

/// A notification to send to a participant.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaIntent {
    /// Ask the participant to perform its action.
    Request {
        leg: LegKind,
        saga_id: AggregateId,
        product: ProductInfo,
    },
    /// Ask the participant to undo the resource it created.
    Compensate {
        leg: LegKind,
        saga_id: AggregateId,
        external_id: String,
        cause: String,
    },
}

impl SagaIntent {
    pub fn leg(&self) -> LegKind {
        match self {
            SagaIntent::Request { leg, .. } | SagaIntent::Compensate { leg, .. } => *leg,
        }
    }

    pub fn saga_id(&self) -> &AggregateId {
        match self {
            SagaIntent::Request { saga_id, .. } | SagaIntent::Compensate { saga_id, .. } => {
                saga_id
            }
        }
    }

    /// `"request"` or `"compensate"`.
    pub fn action(&self) -> &'static str {
        match self {
            SagaIntent::Request { .. } => "request",
            SagaIntent::Compensate { .. } => "compensate",
        }
    }

    /// Derives the notifications for a batch of committed events.
    ///
    /// `SagaStarted` asks both participants to act, shipment first;
    /// `LegCompensationRequested` asks one participant to undo. Other events
    /// imply nothing.
    pub fn from_events(saga_id: &AggregateId, events: &[SagaEvent]) -> Vec<SagaIntent> {
        let mut intents = Vec::new();
        for event in events {
            match event {
                SagaEvent::SagaStarted(data) => {
                    intents.extend(LegKind::ALL.map(|leg| SagaIntent::Request {
                        leg,
                        saga_id: data.saga_id.clone(),
                        product: data.product.clone(),
                    }));
                }
                SagaEvent::LegCompensationRequested(data) => {
                    intents.push(SagaIntent::Compensate {
                        leg: data.leg,
                        saga_id: saga_id.clone(),
                        external_id: data.external_id.clone(),
                        cause: data.cause.clone(),
                    });
                }
                _ => {}
            }
        }
        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_requests_shipment_then_invoice() {
        let saga_id = AggregateId::from("O1");
        let product = ProductInfo(serde_json::json!({"sku": "X"}));
        let intents = SagaIntent::from_events(
            &saga_id,
            &[SagaEvent::saga_started(saga_id.clone(), product.clone())],
        );

        assert_eq!(
            intents,
            vec![
                SagaIntent::Request {
                    leg: LegKind::Shipment,
                    saga_id: saga_id.clone(),
                    product: product.clone(),
                },
                SagaIntent::Request {
                    leg: LegKind::Invoice,
                    saga_id,
                    product,
                },
            ]
        );
    }

    #[test]
    fn compensation_request_carries_external_id_and_cause() {
        let saga_id = AggregateId::from("O1");
        let intents = SagaIntent::from_events(
            &saga_id,
            &[
                SagaEvent::compensation_started("fraud"),
                SagaEvent::leg_compensation_requested(LegKind::Invoice, "INV-1", "fraud"),
                SagaEvent::leg_compensated(LegKind::Shipment),
            ],
        );

        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].leg(), LegKind::Invoice);
        assert_eq!(intents[0].action(), "compensate");
        assert!(matches!(
            &intents[0],
            SagaIntent::Compensate { external_id, cause, .. } if external_id == "INV-1" && cause == "fraud"
        ));
    }

    #[test]
    fn legs_closed_without_resource_imply_nothing() {
        let saga_id = AggregateId::from("O1");
        let intents = SagaIntent::from_events(
            &saga_id,
            &[
                SagaEvent::leg_failed(LegKind::Shipment, "out of stock"),
                SagaEvent::compensation_started("out of stock"),
                SagaEvent::leg_compensated(LegKind::Shipment),
                SagaEvent::leg_compensated(LegKind::Invoice),
                SagaEvent::saga_compensated(),
            ],
        );
        assert!(intents.is_empty());
    }
}
