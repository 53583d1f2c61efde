//! Order saga aggregate.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, SnapshotCapable};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::events::{ProductInfo, SagaEvent};
use crate::leg::{Leg, LegKind};
use crate::state::{LegStatus, SagaStatus};

/// An event-sourced order saga.
///
/// Tracks the shipment and invoice legs of one order. The saga id is the
/// order id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSaga {
    id: Option<AggregateId>,
    version: Version,
    product: Option<ProductInfo>,
    status: SagaStatus,
    shipment: Leg,
    invoice: Leg,
    failure_cause: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Aggregate for OrderSaga {
    type Event = SagaEvent;
    type Error = SagaError;

    fn aggregate_type() -> &'static str {
        "OrderSaga"
    }

    fn id(&self) -> Option<&AggregateId> {
        self.id.as_ref()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.product = Some(data.product);
                self.status = SagaStatus::Started;
                self.shipment = Leg::default();
                self.invoice = Leg::default();
                self.started_at = Some(data.started_at);
            }
            SagaEvent::LegRequested(data) => {
                self.leg_mut(data.leg).status = LegStatus::Requested;
            }
            SagaEvent::LegSucceeded(data) => {
                let leg = self.leg_mut(data.leg);
                leg.status = LegStatus::Succeeded;
                leg.external_id = Some(data.external_id);

                self.status = if self.leg(data.leg.other()).status == LegStatus::Succeeded {
                    SagaStatus::Completing
                } else {
                    SagaStatus::InProgress
                };
            }
            SagaEvent::LegFailed(data) => {
                self.leg_mut(data.leg).status = LegStatus::Failed;
                self.failure_cause = Some(data.cause);
            }
            SagaEvent::SagaCompleted(data) => {
                self.status = SagaStatus::Completed;
                self.finished_at = Some(data.completed_at);
            }
            SagaEvent::CompensationStarted(data) => {
                self.status = SagaStatus::Compensating;
                self.failure_cause = Some(data.cause);
            }
            SagaEvent::LegCompensationRequested(data) => {
                self.leg_mut(data.leg).status = LegStatus::Compensating;
            }
            SagaEvent::LegCompensated(data) => {
                self.leg_mut(data.leg).status = LegStatus::Compensated;
            }
            SagaEvent::SagaCompensated(data) => {
                self.status = SagaStatus::Compensated;
                self.finished_at = Some(data.compensated_at);
            }
        }
    }
}

impl SnapshotCapable for OrderSaga {
    fn snapshot_interval() -> usize {
        10
    }
}

// Query methods
impl OrderSaga {
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn product(&self) -> Option<&ProductInfo> {
        self.product.as_ref()
    }

    pub fn leg(&self, kind: LegKind) -> &Leg {
        match kind {
            LegKind::Shipment => &self.shipment,
            LegKind::Invoice => &self.invoice,
        }
    }

    pub fn shipment(&self) -> &Leg {
        &self.shipment
    }

    pub fn invoice(&self) -> &Leg {
        &self.invoice
    }

    pub fn failure_cause(&self) -> Option<&str> {
        self.failure_cause.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the saga reached `Completed` or `Compensated`.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns true once every leg has been compensated.
    pub fn all_legs_compensated(&self) -> bool {
        self.shipment.status.is_compensated() && self.invoice.status.is_compensated()
    }

    fn leg_mut(&mut self, kind: LegKind) -> &mut Leg {
        match kind {
            LegKind::Shipment => &mut self.shipment,
            LegKind::Invoice => &mut self.invoice,
        }
    }
}
