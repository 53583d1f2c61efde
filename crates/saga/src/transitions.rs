//! Saga state machine.
//!
//! [`OrderSaga::handle`] turns a command into the events to record. It
//! performs no I/O: the caller persists the events and derives the
//! participant notifications from them.

use common::AggregateId;
use domain::Aggregate;

use crate::aggregate::OrderSaga;
use crate::compensation;
use crate::error::SagaError;
use crate::events::{ProductInfo, SagaEvent};
use crate::leg::LegKind;
use crate::state::{LegStatus, SagaStatus};

/// Commands accepted by an order saga.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaCommand {
    /// Create the saga and request both legs.
    Start { product: ProductInfo },
    /// Record that a request notification reached the participant.
    MarkLegRequested { leg: LegKind },
    /// The participant created its resource.
    ProcessLegSuccess { leg: LegKind, external_id: String },
    /// The participant could not perform its action.
    ProcessLegFailure { leg: LegKind, cause: String },
    /// Close a saga whose legs both succeeded.
    Complete,
    /// Undo every leg.
    InitCompensation { cause: String },
    /// The participant confirmed the undo of its resource.
    LegCompensated { leg: LegKind },
}

impl SagaCommand {
    /// Short name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            SagaCommand::Start { .. } => "start",
            SagaCommand::MarkLegRequested { .. } => "mark_leg_requested",
            SagaCommand::ProcessLegSuccess { .. } => "leg_success",
            SagaCommand::ProcessLegFailure { .. } => "leg_failure",
            SagaCommand::Complete => "complete",
            SagaCommand::InitCompensation { .. } => "compensate",
            SagaCommand::LegCompensated { .. } => "leg_compensated",
        }
    }
}

/// Events produced by one decision, applied to a working copy of the saga
/// as they are emitted so later rules see the updated legs.
pub(crate) struct Decision {
    saga: OrderSaga,
    events: Vec<SagaEvent>,
}

impl Decision {
    fn new(saga: &OrderSaga) -> Self {
        Self {
            saga: saga.clone(),
            events: Vec::new(),
        }
    }

    pub(crate) fn saga(&self) -> &OrderSaga {
        &self.saga
    }

    pub(crate) fn emit(&mut self, event: SagaEvent) {
        self.saga.apply(event.clone());
        self.events.push(event);
    }

    fn into_events(self) -> Vec<SagaEvent> {
        self.events
    }
}

impl OrderSaga {
    /// Decides the events a command produces.
    ///
    /// An empty list means the command is a no-op for the current state
    /// (a duplicate or late callback).
    pub fn handle(
        &self,
        saga_id: &AggregateId,
        command: SagaCommand,
    ) -> Result<Vec<SagaEvent>, SagaError> {
        if self.id().is_none() {
            return match command {
                SagaCommand::Start { product } => {
                    Ok(vec![SagaEvent::saga_started(saga_id.clone(), product)])
                }
                _ => Err(SagaError::NotFound(saga_id.clone())),
            };
        }

        let mut decision = Decision::new(self);
        match command {
            SagaCommand::Start { .. } => {
                return Err(SagaError::AlreadyExists(saga_id.clone()));
            }

            SagaCommand::MarkLegRequested { leg } => {
                if self.leg(leg).status == LegStatus::NotRequested {
                    decision.emit(SagaEvent::leg_requested(leg));
                }
            }

            SagaCommand::ProcessLegSuccess { leg, external_id } => {
                if self.leg(leg).status.is_pending() {
                    decision.emit(SagaEvent::leg_succeeded(leg, external_id));
                }
            }

            SagaCommand::ProcessLegFailure { leg, cause } => {
                if self.leg(leg).status.is_pending() && self.status().can_compensate() {
                    decision.emit(SagaEvent::leg_failed(leg, cause.clone()));
                    decision.emit(SagaEvent::compensation_started(cause.clone()));
                    compensation::compensate_legs(&mut decision, &cause);
                }
            }

            SagaCommand::Complete => {
                if !self.status().can_complete() {
                    return Err(SagaError::InvalidTransition {
                        action: "complete",
                        status: self.status(),
                    });
                }
                decision.emit(SagaEvent::saga_completed());
            }

            SagaCommand::InitCompensation { cause } => {
                if self.status() == SagaStatus::Compensating {
                    return Ok(Vec::new());
                }
                if !self.status().can_compensate() {
                    return Err(SagaError::InvalidTransition {
                        action: "compensate",
                        status: self.status(),
                    });
                }
                decision.emit(SagaEvent::compensation_started(cause.clone()));
                compensation::compensate_legs(&mut decision, &cause);
            }

            SagaCommand::LegCompensated { leg } => {
                let status = self.leg(leg).status;
                if status != LegStatus::Compensating {
                    return Err(SagaError::InvalidLegTransition {
                        action: "mark compensated",
                        leg,
                        status,
                    });
                }
                decision.emit(SagaEvent::leg_compensated(leg));
                compensation::close_if_compensated(&mut decision);
            }
        }

        tracing::trace!(%saga_id, events = decision.events.len(), "saga decision");
        Ok(decision.into_events())
    }
}
