//! Compensation policy.
//!
//! Each leg is handled on its own, shipment first. A leg holding an external
//! resource gets an undo request; any other open leg is closed as compensated
//! because there is nothing to undo. Legs already compensating or compensated
//! are left alone.

use crate::events::SagaEvent;
use crate::leg::LegKind;
use crate::state::LegStatus;
use crate::transitions::Decision;

pub(crate) fn compensate_legs(decision: &mut Decision, cause: &str) {
    for kind in LegKind::ALL {
        let leg = decision.saga().leg(kind);
        if matches!(leg.status, LegStatus::Compensating | LegStatus::Compensated) {
            continue;
        }

        let event = match &leg.external_id {
            Some(external_id) => {
                SagaEvent::leg_compensation_requested(kind, external_id.clone(), cause)
            }
            None => SagaEvent::leg_compensated(kind),
        };
        decision.emit(event);
    }

    close_if_compensated(decision);
}

/// Emits `SagaCompensated` once every leg is compensated.
pub(crate) fn close_if_compensated(decision: &mut Decision) {
    if decision.saga().all_legs_compensated() {
        decision.emit(SagaEvent::saga_compensated());
    }
}
