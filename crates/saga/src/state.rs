//! Saga and leg status.

use serde::{Deserialize, Serialize};

/// Overall status of an order saga.
///
/// ```text
/// Started ──► InProgress ──► Completing ──► Completed
///    │            │              │
///    └────────────┴──────────────┴──► Compensating ──► Compensated
/// ```
///
/// `Failed` is a terminal status reserved for sagas that cannot be
/// compensated; no transition produces it today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// Created; request notifications sent to both participants.
    #[default]
    Started,

    /// At least one leg succeeded.
    InProgress,

    /// Both legs succeeded; waiting for the explicit completion.
    Completing,

    /// Completed (terminal).
    Completed,

    /// Undo requests are outstanding.
    Compensating,

    /// Every leg is compensated (terminal).
    Compensated,

    /// Terminal failure.
    Failed,
}

impl SagaStatus {
    /// Returns true if compensation may be initiated from this status.
    pub fn can_compensate(&self) -> bool {
        matches!(
            self,
            SagaStatus::Started | SagaStatus::InProgress | SagaStatus::Completing
        )
    }

    /// Returns true if the saga can be completed.
    pub fn can_complete(&self) -> bool {
        matches!(self, SagaStatus::Completing)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "Started",
            SagaStatus::InProgress => "InProgress",
            SagaStatus::Completing => "Completing",
            SagaStatus::Completed => "Completed",
            SagaStatus::Compensating => "Compensating",
            SagaStatus::Compensated => "Compensated",
            SagaStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one participant leg.
///
/// ```text
/// NotRequested ──► Requested ──┬──► Succeeded ──► Compensating ──► Compensated
///                              └──► Failed ─────────────────────────┘
/// ```
///
/// Legs that never succeeded move to `Compensated` directly because there is
/// nothing to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LegStatus {
    #[default]
    NotRequested,
    Requested,
    Succeeded,
    Failed,
    Compensating,
    Compensated,
}

impl LegStatus {
    /// Returns true while the participant has not reported an outcome.
    pub fn is_pending(&self) -> bool {
        matches!(self, LegStatus::NotRequested | LegStatus::Requested)
    }

    /// Returns true if the leg has been closed by compensation.
    pub fn is_compensated(&self) -> bool {
        matches!(self, LegStatus::Compensated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LegStatus::NotRequested => "NotRequested",
            LegStatus::Requested => "Requested",
            LegStatus::Succeeded => "Succeeded",
            LegStatus::Failed => "Failed",
            LegStatus::Compensating => "Compensating",
            LegStatus::Compensated => "Compensated",
        }
    }
}

impl std::fmt::Display for LegStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_started() {
        assert_eq!(SagaStatus::default(), SagaStatus::Started);
        assert_eq!(LegStatus::default(), LegStatus::NotRequested);
    }

    #[test]
    fn compensation_allowed_before_completion() {
        assert!(SagaStatus::Started.can_compensate());
        assert!(SagaStatus::InProgress.can_compensate());
        assert!(SagaStatus::Completing.can_compensate());
        assert!(!SagaStatus::Compensating.can_compensate());
        assert!(!SagaStatus::Completed.can_compensate());
        assert!(!SagaStatus::Compensated.can_compensate());
        assert!(!SagaStatus::Failed.can_compensate());
    }

    #[test]
    fn only_completing_can_complete() {
        assert!(SagaStatus::Completing.can_complete());
        assert!(!SagaStatus::InProgress.can_complete());
        assert!(!SagaStatus::Completed.can_complete());
    }

    #[test]
    fn terminal_statuses() {
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
        assert!(SagaStatus::Failed.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
        assert!(!SagaStatus::Completing.is_terminal());
    }

    #[test]
    fn pending_legs() {
        assert!(LegStatus::NotRequested.is_pending());
        assert!(LegStatus::Requested.is_pending());
        assert!(!LegStatus::Succeeded.is_pending());
        assert!(!LegStatus::Failed.is_pending());
        assert!(!LegStatus::Compensated.is_pending());
    }

    #[test]
    fn display() {
        assert_eq!(SagaStatus::InProgress.to_string(), "InProgress");
        assert_eq!(LegStatus::NotRequested.to_string(), "NotRequested");
    }

    #[test]
    fn status_serializes_as_variant_name() {
        assert_eq!(
            serde_json::to_string(&SagaStatus::Completing).unwrap(),
            "\"Completing\""
        );
    }
}
