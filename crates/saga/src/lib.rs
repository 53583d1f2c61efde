//! Order saga orchestration.
//!
//! An order saga coordinates two participants, shipment and invoice. Both are
//! asked to act when the saga starts and report back through callbacks. When
//! both succeed the saga can be completed; when either fails, or compensation
//! is requested, every leg that already acted is asked to undo its work.
//!
//! Saga state is event-sourced: [`OrderSaga::handle`] decides which events a
//! command produces, the coordinator commits them with optimistic concurrency
//! and only then notifies the participants.

pub mod aggregate;
mod compensation;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod intent;
pub mod leg;
pub mod notifier;
pub mod participants;
pub mod state;
pub mod transitions;

pub use aggregate::OrderSaga;
pub use coordinator::{CoordinatorOptions, SagaCoordinator, SagaReceipt};
pub use error::{NotifierError, SagaError};
pub use events::{ProductInfo, SagaEvent};
pub use intent::SagaIntent;
pub use leg::{Leg, LegKind, UnknownLeg};
pub use notifier::{DispatchOutcome, DispatchReport, NotifyPolicy, ParticipantNotifier};
pub use participants::{Ack, HttpParticipant, InMemoryParticipant, ParticipantCall, ParticipantClient};
pub use state::{LegStatus, SagaStatus};
pub use transitions::SagaCommand;
