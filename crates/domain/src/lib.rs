//! Domain layer shared by event-sourced aggregates.
//!
//! - [`Aggregate`] and [`DomainEvent`] describe an aggregate rebuilt by
//!   replaying its events.
//! - [`AggregateRepository`] is the versioned entity store: it loads an
//!   aggregate, runs a command against it and appends the resulting events
//!   with the version that was observed.

pub mod aggregate;
pub mod error;
pub mod repository;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use error::DomainError;
pub use repository::{AggregateRepository, CommandResult};
