//! Append-only event storage with optimistic concurrency.
//!
//! Every aggregate owns one stream of events keyed by its [`AggregateId`].
//! Appends carry the version the writer last observed; a mismatch is
//! reported as [`EventStoreError::ConcurrencyConflict`] and nothing is written.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt};
