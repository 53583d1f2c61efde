//! Shared types for the order saga workspace.

mod types;

pub use types::AggregateId;
