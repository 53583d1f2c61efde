//! Versioned aggregate repository.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreError, EventStoreExt, Snapshot, Version,
};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Result of a command run through the repository.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The version of the aggregate after the command.
    pub new_version: Version,
}

/// Loads aggregates from an [`EventStore`] and persists the events produced
/// by commands against them.
///
/// Every write is appended with the version observed at load time, so two
/// commands racing on the same aggregate cannot both commit: the loser gets
/// an [`EventStoreError::ConcurrencyConflict`] and nothing it produced is
/// stored.
pub struct AggregateRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> AggregateRepository<S, A>
where
    S: EventStore,
    A: Aggregate + DeserializeOwned,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate, starting from its snapshot when one exists.
    ///
    /// An unknown id yields `A::default()` at the initial version.
    pub async fn load(&self, aggregate_id: &AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => {
                let mut aggregate: A = snapshot.restore()?;
                aggregate.set_version(snapshot.version);
                aggregate
            }
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning `None` if it has no events.
    pub async fn load_existing(&self, aggregate_id: &AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.version() == Version::initial() {
            Ok(None)
        } else {
            Ok(Some(aggregate))
        }
    }

    /// Runs a command against a new aggregate.
    ///
    /// Fails with [`DomainError::AlreadyExists`] if the id already has events,
    /// including when another writer creates it between load and append.
    #[tracing::instrument(skip(self, command_fn), fields(aggregate_type = A::aggregate_type()))]
    pub async fn create<F>(
        &self,
        aggregate_id: &AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, A::Error>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        A::Error: From<DomainError>,
    {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.version() != Version::initial() {
            return Err(already_exists::<A>(aggregate_id).into());
        }

        let events = command_fn(&aggregate)?;
        match self.persist(aggregate_id, aggregate, events).await {
            Err(DomainError::EventStore(e)) if e.is_conflict() => {
                Err(already_exists::<A>(aggregate_id).into())
            }
            result => Ok(result?),
        }
    }

    /// Runs a command against an existing aggregate.
    ///
    /// When `expected_version` is given and the stored aggregate has moved
    /// past it, the command is not run and a concurrency conflict is
    /// returned. Fails with [`DomainError::NotFound`] for an unknown id.
    #[tracing::instrument(skip(self, command_fn), fields(aggregate_type = A::aggregate_type()))]
    pub async fn update<F>(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Option<Version>,
        command_fn: F,
    ) -> Result<CommandResult<A>, A::Error>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        A::Error: From<DomainError>,
    {
        let aggregate = self.load(aggregate_id).await?;
        let actual = aggregate.version();
        if actual == Version::initial() {
            return Err(DomainError::NotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: aggregate_id.clone(),
            }
            .into());
        }

        if let Some(expected) = expected_version
            && expected != actual
        {
            return Err(DomainError::from(EventStoreError::ConcurrencyConflict {
                aggregate_id: aggregate_id.clone(),
                expected,
                actual,
            })
            .into());
        }

        let events = command_fn(&aggregate)?;
        Ok(self.persist(aggregate_id, aggregate, events).await?)
    }

    async fn persist(
        &self,
        aggregate_id: &AggregateId,
        mut aggregate: A,
        events: Vec<A::Event>,
    ) -> Result<CommandResult<A>, DomainError> {
        let current_version = aggregate.version();
        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events,
                new_version: current_version,
            });
        }

        let envelopes = self.build_envelopes(aggregate_id, current_version, &events)?;
        let new_version = self
            .store
            .append(envelopes, AppendOptions::expect_version(current_version))
            .await?;

        aggregate.apply_events(events.iter().cloned());
        aggregate.set_version(new_version);

        tracing::debug!(%aggregate_id, %new_version, count = events.len(), "events committed");

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    fn build_envelopes(
        &self,
        aggregate_id: &AggregateId,
        current_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id.clone())
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?
                .build()?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }
}

impl<S, A> AggregateRepository<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Saves a snapshot of `aggregate` when it sits on a snapshot boundary.
    ///
    /// The events are already committed at this point, so a failed snapshot
    /// write is logged and otherwise ignored.
    pub async fn snapshot_if_due(&self, aggregate: &A) {
        if !aggregate.should_snapshot() {
            return;
        }
        let Some(aggregate_id) = aggregate.id() else {
            return;
        };

        let saved = match Snapshot::from_state(
            aggregate_id.clone(),
            A::aggregate_type(),
            aggregate.version(),
            aggregate,
        ) {
            Ok(snapshot) => self.store.save_snapshot(snapshot).await,
            Err(e) => Err(e.into()),
        };

        match saved {
            Ok(()) => {
                metrics::counter!("aggregate_snapshots_total").increment(1);
                tracing::debug!(%aggregate_id, version = %aggregate.version(), "snapshot saved");
            }
            Err(error) => {
                tracing::warn!(%aggregate_id, %error, "failed to save snapshot");
            }
        }
    }
}

fn already_exists<A: Aggregate>(aggregate_id: &AggregateId) -> DomainError {
    DomainError::AlreadyExists {
        aggregate_type: A::aggregate_type(),
        aggregate_id: aggregate_id.clone(),
    }
}
