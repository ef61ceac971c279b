//! Command execution pipeline.
//!
//! One consistent path for every aggregate: load the stream, rehydrate,
//! let the aggregate decide, append with an optimistic version check. The
//! dispatcher contains no IO itself; it composes the [`EventStore`] trait,
//! so tests run against the in-memory store unchanged.
//!
//! Guard evaluation is side-effect-free until the final append, which is
//! what makes `ConcurrentModification` safe to retry wholesale.

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use atelier_core::{Aggregate, AggregateId, DomainError, DomainResult, ExpectedVersion};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

impl From<EventStoreError> for DomainError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DomainError::concurrent(msg),
            EventStoreError::AggregateTypeMismatch(msg) | EventStoreError::InvalidAppend(msg) => {
                DomainError::storage(msg)
            }
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// The `make_aggregate` closure lets the dispatcher stay generic over
/// aggregate construction (`RentalOrder::empty(id)` and friends).
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Dispatch a command through the full pipeline: load, rehydrate,
    /// decide, append with `ExpectedVersion::Exact` of the loaded stream.
    ///
    /// A concurrent append between load and append surfaces as
    /// [`DomainError::ConcurrentModification`]; the caller may retry the
    /// whole operation.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> DomainResult<Vec<StoredEvent>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: atelier_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_guarded(aggregate_id, aggregate_type, command, make_aggregate, |_, _| {
            Ok(())
        })
    }

    /// Like [`dispatch`](Self::dispatch), with a guard evaluated between
    /// decide and append.
    ///
    /// The guard sees the rehydrated aggregate and the decided events; an
    /// `Err` aborts the dispatch with nothing written. This is where
    /// cross-aggregate checks (availability, committed stock) hook in while
    /// still enjoying the optimistic version check on the final append.
    pub fn dispatch_guarded<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
        guard: impl FnOnce(&A, &[A::Event]) -> DomainResult<()>,
    ) -> DomainResult<Vec<StoredEvent>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: atelier_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_type, aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Guard (cross-aggregate checks; still no mutation)
        guard(&aggregate, &decided)?;

        // 5) Persist (append-only, optimistic)
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        Ok(committed)
    }

    /// Rehydrate one aggregate from its stream without dispatching anything.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> DomainResult<A>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_type, aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Rehydrate every aggregate of one type.
    ///
    /// Acceptable for the in-memory book sizes this core targets; a real
    /// backend would answer these reads from a projection instead.
    pub fn load_all<A>(
        &self,
        aggregate_type: &str,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> DomainResult<Vec<A>>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let ids = self.store.stream_ids(aggregate_type)?;
        ids.into_iter()
            .map(|id| self.load(id, aggregate_type, &make_aggregate))
            .collect()
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> DomainResult<()> {
    // Defense against a buggy backend: the stream must belong to the
    // requested aggregate and be monotonically increasing by sequence.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DomainError::storage(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DomainError::storage(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> DomainResult<()>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DomainError::storage(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
