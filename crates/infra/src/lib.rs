//! Infrastructure: event store, command pipeline, reservation coordinator.
//!
//! Domain crates stay pure; this crate is where streams are persisted,
//! commands are executed against them, and the cross-aggregate guards run.

pub mod command_dispatcher;
pub mod coordinator;
pub mod event_store;

pub use command_dispatcher::CommandDispatcher;
pub use coordinator::ReservationCoordinator;
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
