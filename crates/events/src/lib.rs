//! Domain events for the rental back office.
//!
//! Every state change in the system is recorded as an immutable event; the
//! event streams double as the audit ledger required by the business
//! (stock adjustments, payment entries) so nothing here is ever edited or
//! deleted after the fact.

pub mod event;

pub use event::Event;
