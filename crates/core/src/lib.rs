//! `atelier-core` — domain foundation for the rental back office.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error taxonomy, and the aggregate
//! execution traits shared by every business module.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, Shortfall};
pub use id::{AggregateId, CustomerId, OrderId, PaymentId, ProductId};
