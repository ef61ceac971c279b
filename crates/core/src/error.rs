//! Domain error model.

use thiserror::Error;

use crate::id::{CustomerId, OrderId, ProductId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// One over-committed product in a rejected reservation attempt.
///
/// `requested` is the total quantity the order asks for over its date range;
/// `available` is what the availability calculator found free. `available`
/// may be negative when historical data has drifted below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub product_id: ProductId,
    pub requested: i64,
    pub available: i64,
}

impl Shortfall {
    /// Units missing for this product (always positive for a reported shortfall).
    pub fn missing(&self) -> i64 {
        self.requested - self.available
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business failures. Every operation on
/// the command/query surface returns one of these; none of them is retried
/// automatically by the core. `ConcurrentModification` is the one variant
/// documented as safe to retry: guard evaluation is side-effect-free until
/// commit, so replaying the whole operation is always sound.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (non-positive quantity, inverted date range, ...).
    /// Rejected before any state is touched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A stock adjustment would leave the product below zero owned units,
    /// or below the quantity currently committed to live reservations.
    #[error(
        "invalid adjustment for product {product_id}: owned {owned}, committed {committed}, delta {delta}"
    )]
    InvalidAdjustment {
        product_id: ProductId,
        owned: i64,
        committed: i64,
        delta: i64,
    },

    /// A lifecycle guard failed; the order is unchanged. When the guard was
    /// the availability check, `shortfalls` lists each over-committed product.
    #[error("illegal transition: {detail}")]
    IllegalTransition {
        detail: String,
        shortfalls: Vec<Shortfall>,
    },

    /// Dangling customer reference.
    #[error("unknown customer: {0}")]
    UnknownCustomer(CustomerId),

    /// Dangling product reference.
    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),

    /// Dangling order reference.
    #[error("unknown order: {0}")]
    UnknownOrder(OrderId),

    /// An optimistic version check lost a race. Safe to retry the whole
    /// operation; never patch state.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Stored state could not be decoded (infrastructure fault).
    #[error("storage fault: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn illegal_transition(detail: impl Into<String>) -> Self {
        Self::IllegalTransition {
            detail: detail.into(),
            shortfalls: Vec::new(),
        }
    }

    /// Build the availability-guard failure from a non-empty shortfall list.
    pub fn insufficient_availability(shortfalls: Vec<Shortfall>) -> Self {
        let listing = shortfalls
            .iter()
            .map(|s| format!("{} short by {}", s.product_id, s.missing()))
            .collect::<Vec<_>>()
            .join(", ");
        Self::IllegalTransition {
            detail: format!("insufficient availability: {listing}"),
            shortfalls,
        }
    }

    pub fn concurrent(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfall_missing_is_requested_minus_available() {
        let s = Shortfall {
            product_id: ProductId::new(),
            requested: 3,
            available: 1,
        };
        assert_eq!(s.missing(), 2);
    }

    #[test]
    fn insufficient_availability_names_each_product() {
        let product_id = ProductId::new();
        let err = DomainError::insufficient_availability(vec![Shortfall {
            product_id,
            requested: 2,
            available: 0,
        }]);
        match &err {
            DomainError::IllegalTransition { detail, shortfalls } => {
                assert!(detail.contains(&product_id.to_string()));
                assert!(detail.contains("short by 2"));
                assert_eq!(shortfalls.len(), 1);
            }
            _ => panic!("expected IllegalTransition"),
        }
    }
}
