use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, AggregateRoot, DomainError, ProductId};
use atelier_events::Event;

/// Why a stock adjustment was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Units acquired (new gowns, repaired items back in rotation). Delta > 0.
    ManualAdd,
    /// Units retired (damage, sale, loss). Delta < 0.
    ManualRemove,
    /// Correction recorded at return time (either sign).
    ReturnCorrection,
}

/// Aggregate root: Product.
///
/// One product is one rentable SKU with a countable pool of identical
/// physical units. The stream of `StockAdjusted` events is the stock ledger;
/// `owned_units` is its running sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    /// Fee for one rental period, in the smallest currency unit.
    rental_fee: u64,
    owned: i64,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            rental_fee: 0,
            owned: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rental_fee(&self) -> u64 {
        self.rental_fee
    }

    /// Physical units owned. Never negative (ledger invariant).
    pub fn owned_units(&self) -> i64 {
        self.owned
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProduct.
///
/// Registration starts at zero owned units; initial stock arrives through
/// `AdjustStock` so the adjustment log stays complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub product_id: ProductId,
    pub name: String,
    pub rental_fee: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    RegisterProduct(RegisterProduct),
    AdjustStock(AdjustStock),
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product_id: ProductId,
    pub name: String,
    pub rental_fee: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted. One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductRegistered(ProductRegistered),
    StockAdjusted(StockAdjusted),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "inventory.product.registered",
            ProductEvent::StockAdjusted(_) => "inventory.product.stock_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductRegistered(e) => e.occurred_at,
            ProductEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.rental_fee = e.rental_fee;
                self.owned = 0;
                self.created = true;
            }
            ProductEvent::StockAdjusted(e) => {
                self.owned += e.delta;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            ProductCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl Product {
    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation("product already registered"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        // Order totals are signed; a fee past i64 would wrap them.
        if cmd.rental_fee > i64::MAX as u64 {
            return Err(DomainError::validation(
                "rental fee exceeds the representable range",
            ));
        }

        Ok(vec![ProductEvent::ProductRegistered(ProductRegistered {
            product_id: cmd.product_id,
            name: cmd.name.clone(),
            rental_fee: cmd.rental_fee,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::UnknownProduct(self.id));
        }

        if cmd.delta == 0 {
            return Err(DomainError::validation("adjustment delta cannot be zero"));
        }
        match cmd.reason {
            AdjustmentReason::ManualAdd if cmd.delta < 0 => {
                return Err(DomainError::validation(
                    "manual additions must carry a positive delta",
                ));
            }
            AdjustmentReason::ManualRemove if cmd.delta > 0 => {
                return Err(DomainError::validation(
                    "manual removals must carry a negative delta",
                ));
            }
            _ => {}
        }

        if self.owned + cmd.delta < 0 {
            return Err(DomainError::InvalidAdjustment {
                product_id: self.id,
                owned: self.owned,
                committed: 0,
                delta: cmd.delta,
            });
        }

        Ok(vec![ProductEvent::StockAdjusted(StockAdjusted {
            product_id: cmd.product_id,
            delta: cmd.delta,
            reason: cmd.reason,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product_id() -> ProductId {
        ProductId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(id: ProductId) -> Product {
        let mut product = Product::empty(id);
        let events = product
            .handle(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id: id,
                name: "Dress-A".to_string(),
                rental_fee: 50_000,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        product
    }

    fn adjust(product: &mut Product, delta: i64, reason: AdjustmentReason) -> Result<(), DomainError> {
        let events = product.handle(&ProductCommand::AdjustStock(AdjustStock {
            product_id: product.id_typed(),
            delta,
            reason,
            occurred_at: test_time(),
        }))?;
        for e in &events {
            product.apply(e);
        }
        Ok(())
    }

    #[test]
    fn register_starts_with_zero_owned_units() {
        let product = registered(test_product_id());
        assert_eq!(product.owned_units(), 0);
        assert_eq!(product.rental_fee(), 50_000);
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn register_rejects_blank_name() {
        let id = test_product_id();
        let product = Product::empty(id);
        let err = product
            .handle(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id: id,
                name: " ".to_string(),
                rental_fee: 100,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_rejects_fee_beyond_signed_range() {
        let id = test_product_id();
        let product = Product::empty(id);
        let err = product
            .handle(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id: id,
                name: "Dress-A".to_string(),
                rental_fee: i64::MAX as u64 + 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn adjustments_accumulate_into_owned_units() {
        let mut product = registered(test_product_id());
        adjust(&mut product, 5, AdjustmentReason::ManualAdd).unwrap();
        adjust(&mut product, -2, AdjustmentReason::ManualRemove).unwrap();
        adjust(&mut product, 1, AdjustmentReason::ReturnCorrection).unwrap();
        assert_eq!(product.owned_units(), 4);
    }

    #[test]
    fn adjustment_below_zero_is_rejected_and_ledger_unchanged() {
        let id = test_product_id();
        let mut product = registered(id);
        adjust(&mut product, 2, AdjustmentReason::ManualAdd).unwrap();

        let err = adjust(&mut product, -3, AdjustmentReason::ManualRemove).unwrap_err();
        match err {
            DomainError::InvalidAdjustment {
                product_id,
                owned,
                delta,
                ..
            } => {
                assert_eq!(product_id, id);
                assert_eq!(owned, 2);
                assert_eq!(delta, -3);
            }
            _ => panic!("expected InvalidAdjustment"),
        }
        assert_eq!(product.owned_units(), 2);
    }

    #[test]
    fn zero_delta_is_rejected() {
        let mut product = registered(test_product_id());
        let err = adjust(&mut product, 0, AdjustmentReason::ReturnCorrection).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn reason_and_sign_must_agree() {
        let mut product = registered(test_product_id());
        adjust(&mut product, 3, AdjustmentReason::ManualAdd).unwrap();

        assert!(matches!(
            adjust(&mut product, -1, AdjustmentReason::ManualAdd).unwrap_err(),
            DomainError::Validation(_)
        ));
        assert!(matches!(
            adjust(&mut product, 1, AdjustmentReason::ManualRemove).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn adjusting_unregistered_product_is_unknown() {
        let id = test_product_id();
        let product = Product::empty(id);
        let err = product
            .handle(&ProductCommand::AdjustStock(AdjustStock {
                product_id: id,
                delta: 1,
                reason: AdjustmentReason::ManualAdd,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::UnknownProduct(id));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let product = registered(test_product_id());
        let before = product.clone();
        let cmd = ProductCommand::AdjustStock(AdjustStock {
            product_id: product.id_typed(),
            delta: 4,
            reason: AdjustmentReason::ManualAdd,
            occurred_at: test_time(),
        });

        let events1 = product.handle(&cmd).unwrap();
        let events2 = product.handle(&cmd).unwrap();

        assert_eq!(product, before);
        assert_eq!(events1, events2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: for any sequence of attempted adjustments, owned
            /// units never go negative and always equal the sum of the
            /// deltas that were accepted.
            #[test]
            fn owned_units_equal_sum_of_accepted_deltas(
                deltas in prop::collection::vec(-5i64..8i64, 0..40)
            ) {
                let mut product = registered(test_product_id());
                let mut accepted_sum: i64 = 0;

                for delta in deltas {
                    if delta == 0 {
                        continue;
                    }
                    if adjust(&mut product, delta, AdjustmentReason::ReturnCorrection).is_ok() {
                        accepted_sum += delta;
                    }
                    prop_assert!(product.owned_units() >= 0);
                    prop_assert_eq!(product.owned_units(), accepted_sum);
                }
            }

            /// Property: a rejected adjustment leaves the aggregate untouched.
            #[test]
            fn rejected_adjustment_changes_nothing(extra in 1i64..10) {
                let mut product = registered(test_product_id());
                adjust(&mut product, 3, AdjustmentReason::ManualAdd).unwrap();
                let before = product.clone();

                let overdraw = -(product.owned_units() + extra);
                prop_assert!(
                    adjust(&mut product, overdraw, AdjustmentReason::ManualRemove).is_err()
                );
                prop_assert_eq!(product, before);
            }
        }
    }
}
