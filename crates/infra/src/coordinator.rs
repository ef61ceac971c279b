//! Reservation coordinator: the single entry point for commands and queries.
//!
//! The aggregates enforce their local invariants; everything that spans
//! aggregates lives here. Two checks need that reach:
//!
//! - confirming or revising a reservation must see every other live order
//!   for the products involved, and
//! - shrinking a product's pool must not cut under what live reservations
//!   have already committed.
//!
//! Both are serialized per product: the coordinator holds a mutex per
//! product id, taken in sorted order, across the check-then-append window.
//! Everything else relies on the store's optimistic version check alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, Utc};

use atelier_core::{
    Aggregate, AggregateRoot, CustomerId, DomainError, DomainResult, OrderId, PaymentId, ProductId,
};
use atelier_inventory::{AdjustStock, AdjustmentReason, Product, ProductCommand, RegisterProduct};
use atelier_parties::{ContactInfo, Customer, CustomerCommand, RegisterCustomer, UpdateContact};
use atelier_payments::{
    PaymentKind, PaymentLedger, PaymentLedgerCommand, PaymentMethod, RecordPayment,
};
use atelier_rentals::{
    availability_calendar, available_units, peak_committed_units, reservation_shortfalls,
    CancelOrder, ConfirmReservation, DayAvailability, DraftOrder, LineItem, MarkPickedUp,
    MarkReturned, RentalOrder, RentalOrderCommand, ReviseOrder,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;

const CUSTOMER_STREAM: &str = "parties.customer";
const PRODUCT_STREAM: &str = "inventory.product";
const ORDER_STREAM: &str = "rentals.order";
const PAYMENT_STREAM: &str = "payments.ledger";

/// Attempts to acquire a lock set that still covers the order's lines
/// before giving up with `ConcurrentModification`.
const LOCK_RETRIES: usize = 8;

/// Application service over the event store.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ReservationCoordinator<S> {
    dispatcher: CommandDispatcher<S>,
    product_locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
}

impl<S> ReservationCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
            product_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }

    fn lock_handle(&self, product_id: ProductId) -> Arc<Mutex<()>> {
        let mut locks = self
            .product_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(product_id).or_default().clone()
    }

    /// Lock handles for a set of products, sorted by id so concurrent
    /// multi-product operations cannot deadlock.
    fn lock_handles(&self, ids: &[ProductId]) -> Vec<Arc<Mutex<()>>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        ids.into_iter().map(|id| self.lock_handle(id)).collect()
    }
}

impl<S> ReservationCoordinator<S>
where
    S: EventStore,
{
    // ---- parties ----

    pub fn register_customer(
        &self,
        name: impl Into<String>,
        contact: Option<ContactInfo>,
    ) -> DomainResult<CustomerId> {
        let customer_id = CustomerId::new();
        let cmd = CustomerCommand::RegisterCustomer(RegisterCustomer {
            customer_id,
            name: name.into(),
            contact,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(customer_id.into(), CUSTOMER_STREAM, &cmd, empty_customer)?;
        tracing::info!(%customer_id, "customer registered");
        Ok(customer_id)
    }

    pub fn update_customer_contact(
        &self,
        customer_id: CustomerId,
        contact: ContactInfo,
    ) -> DomainResult<()> {
        let cmd = CustomerCommand::UpdateContact(UpdateContact {
            customer_id,
            contact,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(customer_id.into(), CUSTOMER_STREAM, &cmd, empty_customer)?;
        Ok(())
    }

    pub fn customer(&self, customer_id: CustomerId) -> DomainResult<Customer> {
        let customer: Customer =
            self.dispatcher
                .load(customer_id.into(), CUSTOMER_STREAM, empty_customer)?;
        if customer.version() == 0 {
            return Err(DomainError::UnknownCustomer(customer_id));
        }
        Ok(customer)
    }

    // ---- inventory ----

    pub fn register_product(
        &self,
        name: impl Into<String>,
        rental_fee: u64,
    ) -> DomainResult<ProductId> {
        let product_id = ProductId::new();
        let cmd = ProductCommand::RegisterProduct(RegisterProduct {
            product_id,
            name: name.into(),
            rental_fee,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(product_id.into(), PRODUCT_STREAM, &cmd, empty_product)?;
        tracing::info!(%product_id, "product registered");
        Ok(product_id)
    }

    /// Append one entry to a product's stock ledger.
    ///
    /// Negative deltas are additionally checked against the peak commitment
    /// of live reservations: the pool may never shrink under what is
    /// already promised. The check and the append run under the product's
    /// lock so no confirmation can slip in between.
    pub fn adjust_stock(
        &self,
        product_id: ProductId,
        delta: i64,
        reason: AdjustmentReason,
    ) -> DomainResult<()> {
        let handles = self.lock_handles(&[product_id]);
        let _guards = acquire(&handles);

        let cmd = ProductCommand::AdjustStock(AdjustStock {
            product_id,
            delta,
            reason,
            occurred_at: Utc::now(),
        });
        self.dispatcher.dispatch_guarded(
            product_id.into(),
            PRODUCT_STREAM,
            &cmd,
            empty_product,
            |product: &Product, _| {
                if delta >= 0 {
                    return Ok(());
                }
                let orders = self.orders()?;
                let committed = peak_committed_units(product_id, &orders);
                if product.owned_units() + delta < committed {
                    return Err(DomainError::InvalidAdjustment {
                        product_id,
                        owned: product.owned_units(),
                        committed,
                        delta,
                    });
                }
                Ok(())
            },
        )?;
        tracing::info!(%product_id, delta, "stock adjusted");
        Ok(())
    }

    pub fn product(&self, product_id: ProductId) -> DomainResult<Product> {
        let product: Product =
            self.dispatcher
                .load(product_id.into(), PRODUCT_STREAM, empty_product)?;
        if product.version() == 0 {
            return Err(DomainError::UnknownProduct(product_id));
        }
        Ok(product)
    }

    // ---- availability (pure reads, recomputed on every call) ----

    pub fn available_units(
        &self,
        product_id: ProductId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DomainResult<i64> {
        if from > to {
            return Err(DomainError::validation("query range is inverted"));
        }
        let product = self.product(product_id)?;
        let orders = self.orders()?;
        Ok(available_units(&product, &orders, from, to, None))
    }

    pub fn availability_calendar(
        &self,
        product_id: ProductId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DomainResult<Vec<DayAvailability>> {
        if from > to {
            return Err(DomainError::validation("query range is inverted"));
        }
        let product = self.product(product_id)?;
        let orders = self.orders()?;
        Ok(availability_calendar(&product, &orders, from, to))
    }

    // ---- orders ----

    /// Draft a new order. No stock effect; drafting always succeeds even
    /// when the requested quantities are not available.
    ///
    /// Unit fees are captured from the products at draft time, so later fee
    /// changes never reprice an existing order.
    pub fn create_draft_order(
        &self,
        customer_id: CustomerId,
        lines: &[(ProductId, i64)],
        reserve_date: NaiveDate,
        return_date: NaiveDate,
    ) -> DomainResult<OrderId> {
        self.customer(customer_id)?;
        let lines = self.resolve_lines(lines)?;

        let order_id = OrderId::new();
        let cmd = RentalOrderCommand::DraftOrder(DraftOrder {
            order_id,
            customer_id,
            lines,
            reserve_date,
            return_date,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(order_id.into(), ORDER_STREAM, &cmd, empty_order)?;
        tracing::info!(%order_id, %customer_id, "order drafted");
        Ok(order_id)
    }

    /// Replace an order's lines and dates.
    ///
    /// On a Draft the revision is unconditional. On a Reserved order the
    /// revised shape is re-checked against the rest of the book (excluding
    /// the order itself) before anything is written.
    pub fn revise_order(
        &self,
        order_id: OrderId,
        lines: &[(ProductId, i64)],
        reserve_date: NaiveDate,
        return_date: NaiveDate,
    ) -> DomainResult<()> {
        let new_lines = self.resolve_lines(lines)?;

        // Lock the union of old and new products; releasing one product
        // and claiming another are both stock movements.
        let extra: Vec<ProductId> = new_lines.iter().map(|l| l.product_id).collect();
        self.with_order_locks(order_id, &extra, |_| {
            let cmd = RentalOrderCommand::ReviseOrder(ReviseOrder {
                order_id,
                lines: new_lines.clone(),
                reserve_date,
                return_date,
                occurred_at: Utc::now(),
            });
            self.dispatcher.dispatch_guarded(
                order_id.into(),
                ORDER_STREAM,
                &cmd,
                empty_order,
                |order, events| self.check_candidate(order, events, false),
            )
        })?;
        tracing::info!(%order_id, "order revised");
        Ok(())
    }

    /// Confirm a Draft, committing its lines against each product's pool.
    ///
    /// The availability check and the append run under the locks of every
    /// product on the order, so two overlapping confirmations for the same
    /// product are serialized and the loser sees the winner's commitment.
    pub fn confirm_reservation(&self, order_id: OrderId) -> DomainResult<()> {
        self.with_order_locks(order_id, &[], |_| {
            self.dispatcher.dispatch_guarded(
                order_id.into(),
                ORDER_STREAM,
                &RentalOrderCommand::ConfirmReservation(ConfirmReservation {
                    order_id,
                    occurred_at: Utc::now(),
                }),
                empty_order,
                |order, events| self.check_candidate(order, events, true),
            )
        })?;
        tracing::info!(%order_id, "reservation confirmed");
        Ok(())
    }

    pub fn mark_picked_up(&self, order_id: OrderId, picked_up_on: NaiveDate) -> DomainResult<()> {
        self.dispatcher.dispatch(
            order_id.into(),
            ORDER_STREAM,
            &RentalOrderCommand::MarkPickedUp(MarkPickedUp {
                order_id,
                picked_up_on,
                occurred_at: Utc::now(),
            }),
            empty_order,
        )?;
        tracing::info!(%order_id, "order picked up");
        Ok(())
    }

    pub fn mark_returned(&self, order_id: OrderId) -> DomainResult<()> {
        self.dispatcher.dispatch(
            order_id.into(),
            ORDER_STREAM,
            &RentalOrderCommand::MarkReturned(MarkReturned {
                order_id,
                occurred_at: Utc::now(),
            }),
            empty_order,
        )?;
        tracing::info!(%order_id, "order returned");
        Ok(())
    }

    /// Cancel a non-terminal order. Cancelling a Reserved or PickedUp order
    /// releases its commitment; no availability check is needed because
    /// commitment only shrinks.
    pub fn cancel_order(&self, order_id: OrderId) -> DomainResult<()> {
        self.dispatcher.dispatch(
            order_id.into(),
            ORDER_STREAM,
            &RentalOrderCommand::CancelOrder(CancelOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            empty_order,
        )?;
        tracing::info!(%order_id, "order cancelled");
        Ok(())
    }

    pub fn order(&self, order_id: OrderId) -> DomainResult<RentalOrder> {
        let order: RentalOrder = self
            .dispatcher
            .load(order_id.into(), ORDER_STREAM, empty_order)?;
        if order.version() == 0 {
            return Err(DomainError::UnknownOrder(order_id));
        }
        Ok(order)
    }

    // ---- payments ----

    /// Record a payment against an order's ledger.
    ///
    /// Structurally independent of inventory; the only referential demand
    /// is that the order exists. Refund entries carry a negative amount.
    pub fn record_payment(
        &self,
        order_id: OrderId,
        amount: i64,
        kind: PaymentKind,
        method: PaymentMethod,
        paid_on: NaiveDate,
    ) -> DomainResult<PaymentId> {
        let order = self.order(order_id)?;
        let customer_id = order
            .customer_id()
            .ok_or(DomainError::UnknownOrder(order_id))?;

        let payment_id = PaymentId::new();
        let cmd = PaymentLedgerCommand::RecordPayment(RecordPayment {
            payment_id,
            order_id,
            customer_id,
            amount,
            kind,
            method,
            paid_on,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(order_id.into(), PAYMENT_STREAM, &cmd, empty_ledger)?;
        tracing::info!(%order_id, %payment_id, amount, "payment recorded");
        Ok(payment_id)
    }

    /// Issue a refund of `amount` (given as a positive magnitude).
    ///
    /// Appends a Refund entry with a negative amount; history is never
    /// edited.
    pub fn issue_refund(
        &self,
        order_id: OrderId,
        amount: i64,
        method: PaymentMethod,
        paid_on: NaiveDate,
    ) -> DomainResult<PaymentId> {
        if amount <= 0 {
            return Err(DomainError::validation("refund amount must be positive"));
        }
        self.record_payment(order_id, -amount, PaymentKind::Refund, method, paid_on)
    }

    /// What is still owed on an order: total fee minus the signed sum of
    /// its ledger. Zero or negative means fully paid.
    pub fn order_balance(&self, order_id: OrderId) -> DomainResult<i64> {
        let order = self.order(order_id)?;
        let ledger = self.ledger(order_id)?;
        Ok(ledger.balance(order.total_fee()))
    }

    pub fn ledger(&self, order_id: OrderId) -> DomainResult<PaymentLedger> {
        self.dispatcher
            .load(order_id.into(), PAYMENT_STREAM, empty_ledger)
    }

    // ---- internals ----

    fn orders(&self) -> DomainResult<Vec<RentalOrder>> {
        self.dispatcher.load_all(ORDER_STREAM, empty_order)
    }

    /// Run `op` while holding the locks of every product on the order
    /// (plus `extra`, for revisions that introduce new products).
    ///
    /// The lock set is computed from a snapshot, so a revision landing
    /// between the snapshot and the acquisition can change which products
    /// the order touches. After acquiring, the order is reloaded and the
    /// held set verified against its current lines; on a mismatch the
    /// stale locks are dropped and the acquisition retried. `op` runs
    /// entirely under a covering lock set.
    fn with_order_locks<T>(
        &self,
        order_id: OrderId,
        extra: &[ProductId],
        mut op: impl FnMut(&RentalOrder) -> DomainResult<T>,
    ) -> DomainResult<T> {
        for _ in 0..LOCK_RETRIES {
            let snapshot = self.order(order_id)?;
            let mut involved: Vec<ProductId> =
                snapshot.lines().iter().map(|l| l.product_id).collect();
            involved.extend_from_slice(extra);
            let handles = self.lock_handles(&involved);
            let _guards = acquire(&handles);

            let current = self.order(order_id)?;
            let covered = current
                .lines()
                .iter()
                .all(|l| involved.contains(&l.product_id));
            if !covered {
                continue;
            }
            return op(&current);
        }
        Err(DomainError::concurrent(format!(
            "lock set for order {order_id} kept changing under concurrent revisions"
        )))
    }

    fn resolve_lines(&self, lines: &[(ProductId, i64)]) -> DomainResult<Vec<LineItem>> {
        lines
            .iter()
            .map(|&(product_id, quantity)| {
                let product = self.product(product_id)?;
                Ok(LineItem {
                    product_id,
                    quantity,
                    unit_fee: product.rental_fee(),
                })
            })
            .collect()
    }

    /// Availability guard shared by confirm and revise: apply the decided
    /// events to a copy of the order and check the resulting shape against
    /// the rest of the book. `always` forces the check regardless of the
    /// candidate's status (a confirmation always commits).
    fn check_candidate(
        &self,
        order: &RentalOrder,
        events: &[<RentalOrder as Aggregate>::Event],
        always: bool,
    ) -> DomainResult<()> {
        let mut candidate = order.clone();
        for event in events {
            candidate.apply(event);
        }
        if !always && !candidate.status().commits_stock() {
            return Ok(());
        }

        let products = candidate
            .lines()
            .iter()
            .map(|line| self.product(line.product_id))
            .collect::<DomainResult<Vec<Product>>>()?;
        let orders = self.orders()?;

        let shortfalls = reservation_shortfalls(&candidate, &products, &orders);
        if !shortfalls.is_empty() {
            return Err(DomainError::insufficient_availability(shortfalls));
        }
        Ok(())
    }
}

fn empty_customer(id: atelier_core::AggregateId) -> Customer {
    Customer::empty(CustomerId::from_uuid(*id.as_uuid()))
}

fn empty_product(id: atelier_core::AggregateId) -> Product {
    Product::empty(ProductId::from_uuid(*id.as_uuid()))
}

fn empty_order(id: atelier_core::AggregateId) -> RentalOrder {
    RentalOrder::empty(OrderId::from_uuid(*id.as_uuid()))
}

fn empty_ledger(id: atelier_core::AggregateId) -> PaymentLedger {
    PaymentLedger::empty(OrderId::from_uuid(*id.as_uuid()))
}

fn acquire(handles: &[Arc<Mutex<()>>]) -> Vec<std::sync::MutexGuard<'_, ()>> {
    handles
        .iter()
        .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
        .collect()
}
