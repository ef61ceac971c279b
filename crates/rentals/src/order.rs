use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, AggregateRoot, CustomerId, DomainError, OrderId, ProductId};
use atelier_events::Event;

/// One line of a rental order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Fee per unit for one rental period, captured from the product at
    /// draft time so later price changes do not rewrite open orders.
    pub unit_fee: u64,
}

/// Rental order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Reserved,
    PickedUp,
    Returned,
    Cancelled,
}

impl OrderStatus {
    /// Reserved and PickedUp orders hold their units against the pool.
    pub fn commits_stock(self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::PickedUp)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Returned | OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Reserved => "reserved",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Returned => "returned",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Aggregate root: RentalOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalOrder {
    id: OrderId,
    customer_id: Option<CustomerId>,
    lines: Vec<LineItem>,
    reserve_date: NaiveDate,
    return_date: NaiveDate,
    status: OrderStatus,
    version: u64,
    created: bool,
}

impl RentalOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            customer_id: None,
            lines: Vec::new(),
            reserve_date: NaiveDate::MIN,
            return_date: NaiveDate::MIN,
            status: OrderStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn reserve_date(&self) -> NaiveDate {
        self.reserve_date
    }

    pub fn return_date(&self) -> NaiveDate {
        self.return_date
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Closed-interval overlap test against another date range. Touching
    /// endpoints count as overlapping: a gown returned on the 3rd cannot go
    /// out again on the 3rd (no same-day turnover).
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        from <= self.return_date && to >= self.reserve_date
    }

    /// Total quantity of one product across all lines.
    pub fn quantity_of(&self, product_id: ProductId) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Total cost of the order (one rental period per order).
    ///
    /// Saturates instead of wrapping on absurd quantities or fees; a
    /// saturated total still compares sanely against payments.
    pub fn total_fee(&self) -> i64 {
        self.lines.iter().fold(0i64, |total, l| {
            let fee = i64::try_from(l.unit_fee).unwrap_or(i64::MAX);
            total.saturating_add(l.quantity.saturating_mul(fee))
        })
    }

    /// Line items and dates may only change while Draft or Reserved.
    pub fn is_revisable(&self) -> bool {
        matches!(self.status, OrderStatus::Draft | OrderStatus::Reserved)
    }
}

impl AggregateRoot for RentalOrder {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: DraftOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOrder {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub lines: Vec<LineItem>,
    pub reserve_date: NaiveDate,
    pub return_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseOrder (replace line items and/or dates).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseOrder {
    pub order_id: OrderId,
    pub lines: Vec<LineItem>,
    pub reserve_date: NaiveDate,
    pub return_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmReservation (Draft -> Reserved).
///
/// The availability guard is evaluated by the coordinator, which serializes
/// confirmations per product; the aggregate enforces the local guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmReservation {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPickedUp (Reserved -> PickedUp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPickedUp {
    pub order_id: OrderId,
    /// The business date of the pickup; must not precede the reserve date.
    pub picked_up_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReturned (PickedUp -> Returned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReturned {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder (any non-terminal status -> Cancelled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalOrderCommand {
    DraftOrder(DraftOrder),
    ReviseOrder(ReviseOrder),
    ConfirmReservation(ConfirmReservation),
    MarkPickedUp(MarkPickedUp),
    MarkReturned(MarkReturned),
    CancelOrder(CancelOrder),
}

/// Event: OrderDrafted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDrafted {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub lines: Vec<LineItem>,
    pub reserve_date: NaiveDate,
    pub return_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRevised {
    pub order_id: OrderId,
    pub lines: Vec<LineItem>,
    pub reserve_date: NaiveDate,
    pub return_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReserved {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderPickedUp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPickedUp {
    pub order_id: OrderId,
    pub picked_up_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReturned {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalOrderEvent {
    OrderDrafted(OrderDrafted),
    OrderRevised(OrderRevised),
    OrderReserved(OrderReserved),
    OrderPickedUp(OrderPickedUp),
    OrderReturned(OrderReturned),
    OrderCancelled(OrderCancelled),
}

impl Event for RentalOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RentalOrderEvent::OrderDrafted(_) => "rentals.order.drafted",
            RentalOrderEvent::OrderRevised(_) => "rentals.order.revised",
            RentalOrderEvent::OrderReserved(_) => "rentals.order.reserved",
            RentalOrderEvent::OrderPickedUp(_) => "rentals.order.picked_up",
            RentalOrderEvent::OrderReturned(_) => "rentals.order.returned",
            RentalOrderEvent::OrderCancelled(_) => "rentals.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RentalOrderEvent::OrderDrafted(e) => e.occurred_at,
            RentalOrderEvent::OrderRevised(e) => e.occurred_at,
            RentalOrderEvent::OrderReserved(e) => e.occurred_at,
            RentalOrderEvent::OrderPickedUp(e) => e.occurred_at,
            RentalOrderEvent::OrderReturned(e) => e.occurred_at,
            RentalOrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for RentalOrder {
    type Command = RentalOrderCommand;
    type Event = RentalOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RentalOrderEvent::OrderDrafted(e) => {
                self.id = e.order_id;
                self.customer_id = Some(e.customer_id);
                self.lines = e.lines.clone();
                self.reserve_date = e.reserve_date;
                self.return_date = e.return_date;
                self.status = OrderStatus::Draft;
                self.created = true;
            }
            RentalOrderEvent::OrderRevised(e) => {
                self.lines = e.lines.clone();
                self.reserve_date = e.reserve_date;
                self.return_date = e.return_date;
            }
            RentalOrderEvent::OrderReserved(_) => {
                self.status = OrderStatus::Reserved;
            }
            RentalOrderEvent::OrderPickedUp(_) => {
                self.status = OrderStatus::PickedUp;
            }
            RentalOrderEvent::OrderReturned(_) => {
                self.status = OrderStatus::Returned;
            }
            RentalOrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RentalOrderCommand::DraftOrder(cmd) => self.handle_draft(cmd),
            RentalOrderCommand::ReviseOrder(cmd) => self.handle_revise(cmd),
            RentalOrderCommand::ConfirmReservation(cmd) => self.handle_confirm(cmd),
            RentalOrderCommand::MarkPickedUp(cmd) => self.handle_picked_up(cmd),
            RentalOrderCommand::MarkReturned(cmd) => self.handle_returned(cmd),
            RentalOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

fn validate_lines(lines: &[LineItem]) -> Result<(), DomainError> {
    for line in lines {
        if line.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "line quantity must be positive (product {})",
                line.product_id
            )));
        }
    }
    Ok(())
}

fn validate_dates(reserve_date: NaiveDate, return_date: NaiveDate) -> Result<(), DomainError> {
    if reserve_date > return_date {
        return Err(DomainError::validation(
            "reserve date must not be after return date",
        ));
    }
    Ok(())
}

impl RentalOrder {
    fn handle_draft(&self, cmd: &DraftOrder) -> Result<Vec<RentalOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation("order already exists"));
        }
        validate_lines(&cmd.lines)?;
        validate_dates(cmd.reserve_date, cmd.return_date)?;

        Ok(vec![RentalOrderEvent::OrderDrafted(OrderDrafted {
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            lines: cmd.lines.clone(),
            reserve_date: cmd.reserve_date,
            return_date: cmd.return_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseOrder) -> Result<Vec<RentalOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::UnknownOrder(self.id));
        }
        if !self.is_revisable() {
            return Err(DomainError::illegal_transition(format!(
                "order in status {} cannot be revised",
                self.status
            )));
        }
        validate_lines(&cmd.lines)?;
        validate_dates(cmd.reserve_date, cmd.return_date)?;

        Ok(vec![RentalOrderEvent::OrderRevised(OrderRevised {
            order_id: cmd.order_id,
            lines: cmd.lines.clone(),
            reserve_date: cmd.reserve_date,
            return_date: cmd.return_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(
        &self,
        cmd: &ConfirmReservation,
    ) -> Result<Vec<RentalOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::UnknownOrder(self.id));
        }
        if self.status != OrderStatus::Draft {
            return Err(DomainError::illegal_transition(format!(
                "only draft orders can be reserved (status is {})",
                self.status
            )));
        }
        if self.lines.is_empty() {
            return Err(DomainError::illegal_transition(
                "cannot reserve an order without line items",
            ));
        }

        Ok(vec![RentalOrderEvent::OrderReserved(OrderReserved {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_picked_up(&self, cmd: &MarkPickedUp) -> Result<Vec<RentalOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::UnknownOrder(self.id));
        }
        if self.status != OrderStatus::Reserved {
            return Err(DomainError::illegal_transition(format!(
                "only reserved orders can be picked up (status is {})",
                self.status
            )));
        }
        if cmd.picked_up_on < self.reserve_date {
            return Err(DomainError::illegal_transition(format!(
                "pickup on {} precedes reserve date {}",
                cmd.picked_up_on, self.reserve_date
            )));
        }

        Ok(vec![RentalOrderEvent::OrderPickedUp(OrderPickedUp {
            order_id: cmd.order_id,
            picked_up_on: cmd.picked_up_on,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_returned(&self, cmd: &MarkReturned) -> Result<Vec<RentalOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::UnknownOrder(self.id));
        }
        if self.status != OrderStatus::PickedUp {
            return Err(DomainError::illegal_transition(format!(
                "only picked-up orders can be returned (status is {})",
                self.status
            )));
        }

        Ok(vec![RentalOrderEvent::OrderReturned(OrderReturned {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<RentalOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::UnknownOrder(self.id));
        }
        if self.status.is_terminal() {
            return Err(DomainError::illegal_transition(format!(
                "order in terminal status {} cannot be cancelled",
                self.status
            )));
        }

        Ok(vec![RentalOrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(quantity: i64) -> LineItem {
        LineItem {
            product_id: ProductId::new(),
            quantity,
            unit_fee: 10_000,
        }
    }

    fn drafted(lines: Vec<LineItem>, from: NaiveDate, to: NaiveDate) -> RentalOrder {
        let id = OrderId::new();
        let mut order = RentalOrder::empty(id);
        let events = order
            .handle(&RentalOrderCommand::DraftOrder(DraftOrder {
                order_id: id,
                customer_id: CustomerId::new(),
                lines,
                reserve_date: from,
                return_date: to,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        order
    }

    fn step(order: &mut RentalOrder, cmd: RentalOrderCommand) -> Result<(), DomainError> {
        let events = order.handle(&cmd)?;
        for e in &events {
            order.apply(e);
        }
        Ok(())
    }

    fn reserved(lines: Vec<LineItem>, from: NaiveDate, to: NaiveDate) -> RentalOrder {
        let mut order = drafted(lines, from, to);
        let id = order.id_typed();
        step(
            &mut order,
            RentalOrderCommand::ConfirmReservation(ConfirmReservation {
                order_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        order
    }

    #[test]
    fn draft_rejects_inverted_dates() {
        let id = OrderId::new();
        let order = RentalOrder::empty(id);
        let err = order
            .handle(&RentalOrderCommand::DraftOrder(DraftOrder {
                order_id: id,
                customer_id: CustomerId::new(),
                lines: vec![line(1)],
                reserve_date: date(2024, 6, 3),
                return_date: date(2024, 6, 1),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn draft_rejects_non_positive_quantity() {
        let id = OrderId::new();
        let order = RentalOrder::empty(id);
        let err = order
            .handle(&RentalOrderCommand::DraftOrder(DraftOrder {
                order_id: id,
                customer_id: CustomerId::new(),
                lines: vec![line(0)],
                reserve_date: date(2024, 6, 1),
                return_date: date(2024, 6, 3),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn full_lifecycle_draft_to_returned() {
        let mut order = drafted(vec![line(2)], date(2024, 6, 1), date(2024, 6, 3));
        let id = order.id_typed();
        assert_eq!(order.status(), OrderStatus::Draft);

        step(
            &mut order,
            RentalOrderCommand::ConfirmReservation(ConfirmReservation {
                order_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.status(), OrderStatus::Reserved);
        assert!(order.status().commits_stock());

        step(
            &mut order,
            RentalOrderCommand::MarkPickedUp(MarkPickedUp {
                order_id: id,
                picked_up_on: date(2024, 6, 1),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.status(), OrderStatus::PickedUp);
        assert!(order.status().commits_stock());

        step(
            &mut order,
            RentalOrderCommand::MarkReturned(MarkReturned {
                order_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.status(), OrderStatus::Returned);
        assert!(!order.status().commits_stock());
        assert!(order.status().is_terminal());
    }

    #[test]
    fn draft_and_cancelled_do_not_commit_stock() {
        let order = drafted(vec![line(1)], date(2024, 6, 1), date(2024, 6, 3));
        assert!(!order.status().commits_stock());

        let mut order = order;
        let id = order.id_typed();
        step(
            &mut order,
            RentalOrderCommand::CancelOrder(CancelOrder {
                order_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(!order.status().commits_stock());
    }

    #[test]
    fn confirm_requires_draft_status() {
        let mut order = reserved(vec![line(1)], date(2024, 6, 1), date(2024, 6, 3));
        let id = order.id_typed();
        let err = step(
            &mut order,
            RentalOrderCommand::ConfirmReservation(ConfirmReservation {
                order_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
        assert_eq!(order.status(), OrderStatus::Reserved);
    }

    #[test]
    fn confirm_rejects_empty_order() {
        let mut order = drafted(vec![], date(2024, 6, 1), date(2024, 6, 3));
        let id = order.id_typed();
        let err = step(
            &mut order,
            RentalOrderCommand::ConfirmReservation(ConfirmReservation {
                order_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
    }

    #[test]
    fn pickup_before_reserve_date_is_rejected() {
        let mut order = reserved(vec![line(1)], date(2024, 6, 10), date(2024, 6, 12));
        let id = order.id_typed();
        let err = step(
            &mut order,
            RentalOrderCommand::MarkPickedUp(MarkPickedUp {
                order_id: id,
                picked_up_on: date(2024, 6, 9),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
        assert_eq!(order.status(), OrderStatus::Reserved);
    }

    #[test]
    fn cancel_from_terminal_status_is_rejected() {
        let mut order = reserved(vec![line(1)], date(2024, 6, 1), date(2024, 6, 3));
        let id = order.id_typed();
        step(
            &mut order,
            RentalOrderCommand::CancelOrder(CancelOrder {
                order_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = step(
            &mut order,
            RentalOrderCommand::CancelOrder(CancelOrder {
                order_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
    }

    #[test]
    fn revise_is_rejected_once_picked_up() {
        let mut order = reserved(vec![line(1)], date(2024, 6, 1), date(2024, 6, 3));
        let id = order.id_typed();
        step(
            &mut order,
            RentalOrderCommand::MarkPickedUp(MarkPickedUp {
                order_id: id,
                picked_up_on: date(2024, 6, 1),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = step(
            &mut order,
            RentalOrderCommand::ReviseOrder(ReviseOrder {
                order_id: id,
                lines: vec![line(2)],
                reserve_date: date(2024, 6, 1),
                return_date: date(2024, 6, 3),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
    }

    #[test]
    fn revise_replaces_lines_and_dates_in_draft() {
        let mut order = drafted(vec![line(1)], date(2024, 6, 1), date(2024, 6, 3));
        let id = order.id_typed();
        let new_line = line(3);
        step(
            &mut order,
            RentalOrderCommand::ReviseOrder(ReviseOrder {
                order_id: id,
                lines: vec![new_line],
                reserve_date: date(2024, 7, 1),
                return_date: date(2024, 7, 2),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(order.lines(), &[new_line]);
        assert_eq!(order.reserve_date(), date(2024, 7, 1));
        assert_eq!(order.return_date(), date(2024, 7, 2));
        assert_eq!(order.status(), OrderStatus::Draft);
    }

    #[test]
    fn overlap_counts_touching_endpoints() {
        let order = reserved(vec![line(1)], date(2024, 6, 1), date(2024, 6, 3));

        assert!(order.overlaps(date(2024, 6, 3), date(2024, 6, 5)));
        assert!(order.overlaps(date(2024, 5, 30), date(2024, 6, 1)));
        assert!(order.overlaps(date(2024, 6, 2), date(2024, 6, 2)));
        assert!(!order.overlaps(date(2024, 6, 4), date(2024, 6, 5)));
        assert!(!order.overlaps(date(2024, 5, 29), date(2024, 5, 31)));
    }

    #[test]
    fn total_fee_sums_quantity_times_unit_fee() {
        let lines = vec![
            LineItem {
                product_id: ProductId::new(),
                quantity: 2,
                unit_fee: 300,
            },
            LineItem {
                product_id: ProductId::new(),
                quantity: 1,
                unit_fee: 400,
            },
        ];
        let order = drafted(lines, date(2024, 6, 1), date(2024, 6, 3));
        assert_eq!(order.total_fee(), 1000);
    }

    #[test]
    fn total_fee_saturates_instead_of_wrapping() {
        let lines = vec![LineItem {
            product_id: ProductId::new(),
            quantity: i64::MAX,
            unit_fee: u64::MAX,
        }];
        let order = drafted(lines, date(2024, 6, 1), date(2024, 6, 3));
        assert_eq!(order.total_fee(), i64::MAX);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let order = drafted(vec![line(1)], date(2024, 6, 1), date(2024, 6, 3));
        let id = order.id_typed();
        let before = order.clone();
        let cmd = RentalOrderCommand::ConfirmReservation(ConfirmReservation {
            order_id: id,
            occurred_at: test_time(),
        });

        let events1 = order.handle(&cmd).unwrap();
        let events2 = order.handle(&cmd).unwrap();

        assert_eq!(order, before);
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

            /// Property: no command sequence ever leaves a terminal status,
            /// and rejected commands never change state.
            #[test]
            fn terminal_states_are_absorbing(seed in prop::collection::vec(0usize..4, 1..20)) {
                let mut order = drafted(vec![line(1)], date(2024, 6, 1), date(2024, 6, 3));

                for pick in seed {
                    let id = order.id_typed();
                    let cmd = match pick {
                        0 => RentalOrderCommand::ConfirmReservation(ConfirmReservation {
                            order_id: id,
                            occurred_at: Utc::now(),
                        }),
                        1 => RentalOrderCommand::MarkPickedUp(MarkPickedUp {
                            order_id: id,
                            picked_up_on: date(2024, 6, 1),
                            occurred_at: Utc::now(),
                        }),
                        2 => RentalOrderCommand::MarkReturned(MarkReturned {
                            order_id: id,
                            occurred_at: Utc::now(),
                        }),
                        _ => RentalOrderCommand::CancelOrder(CancelOrder {
                            order_id: id,
                            occurred_at: Utc::now(),
                        }),
                    };

                    let was_terminal = order.status().is_terminal();
                    let before = order.clone();
                    match order.handle(&cmd) {
                        Ok(events) => {
                            prop_assert!(!was_terminal);
                            for e in &events {
                                order.apply(e);
                            }
                        }
                        Err(_) => prop_assert_eq!(&order, &before),
                    }
                }
            }
        }
    }
}
