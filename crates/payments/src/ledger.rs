use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, AggregateRoot, CustomerId, DomainError, OrderId, PaymentId};
use atelier_events::Event;

/// What a payment is for. Refunds are the only kind with a negative amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Advance,
    Reservation,
    Guarantee,
    Refund,
}

/// How the money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Check,
    Transfer,
}

/// Aggregate root: the payment ledger of one order.
///
/// Shares the order's uuid as its aggregate id, under its own stream
/// type, so looking up an order's payments needs no extra index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLedger {
    order_id: OrderId,
    received_total: i64,
    entries: u64,
    version: u64,
}

impl PaymentLedger {
    /// Create an empty ledger for rehydration. A ledger with no entries
    /// is a valid state; the first recorded payment creates the stream.
    pub fn empty(order_id: OrderId) -> Self {
        Self {
            order_id,
            received_total: 0,
            entries: 0,
            version: 0,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Signed sum of every recorded amount. Refunds subtract.
    pub fn received_total(&self) -> i64 {
        self.received_total
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// What is still owed given the order's total fee. Zero or negative
    /// means fully paid.
    pub fn balance(&self, order_total: i64) -> i64 {
        order_total - self.received_total
    }
}

impl AggregateRoot for PaymentLedger {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.order_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: i64,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    pub paid_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentLedgerCommand {
    RecordPayment(RecordPayment),
}

/// Event: PaymentRecorded. One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: i64,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    pub paid_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentLedgerEvent {
    PaymentRecorded(PaymentRecorded),
}

impl Event for PaymentLedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentLedgerEvent::PaymentRecorded(_) => "payments.ledger.payment_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentLedgerEvent::PaymentRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PaymentLedger {
    type Command = PaymentLedgerCommand;
    type Event = PaymentLedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentLedgerEvent::PaymentRecorded(e) => {
                self.order_id = e.order_id;
                self.received_total += e.amount;
                self.entries += 1;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentLedgerCommand::RecordPayment(cmd) => self.handle_record(cmd),
        }
    }
}

impl PaymentLedger {
    fn handle_record(&self, cmd: &RecordPayment) -> Result<Vec<PaymentLedgerEvent>, DomainError> {
        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount cannot be zero"));
        }
        match cmd.kind {
            PaymentKind::Refund if cmd.amount >= 0 => {
                return Err(DomainError::validation(
                    "refund amount must be negative",
                ));
            }
            PaymentKind::Advance | PaymentKind::Reservation | PaymentKind::Guarantee
                if cmd.amount <= 0 =>
            {
                return Err(DomainError::validation(
                    "payment amount must be positive",
                ));
            }
            _ => {}
        }

        Ok(vec![PaymentLedgerEvent::PaymentRecorded(PaymentRecorded {
            payment_id: cmd.payment_id,
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            amount: cmd.amount,
            kind: cmd.kind,
            method: cmd.method,
            paid_on: cmd.paid_on,
            occurred_at: cmd.occurred_at,
        })])
    }
}
