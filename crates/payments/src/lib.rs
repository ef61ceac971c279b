//! Payments against rental orders (event-sourced).
//!
//! Each order gets one payment ledger, keyed by the order's id. Entries
//! are append-only; a mistake is corrected by recording an offsetting
//! refund, never by editing history. The amount received for an order is
//! the fold of its ledger.

pub mod ledger;

pub use ledger::{
    PaymentKind, PaymentLedger, PaymentLedgerCommand, PaymentLedgerEvent, PaymentMethod,
    PaymentRecorded, RecordPayment,
};
