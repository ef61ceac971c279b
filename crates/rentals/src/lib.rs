//! Rental orders: the reservation lifecycle and the availability math.
//!
//! An order moves Draft -> Reserved -> PickedUp -> Returned (or is
//! Cancelled along the way). While it is Reserved or PickedUp, its line
//! items count against each product's pool for the order's date range;
//! nothing is ever written to the stock ledger by an order. Availability is
//! recomputed from orders and the product pool on every query so there is
//! no second source of truth to drift.

pub mod availability;
pub mod order;

pub use availability::{
    available_units, availability_calendar, committed_units, peak_committed_units,
    reservation_shortfalls, DayAvailability,
};
pub use order::{
    CancelOrder, ConfirmReservation, DraftOrder, LineItem, MarkPickedUp, MarkReturned,
    OrderCancelled, OrderDrafted, OrderPickedUp, OrderReserved, OrderReturned, OrderRevised,
    OrderStatus, RentalOrder, RentalOrderCommand, RentalOrderEvent, ReviseOrder,
};
