//! Availability math over the live order book.
//!
//! Every function here is a pure fold over a slice of orders. Nothing is
//! cached and no counter is maintained anywhere else; callers pass in the
//! orders they loaded and get an answer derived from those orders alone.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use atelier_core::{OrderId, ProductId, Shortfall};
use atelier_inventory::Product;

use crate::order::RentalOrder;

/// Availability of a single product on a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub available: i64,
}

/// Units of `product_id` committed by live reservations over `[from, to]`.
///
/// An order counts while its status commits stock (Reserved or PickedUp)
/// and its date range overlaps the queried range. Both ranges are closed,
/// so an order returning on `from` still blocks that day. `exclude` drops
/// one order from the fold, used when re-checking a revision against the
/// rest of the book.
pub fn committed_units(
    product_id: ProductId,
    orders: &[RentalOrder],
    from: NaiveDate,
    to: NaiveDate,
    exclude: Option<OrderId>,
) -> i64 {
    orders
        .iter()
        .filter(|order| Some(order.id_typed()) != exclude)
        .filter(|order| order.status().commits_stock())
        .filter(|order| order.overlaps(from, to))
        .map(|order| order.quantity_of(product_id))
        .sum()
}

/// Units of `product` free to reserve over `[from, to]`.
///
/// Owned pool minus committed units. Can go negative if the pool shrank
/// underneath existing reservations.
pub fn available_units(
    product: &Product,
    orders: &[RentalOrder],
    from: NaiveDate,
    to: NaiveDate,
    exclude: Option<OrderId>,
) -> i64 {
    product.owned_units() - committed_units(product.id_typed(), orders, from, to, exclude)
}

/// Check every line of `order` against the rest of the book.
///
/// Lines for the same product are summed before checking, so an order
/// listing a product twice cannot slip past the guard one line at a time.
/// Returns one [`Shortfall`] per product that does not fit; empty means
/// the whole order fits.
pub fn reservation_shortfalls(
    order: &RentalOrder,
    products: &[Product],
    orders: &[RentalOrder],
) -> Vec<Shortfall> {
    let mut requested: BTreeMap<ProductId, i64> = BTreeMap::new();
    for line in order.lines() {
        *requested.entry(line.product_id).or_insert(0) += line.quantity;
    }

    let mut shortfalls = Vec::new();
    for (product_id, quantity) in requested {
        let owned = products
            .iter()
            .find(|p| p.id_typed() == product_id)
            .map(Product::owned_units)
            .unwrap_or(0);
        let committed = committed_units(
            product_id,
            orders,
            order.reserve_date(),
            order.return_date(),
            Some(order.id_typed()),
        );
        let available = owned - committed;
        if quantity > available {
            shortfalls.push(Shortfall {
                product_id,
                requested: quantity,
                available,
            });
        }
    }

    shortfalls
}

/// Highest simultaneous commitment of `product_id` across the live book.
///
/// With closed date ranges the committed count only steps up at some
/// order's reserve date, so evaluating at those dates finds the peak.
pub fn peak_committed_units(product_id: ProductId, orders: &[RentalOrder]) -> i64 {
    orders
        .iter()
        .filter(|order| order.status().commits_stock())
        .filter(|order| order.quantity_of(product_id) > 0)
        .map(|order| {
            let day = order.reserve_date();
            committed_units(product_id, orders, day, day, None)
        })
        .max()
        .unwrap_or(0)
}

/// Per-day availability of `product` over `[from, to]`, one entry per day.
pub fn availability_calendar(
    product: &Product,
    orders: &[RentalOrder],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<DayAvailability> {
    let mut calendar = Vec::new();
    let mut day = from;
    while day <= to {
        calendar.push(DayAvailability {
            date: day,
            available: available_units(product, orders, day, day, None),
        });
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }
    calendar
}
