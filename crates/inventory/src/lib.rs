//! Rental inventory: products and their stock ledgers (event-sourced).
//!
//! A product's event stream is the authoritative, append-only adjustment
//! log; the owned-unit count is nothing but the fold of that log. No order
//! ever writes the owned quantity directly.

pub mod product;

pub use product::{
    AdjustStock, AdjustmentReason, Product, ProductCommand, ProductEvent, ProductRegistered,
    RegisterProduct, StockAdjusted,
};
