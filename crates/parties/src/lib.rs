//! Customers of the rental business (event-sourced).
//!
//! Orders and payments refer to customers by id; this crate owns the records
//! those references are validated against.

pub mod customer;

pub use customer::{
    ContactInfo, Customer, CustomerCommand, CustomerContactChanged, CustomerEvent,
    CustomerRegistered, RegisterCustomer, UpdateContact,
};
