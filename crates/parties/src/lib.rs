//! Parties domain module.
//!
//! Customers and suppliers, including the per-party invoice grouping
//! preference that sales pick up when they are created.

pub mod party;

pub use party::{InvoiceGrouping, Party, PartyId, PartyKind};
