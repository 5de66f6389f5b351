//! Infrastructure layer: storage, queries and workflow orchestration.
//!
//! The domain crates stay IO-free; this crate supplies tenant-isolated
//! stores, the repositories on top of them, the sale search with its
//! invoice-line delegation, and the `SaleService` that drives the sale and
//! invoicing workflows (including the exception-resolution step).

pub mod permissions;
pub mod query;
pub mod repository;
pub mod service;
pub mod store;

#[cfg(test)]
mod scenario_tests;

pub use query::{InvoiceLineFilter, SaleFilter};
pub use repository::{InvoiceLineRepository, InvoiceRepository, SaleRepository};
pub use service::{InMemorySaleService, SaleService};
pub use store::{InMemoryTenantStore, TenantStore};
