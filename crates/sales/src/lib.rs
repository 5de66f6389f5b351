//! Sales domain module.
//!
//! Sales orders and their invoicing behavior, including the standalone
//! grouping policy: instead of grouping a sale's billable material into one
//! invoice document, each sale line emits loose invoice lines, and the
//! sale's invoicing status is aggregated from whatever invoice lines end up
//! referencing it. Pure domain logic; persistence and orchestration live in
//! `saleflow-infra`.

pub mod line;
pub mod sale;

pub use line::{SaleLine, SaleLineId, SaleLineKind};
pub use sale::{
    InvoiceLineView, InvoiceMethod, InvoicePlan, InvoicingStatus, Sale, SaleId, SaleState,
};
