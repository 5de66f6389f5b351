//! Invoicing domain module.
//!
//! Invoices and invoice lines. Invoice lines may exist without a parent
//! invoice: in standalone grouping, sales emit loose lines that accounting
//! later assembles into invoices. A line's effective state is its parent
//! invoice's state, or none while unattached.

pub mod invoice;
pub mod line;

pub use invoice::{Invoice, InvoiceId, InvoiceState};
pub use line::{InvoiceLine, InvoiceLineId, InvoiceLineKind, ProductId};
