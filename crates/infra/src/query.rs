//! Sale search filters.
//!
//! A sale can be filtered by invoice-line attributes even though it stores
//! no invoice lines itself: the `InvoiceLine` arm is delegated through the
//! sale's derived `lines.invoice_lines` set, applying the inner predicate
//! to each reachable line (same operator, same operand). The resolution
//! loop lives in [`crate::service::SaleService::search_sales`].

use saleflow_invoicing::{InvoiceId, InvoiceLine, InvoiceLineId, InvoiceState};
use saleflow_parties::PartyId;
use saleflow_sales::{InvoicingStatus, SaleState};

/// Predicate over one invoice line (and its parent invoice's state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceLineFilter {
    Id(InvoiceLineId),
    /// Attached to this invoice.
    Invoice(InvoiceId),
    /// Attached to an invoice in this state.
    InvoiceState(InvoiceState),
    /// Not attached to any invoice.
    Unattached,
}

impl InvoiceLineFilter {
    pub fn matches(&self, line: &InvoiceLine, invoice_state: Option<InvoiceState>) -> bool {
        match self {
            Self::Id(id) => line.id_typed() == *id,
            Self::Invoice(invoice_id) => line.invoice() == Some(*invoice_id),
            Self::InvoiceState(state) => invoice_state == Some(*state),
            Self::Unattached => !line.is_attached(),
        }
    }
}

/// Predicate over one sale. Filters combine conjunctively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleFilter {
    Party(PartyId),
    State(SaleState),
    InvoicingStatus(InvoicingStatus),
    /// Any invoice line reachable from the sale's lines matches.
    InvoiceLine(InvoiceLineFilter),
}
