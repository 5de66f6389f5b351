use serde::{Deserialize, Serialize};

use saleflow_core::{AggregateId, DomainError, DomainResult, Entity, TenantId};
use saleflow_parties::PartyId;

use crate::invoice::InvoiceId;

/// Invoice line identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceLineId(pub AggregateId);

impl InvoiceLineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceLineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product identifier (catalog is outside this workspace's scope).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of an invoice line.
///
/// Only `Line` carries an amount; the other kinds are layout text
/// (comments, subtitles, subtotal markers) on the printed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceLineKind {
    Line,
    Comment,
    Subtitle,
    Subtotal,
}

/// Invoice line.
///
/// `invoice` is `None` while the line is loose (generated standalone, not
/// yet picked up by accounting). `origin` points back at the sale line that
/// generated it, when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    id: InvoiceLineId,
    tenant_id: TenantId,
    kind: InvoiceLineKind,
    party: PartyId,
    invoice: Option<InvoiceId>,
    origin: Option<AggregateId>,
    product: Option<ProductId>,
    description: String,
    quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    unit_price: u64,
}

impl InvoiceLine {
    /// An ordinary billable line.
    pub fn line(
        id: InvoiceLineId,
        tenant_id: TenantId,
        party: PartyId,
        product: ProductId,
        description: impl Into<String>,
        quantity: i64,
        unit_price: u64,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation(
                "invoice line quantity must be positive",
            ));
        }
        Ok(Self {
            id,
            tenant_id,
            kind: InvoiceLineKind::Line,
            party,
            invoice: None,
            origin: None,
            product: Some(product),
            description: description.into(),
            quantity,
            unit_price,
        })
    }

    /// A text-only pseudo line (comment, subtitle or subtotal marker).
    pub fn pseudo(
        id: InvoiceLineId,
        tenant_id: TenantId,
        party: PartyId,
        kind: InvoiceLineKind,
        description: impl Into<String>,
    ) -> DomainResult<Self> {
        if kind == InvoiceLineKind::Line {
            return Err(DomainError::validation(
                "pseudo invoice lines cannot be of the ordinary line kind",
            ));
        }
        Ok(Self {
            id,
            tenant_id,
            kind,
            party,
            invoice: None,
            origin: None,
            product: None,
            description: description.into(),
            quantity: 0,
            unit_price: 0,
        })
    }

    pub fn id_typed(&self) -> InvoiceLineId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn kind(&self) -> InvoiceLineKind {
        self.kind
    }

    pub fn party(&self) -> PartyId {
        self.party
    }

    pub fn set_party(&mut self, party: PartyId) {
        self.party = party;
    }

    pub fn invoice(&self) -> Option<InvoiceId> {
        self.invoice
    }

    pub fn origin(&self) -> Option<AggregateId> {
        self.origin
    }

    pub fn set_origin(&mut self, origin: AggregateId) {
        self.origin = Some(origin);
    }

    pub fn product(&self) -> Option<ProductId> {
        self.product
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    /// Line amount; pseudo lines never carry one.
    pub fn amount(&self) -> u64 {
        match self.kind {
            InvoiceLineKind::Line => (self.quantity as u64).saturating_mul(self.unit_price),
            _ => 0,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.invoice.is_some()
    }

    /// Attach the line to an invoice. A line belongs to at most one invoice.
    pub fn attach(&mut self, invoice: InvoiceId) -> DomainResult<()> {
        if let Some(current) = self.invoice {
            return Err(DomainError::conflict(format!(
                "invoice line is already attached to invoice {current}"
            )));
        }
        self.invoice = Some(invoice);
        Ok(())
    }

    /// Detach the line from its invoice, making it loose again.
    pub fn detach(&mut self) -> DomainResult<InvoiceId> {
        self.invoice
            .take()
            .ok_or_else(|| DomainError::invariant("invoice line is not attached to any invoice"))
    }
}

impl Entity for InvoiceLine {
    type Id = InvoiceLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
