use serde::{Deserialize, Serialize};

use saleflow_core::{AggregateId, DomainError, DomainResult, Entity, TenantId};
use saleflow_invoicing::{InvoiceLine, InvoiceLineId, InvoiceLineKind, ProductId};
use saleflow_parties::PartyId;

use crate::sale::InvoiceMethod;

/// Sale line identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleLineId(pub AggregateId);

impl SaleLineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleLineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of a sale line; mirrors the invoice-line kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleLineKind {
    Line,
    Comment,
    Subtitle,
    Subtotal,
}

impl From<SaleLineKind> for InvoiceLineKind {
    fn from(kind: SaleLineKind) -> Self {
        match kind {
            SaleLineKind::Line => InvoiceLineKind::Line,
            SaleLineKind::Comment => InvoiceLineKind::Comment,
            SaleLineKind::Subtitle => InvoiceLineKind::Subtitle,
            SaleLineKind::Subtotal => InvoiceLineKind::Subtotal,
        }
    }
}

/// A line on a sale.
///
/// Tracks its own invoicing progress: which invoice lines it has generated
/// and how much quantity those cover. The derived relations on the sale
/// (invoice-line set, invoicing status) are unions over these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    id: SaleLineId,
    kind: SaleLineKind,
    product: Option<ProductId>,
    description: String,
    quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    unit_price: u64,
    shipped_quantity: i64,
    invoiced_quantity: i64,
    invoice_line_ids: Vec<InvoiceLineId>,
}

impl SaleLine {
    /// An ordinary billable line for a product.
    pub fn product_line(
        id: SaleLineId,
        product: ProductId,
        description: impl Into<String>,
        quantity: i64,
        unit_price: u64,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation(
                "sale line quantity must be positive",
            ));
        }
        Ok(Self {
            id,
            kind: SaleLineKind::Line,
            product: Some(product),
            description: description.into(),
            quantity,
            unit_price,
            shipped_quantity: 0,
            invoiced_quantity: 0,
            invoice_line_ids: Vec::new(),
        })
    }

    /// A text-only pseudo line (comment, subtitle or subtotal marker).
    pub fn pseudo(
        id: SaleLineId,
        kind: SaleLineKind,
        description: impl Into<String>,
    ) -> DomainResult<Self> {
        if kind == SaleLineKind::Line {
            return Err(DomainError::validation(
                "pseudo sale lines cannot be of the ordinary line kind",
            ));
        }
        Ok(Self {
            id,
            kind,
            product: None,
            description: description.into(),
            quantity: 0,
            unit_price: 0,
            shipped_quantity: 0,
            invoiced_quantity: 0,
            invoice_line_ids: Vec::new(),
        })
    }

    pub fn id_typed(&self) -> SaleLineId {
        self.id
    }

    pub fn kind(&self) -> SaleLineKind {
        self.kind
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

    pub fn shipped_quantity(&self) -> i64 {
        self.shipped_quantity
    }

    pub fn invoiced_quantity(&self) -> i64 {
        self.invoiced_quantity
    }

    /// Invoice lines this sale line has generated so far.
    pub fn invoice_line_ids(&self) -> &[InvoiceLineId] {
        &self.invoice_line_ids
    }

    /// Record shipped quantity, capped at the ordered quantity.
    pub fn record_shipment(&mut self, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation(
                "shipped quantity must be positive",
            ));
        }
        self.shipped_quantity = (self.shipped_quantity + quantity).min(self.quantity);
        Ok(())
    }

    /// Quantity eligible for invoicing under the given method, net of what
    /// has already been invoiced.
    fn invoiceable_quantity(&self, method: InvoiceMethod) -> i64 {
        let base = match method {
            InvoiceMethod::Order | InvoiceMethod::Manual => self.quantity,
            InvoiceMethod::Shipment => self.shipped_quantity,
        };
        base - self.invoiced_quantity
    }

    /// Compute this line's candidate invoice line, if any.
    ///
    /// Billable lines yield the uninvoiced remainder of their eligible
    /// quantity; pseudo lines yield a matching text line once. The
    /// candidate is not persisted here and carries this sale line as its
    /// origin.
    pub fn invoice_candidate(
        &self,
        tenant_id: TenantId,
        party: PartyId,
        method: InvoiceMethod,
    ) -> DomainResult<Option<InvoiceLine>> {
        match self.kind {
            SaleLineKind::Line => {
                let remaining = self.invoiceable_quantity(method);
                if remaining <= 0 {
                    return Ok(None);
                }
                let product = self
                    .product
                    .ok_or_else(|| DomainError::invariant("billable sale line has no product"))?;
                let mut line = InvoiceLine::line(
                    InvoiceLineId::new(AggregateId::new()),
                    tenant_id,
                    party,
                    product,
                    self.description.clone(),
                    remaining,
                    self.unit_price,
                )?;
                line.set_origin(self.id.0);
                Ok(Some(line))
            }
            kind => {
                if !self.invoice_line_ids.is_empty() {
                    return Ok(None);
                }
                let mut line = InvoiceLine::pseudo(
                    InvoiceLineId::new(AggregateId::new()),
                    tenant_id,
                    party,
                    kind.into(),
                    self.description.clone(),
                )?;
                line.set_origin(self.id.0);
                Ok(Some(line))
            }
        }
    }

    /// Link a generated invoice line back onto this sale line.
    pub fn link_invoice_line(&mut self, line: &InvoiceLine) {
        let id = line.id_typed();
        if !self.invoice_line_ids.contains(&id) {
            self.invoice_line_ids.push(id);
            if line.kind() == InvoiceLineKind::Line {
                self.invoiced_quantity += line.quantity();
            }
        }
    }

    /// Copy of this line with fresh identity and no invoicing history.
    pub fn duplicate(&self) -> Self {
        Self {
            id: SaleLineId::new(AggregateId::new()),
            kind: self.kind,
            product: self.product,
            description: self.description.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            shipped_quantity: 0,
            invoiced_quantity: 0,
            invoice_line_ids: Vec::new(),
        }
    }
}

impl Entity for SaleLine {
    type Id = SaleLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_party_id() -> PartyId {
        PartyId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn billable(quantity: i64) -> SaleLine {
        SaleLine::product_line(
            SaleLineId::new(AggregateId::new()),
            test_product_id(),
            "product",
            quantity,
            1000,
        )
        .unwrap()
    }

    #[test]
    fn order_method_candidate_covers_full_quantity() {
        let line = billable(4);
        let candidate = line
            .invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Order)
            .unwrap()
            .unwrap();
        assert_eq!(candidate.quantity(), 4);
        assert_eq!(candidate.origin(), Some(line.id_typed().0));
    }

    #[test]
    fn shipment_method_candidate_follows_shipped_quantity() {
        let mut line = billable(4);
        assert!(
            line.invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Shipment)
                .unwrap()
                .is_none()
        );
        line.record_shipment(3).unwrap();
        let candidate = line
            .invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Shipment)
            .unwrap()
            .unwrap();
        assert_eq!(candidate.quantity(), 3);
    }

    #[test]
    fn shipped_quantity_is_capped_at_ordered() {
        let mut line = billable(4);
        line.record_shipment(10).unwrap();
        assert_eq!(line.shipped_quantity(), 4);
    }

    #[test]
    fn linking_consumes_invoiceable_quantity() {
        let mut line = billable(4);
        let candidate = line
            .invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Order)
            .unwrap()
            .unwrap();
        line.link_invoice_line(&candidate);
        assert_eq!(line.invoiced_quantity(), 4);
        assert_eq!(line.invoice_line_ids().len(), 1);
        assert!(
            line.invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Order)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn linking_is_idempotent() {
        let mut line = billable(4);
        let candidate = line
            .invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Order)
            .unwrap()
            .unwrap();
        line.link_invoice_line(&candidate);
        line.link_invoice_line(&candidate);
        assert_eq!(line.invoiced_quantity(), 4);
        assert_eq!(line.invoice_line_ids().len(), 1);
    }

    #[test]
    fn pseudo_line_candidate_is_emitted_once() {
        let mut line = SaleLine::pseudo(
            SaleLineId::new(AggregateId::new()),
            SaleLineKind::Comment,
            "Comment",
        )
        .unwrap();
        let candidate = line
            .invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Order)
            .unwrap()
            .unwrap();
        assert_eq!(candidate.kind(), InvoiceLineKind::Comment);
        line.link_invoice_line(&candidate);
        assert_eq!(line.invoiced_quantity(), 0);
        assert!(
            line.invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Order)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn duplicate_resets_invoicing_history() {
        let mut line = billable(4);
        line.record_shipment(2).unwrap();
        let candidate = line
            .invoice_candidate(test_tenant_id(), test_party_id(), InvoiceMethod::Order)
            .unwrap()
            .unwrap();
        line.link_invoice_line(&candidate);

        let copy = line.duplicate();
        assert_ne!(copy.id_typed(), line.id_typed());
        assert_eq!(copy.quantity(), 4);
        assert_eq!(copy.shipped_quantity(), 0);
        assert_eq!(copy.invoiced_quantity(), 0);
        assert!(copy.invoice_line_ids().is_empty());
    }
}
