//! Repositories over the tenant stores.

use saleflow_core::{AccessContext, DomainError, DomainResult, TenantId};
use saleflow_invoicing::{Invoice, InvoiceId, InvoiceLine, InvoiceLineId};
use saleflow_parties::PartyId;
use saleflow_sales::{Sale, SaleId};

use crate::permissions;
use crate::store::TenantStore;

/// Sale records.
#[derive(Debug)]
pub struct SaleRepository<S> {
    store: S,
}

impl<S> SaleRepository<S>
where
    S: TenantStore<SaleId, Sale>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn find(&self, tenant_id: TenantId, id: SaleId) -> Option<Sale> {
        self.store.get(tenant_id, &id)
    }

    pub fn get(&self, tenant_id: TenantId, id: SaleId) -> DomainResult<Sale> {
        self.find(tenant_id, id).ok_or(DomainError::NotFound)
    }

    pub fn save(&self, sale: &Sale) {
        self.store
            .upsert(sale.tenant_id(), sale.id_typed(), sale.clone());
    }

    pub fn delete(&self, tenant_id: TenantId, id: SaleId) -> DomainResult<Sale> {
        self.store.remove(tenant_id, &id).ok_or(DomainError::NotFound)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<Sale> {
        self.store.list(tenant_id)
    }
}

/// Invoice records.
#[derive(Debug)]
pub struct InvoiceRepository<S> {
    store: S,
}

impl<S> InvoiceRepository<S>
where
    S: TenantStore<InvoiceId, Invoice>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn find(&self, tenant_id: TenantId, id: InvoiceId) -> Option<Invoice> {
        self.store.get(tenant_id, &id)
    }

    pub fn get(&self, tenant_id: TenantId, id: InvoiceId) -> DomainResult<Invoice> {
        self.find(tenant_id, id).ok_or(DomainError::NotFound)
    }

    pub fn save(&self, invoice: &Invoice) {
        self.store
            .upsert(invoice.tenant_id(), invoice.id_typed(), invoice.clone());
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<Invoice> {
        self.store.list(tenant_id)
    }
}

/// Invoice-line records.
///
/// Batch creation is permission-checked here because it is the one write
/// the sale workflow performs on accounting's records; the workflow passes
/// `AccessContext::System` for exactly that call.
#[derive(Debug)]
pub struct InvoiceLineRepository<S> {
    store: S,
}

impl<S> InvoiceLineRepository<S>
where
    S: TenantStore<InvoiceLineId, InvoiceLine>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn find(&self, tenant_id: TenantId, id: InvoiceLineId) -> Option<InvoiceLine> {
        self.store.get(tenant_id, &id)
    }

    pub fn get(&self, tenant_id: TenantId, id: InvoiceLineId) -> DomainResult<InvoiceLine> {
        self.find(tenant_id, id).ok_or(DomainError::NotFound)
    }

    /// Persist one line. Callers authorize before mutating.
    pub fn save(&self, line: &InvoiceLine) {
        self.store
            .upsert(line.tenant_id(), line.id_typed(), line.clone());
    }

    /// Persist a batch of lines, requiring the `invoice_line.write`
    /// permission from the given context.
    pub fn save_batch(
        &self,
        ctx: &AccessContext,
        lines: &[InvoiceLine],
    ) -> DomainResult<Vec<InvoiceLineId>> {
        ctx.authorize(&permissions::invoice_line_write())?;
        let mut ids = Vec::with_capacity(lines.len());
        for line in lines {
            self.save(line);
            ids.push(line.id_typed());
        }
        Ok(ids)
    }

    pub fn delete(&self, tenant_id: TenantId, id: InvoiceLineId) -> DomainResult<InvoiceLine> {
        self.store.remove(tenant_id, &id).ok_or(DomainError::NotFound)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<InvoiceLine> {
        self.store.list(tenant_id)
    }

    /// Loose lines for a party: generated standalone, not yet picked up by
    /// any invoice. This is the accountant's worklist.
    pub fn find_unattached(&self, tenant_id: TenantId, party: PartyId) -> Vec<InvoiceLine> {
        let mut lines: Vec<InvoiceLine> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|line| line.party() == party && !line.is_attached())
            .collect();
        lines.sort_by_key(|line| line.id_typed());
        lines
    }
}
