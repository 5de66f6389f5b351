//! Sale/invoicing workflow orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use saleflow_core::{AccessContext, AggregateId, DomainError, DomainResult, TenantId};
use saleflow_invoicing::{Invoice, InvoiceId, InvoiceLine, InvoiceLineId};
use saleflow_parties::Party;
use saleflow_sales::{
    InvoiceLineView, InvoiceMethod, InvoicePlan, InvoicingStatus, Sale, SaleId, SaleLine,
    SaleLineId, SaleState,
};

use crate::permissions;
use crate::query::SaleFilter;
use crate::repository::{InvoiceLineRepository, InvoiceRepository, SaleRepository};
use crate::store::{InMemoryTenantStore, TenantStore};

/// Drives sales through their workflow and keeps the invoicing side
/// consistent: generating invoice material on confirmation, aggregating
/// the invoicing status, resolving invoice exceptions, and enforcing the
/// referential rules of the ignored-line relation.
///
/// Every mutating operation takes an explicit [`AccessContext`]; the only
/// internally elevated step is the batch save of generated invoice lines.
#[derive(Debug)]
pub struct SaleService<SS, IS, LS> {
    sales: SaleRepository<SS>,
    invoices: InvoiceRepository<IS>,
    invoice_lines: InvoiceLineRepository<LS>,
}

/// Fully in-memory service, used by tests and development setups.
pub type InMemorySaleService = SaleService<
    Arc<InMemoryTenantStore<SaleId, Sale>>,
    Arc<InMemoryTenantStore<InvoiceId, Invoice>>,
    Arc<InMemoryTenantStore<InvoiceLineId, InvoiceLine>>,
>;

impl InMemorySaleService {
    pub fn in_memory() -> Self {
        Self::new(
            SaleRepository::new(Arc::new(InMemoryTenantStore::new())),
            InvoiceRepository::new(Arc::new(InMemoryTenantStore::new())),
            InvoiceLineRepository::new(Arc::new(InMemoryTenantStore::new())),
        )
    }
}

impl<SS, IS, LS> SaleService<SS, IS, LS>
where
    SS: TenantStore<SaleId, Sale>,
    IS: TenantStore<InvoiceId, Invoice>,
    LS: TenantStore<InvoiceLineId, InvoiceLine>,
{
    pub fn new(
        sales: SaleRepository<SS>,
        invoices: InvoiceRepository<IS>,
        invoice_lines: InvoiceLineRepository<LS>,
    ) -> Self {
        Self {
            sales,
            invoices,
            invoice_lines,
        }
    }

    pub fn sales(&self) -> &SaleRepository<SS> {
        &self.sales
    }

    pub fn invoices(&self) -> &InvoiceRepository<IS> {
        &self.invoices
    }

    pub fn invoice_lines(&self) -> &InvoiceLineRepository<LS> {
        &self.invoice_lines
    }

    // ── sale workflow ───────────────────────────────────────────────────

    /// Create a draft sale for a party, picking up the party's invoice
    /// grouping preference.
    pub fn create_sale(
        &self,
        ctx: &AccessContext,
        party: &Party,
        invoice_method: InvoiceMethod,
        now: DateTime<Utc>,
    ) -> DomainResult<Sale> {
        ctx.authorize(&permissions::sale_manage())?;
        let sale = Sale::new(
            SaleId::new(AggregateId::new()),
            party.tenant_id(),
            party.id_typed(),
            invoice_method,
            party.sale_invoice_grouping(),
            now,
        );
        self.sales.save(&sale);
        Ok(sale)
    }

    pub fn add_line(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
        line: SaleLine,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::sale_manage())?;
        let mut sale = self.sales.get(tenant_id, sale_id)?;
        sale.add_line(line)?;
        self.sales.save(&sale);
        Ok(())
    }

    pub fn quote(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::sale_manage())?;
        let mut sale = self.sales.get(tenant_id, sale_id)?;
        sale.quote()?;
        self.sales.save(&sale);
        Ok(())
    }

    /// Confirm a quotation and start processing, generating whatever
    /// invoice material the sale's method and grouping call for.
    pub fn confirm(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> DomainResult<Sale> {
        ctx.authorize(&permissions::sale_manage())?;
        let mut sale = self.sales.get(tenant_id, sale_id)?;
        sale.confirm()?;
        sale.begin_processing()?;
        self.run_invoicing(&mut sale, false, now)?;
        self.refresh_invoicing_status(&mut sale)?;
        self.sales.save(&sale);
        tracing::info!(sale_id = %sale_id, state = ?sale.state(), "sale confirmed");
        Ok(sale)
    }

    /// Re-run the sale's normal processing step: pick up newly invoiceable
    /// quantities and recompute the aggregate invoicing status.
    pub fn process(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> DomainResult<InvoicingStatus> {
        ctx.authorize(&permissions::sale_manage())?;
        let mut sale = self.sales.get(tenant_id, sale_id)?;
        if matches!(sale.state(), SaleState::Confirmed | SaleState::Processing) {
            self.run_invoicing(&mut sale, false, now)?;
        }
        let status = self.refresh_invoicing_status(&mut sale)?;
        if status == InvoicingStatus::Paid && sale.state() == SaleState::Processing {
            sale.mark_done()?;
        }
        self.sales.save(&sale);
        Ok(status)
    }

    /// The explicit operator action that unlocks invoicing for sales with
    /// the `Manual` invoice method.
    pub fn manual_invoice(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> DomainResult<InvoicingStatus> {
        ctx.authorize(&permissions::sale_manage())?;
        let mut sale = self.sales.get(tenant_id, sale_id)?;
        self.run_invoicing(&mut sale, true, now)?;
        let status = self.refresh_invoicing_status(&mut sale)?;
        self.sales.save(&sale);
        Ok(status)
    }

    /// Record shipped quantity on a sale line; with the `Shipment` invoice
    /// method this makes the quantity invoiceable immediately.
    pub fn record_shipment(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
        line_id: SaleLineId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::stock_ship())?;
        let mut sale = self.sales.get(tenant_id, sale_id)?;
        sale.record_shipment(line_id, quantity)?;
        self.run_invoicing(&mut sale, false, now)?;
        self.refresh_invoicing_status(&mut sale)?;
        self.sales.save(&sale);
        Ok(())
    }

    fn run_invoicing(
        &self,
        sale: &mut Sale,
        manual: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        match sale.create_invoice(manual, now)? {
            None => {}
            Some(InvoicePlan::StandaloneLines(lines)) => {
                // Invoice-line creation is a system-level side effect of
                // the sale workflow; the acting user may not hold the
                // write permission, so this one save runs elevated.
                self.invoice_lines
                    .save_batch(&AccessContext::system(), &lines)?;
                sale.link_invoice_lines(&lines)?;
                tracing::info!(
                    sale_id = %sale.id_typed(),
                    count = lines.len(),
                    "generated standalone invoice lines"
                );
            }
            Some(InvoicePlan::GroupedInvoice { invoice, lines }) => {
                self.invoice_lines
                    .save_batch(&AccessContext::system(), &lines)?;
                sale.link_invoice_lines(&lines)?;
                self.invoices.save(&invoice);
                tracing::info!(
                    sale_id = %sale.id_typed(),
                    invoice_id = %invoice.id_typed(),
                    "generated grouped invoice"
                );
            }
        }
        Ok(())
    }

    // ── derived views ───────────────────────────────────────────────────

    /// Resolve the sale's derived invoice-line set against the stores.
    pub fn resolve_invoice_line_views(&self, sale: &Sale) -> DomainResult<Vec<InvoiceLineView>> {
        let tenant_id = sale.tenant_id();
        let mut views = Vec::new();
        for line_id in sale.invoice_line_ids() {
            let line = self.invoice_lines.get(tenant_id, line_id)?;
            let invoice = match line.invoice() {
                Some(invoice_id) => {
                    let invoice = self.invoices.get(tenant_id, invoice_id)?;
                    Some((invoice_id, invoice.state()))
                }
                None => None,
            };
            views.push(InvoiceLineView {
                id: line_id,
                invoice,
            });
        }
        Ok(views)
    }

    /// Distinct invoices linked to the sale through its invoice lines.
    pub fn linked_invoices(&self, sale: &Sale) -> DomainResult<Vec<InvoiceId>> {
        let views = self.resolve_invoice_line_views(sale)?;
        Ok(sale.linked_invoices(&views))
    }

    fn refresh_invoicing_status(&self, sale: &mut Sale) -> DomainResult<InvoicingStatus> {
        let views = self.resolve_invoice_line_views(sale)?;
        let status = sale.compute_invoicing_status(&views);
        sale.set_invoicing_status(status);
        Ok(status)
    }

    // ── exception resolution ────────────────────────────────────────────

    /// Resolve an invoice exception on a sale.
    ///
    /// Default behavior first: cancelled invoices join the sale's ignored
    /// invoices. Then the standalone extension: every invoice line sitting
    /// on a cancelled invoice joins the ignored lines (union, never
    /// replacement). Finally the sale is re-processed, which clears the
    /// exception status when nothing cancelled remains in view.
    pub fn handle_invoice_exception(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> DomainResult<InvoicingStatus> {
        ctx.authorize(&permissions::sale_manage())?;
        let mut sale = self.sales.get(tenant_id, sale_id)?;
        let views = self.resolve_invoice_line_views(&sale)?;

        sale.ignore_invoices(sale.cancelled_invoices(&views));

        let cancelled_lines = sale.cancelled_invoice_lines(&views);
        if !cancelled_lines.is_empty() {
            tracing::info!(
                sale_id = %sale_id,
                count = cancelled_lines.len(),
                "ignoring invoice lines of cancelled invoices"
            );
            sale.ignore_invoice_lines(cancelled_lines);
        }

        if matches!(sale.state(), SaleState::Confirmed | SaleState::Processing) {
            self.run_invoicing(&mut sale, false, now)?;
        }
        let status = self.refresh_invoicing_status(&mut sale)?;
        self.sales.save(&sale);
        Ok(status)
    }

    // ── duplication & deletion ──────────────────────────────────────────

    /// Copy a sale. The copy starts as a fresh draft with empty ignored
    /// sets and no generated invoice lines.
    pub fn duplicate_sale(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> DomainResult<Sale> {
        ctx.authorize(&permissions::sale_manage())?;
        let sale = self.sales.get(tenant_id, sale_id)?;
        let copy = sale.duplicate(SaleId::new(AggregateId::new()), now);
        self.sales.save(&copy);
        Ok(copy)
    }

    /// Delete a sale. Its ignored-line relation dies with it (cascade);
    /// the invoice lines themselves stay, they belong to accounting.
    pub fn delete_sale(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        sale_id: SaleId,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::sale_manage())?;
        self.sales.delete(tenant_id, sale_id)?;
        Ok(())
    }

    /// Delete an invoice line. Blocked while any sale's ignored set still
    /// references the line (restrict).
    pub fn delete_invoice_line(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        line_id: InvoiceLineId,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::invoice_line_write())?;
        let referenced = self
            .sales
            .list(tenant_id)
            .iter()
            .any(|sale| sale.invoice_lines_ignored().contains(&line_id));
        if referenced {
            return Err(DomainError::conflict(
                "invoice line is ignored by a sale and cannot be deleted",
            ));
        }
        self.invoice_lines.delete(tenant_id, line_id)?;
        Ok(())
    }

    // ── accounting flows ────────────────────────────────────────────────

    /// Start an empty draft invoice for a party.
    pub fn create_customer_invoice(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        party: saleflow_parties::PartyId,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        ctx.authorize(&permissions::invoice_manage())?;
        let invoice = Invoice::new(InvoiceId::new(AggregateId::new()), tenant_id, party, now);
        self.invoices.save(&invoice);
        Ok(invoice)
    }

    /// Attach loose invoice lines to a draft invoice.
    ///
    /// The whole batch is validated and attached in memory before anything
    /// is written; a failing line leaves the stores untouched.
    pub fn attach_lines_to_invoice(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        line_ids: &[InvoiceLineId],
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::invoice_manage())?;
        let mut invoice = self.invoices.get(tenant_id, invoice_id)?;
        let mut lines = Vec::with_capacity(line_ids.len());
        for line_id in line_ids {
            let mut line = self.invoice_lines.get(tenant_id, *line_id)?;
            if line.party() != invoice.party() {
                return Err(DomainError::invariant(
                    "invoice line party does not match the invoice party",
                ));
            }
            line.attach(invoice_id)?;
            invoice.add_line(*line_id)?;
            lines.push(line);
        }
        for line in &lines {
            self.invoice_lines.save(line);
        }
        self.invoices.save(&invoice);
        Ok(())
    }

    /// Detach a line from a draft invoice, making it loose again.
    pub fn detach_line_from_invoice(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        line_id: InvoiceLineId,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::invoice_manage())?;
        let mut invoice = self.invoices.get(tenant_id, invoice_id)?;
        let mut line = self.invoice_lines.get(tenant_id, line_id)?;
        invoice.remove_line(line_id)?;
        line.detach()?;
        self.invoices.save(&invoice);
        self.invoice_lines.save(&line);
        Ok(())
    }

    pub fn validate_invoice(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::invoice_manage())?;
        let mut invoice = self.invoices.get(tenant_id, invoice_id)?;
        invoice.validate()?;
        self.invoices.save(&invoice);
        Ok(())
    }

    pub fn post_invoice(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::invoice_manage())?;
        let mut invoice = self.invoices.get(tenant_id, invoice_id)?;
        invoice.post()?;
        self.invoices.save(&invoice);
        Ok(())
    }

    pub fn pay_invoice(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::invoice_manage())?;
        let mut invoice = self.invoices.get(tenant_id, invoice_id)?;
        invoice.pay()?;
        self.invoices.save(&invoice);
        Ok(())
    }

    pub fn cancel_invoice(
        &self,
        ctx: &AccessContext,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        ctx.authorize(&permissions::invoice_manage())?;
        let mut invoice = self.invoices.get(tenant_id, invoice_id)?;
        invoice.cancel()?;
        self.invoices.save(&invoice);
        tracing::info!(invoice_id = %invoice_id, "invoice cancelled");
        Ok(())
    }

    // ── search ──────────────────────────────────────────────────────────

    /// Find sales matching every filter. The `InvoiceLine` filter arm is
    /// delegated through each sale's derived `lines.invoice_lines` set.
    pub fn search_sales(
        &self,
        tenant_id: TenantId,
        filters: &[SaleFilter],
    ) -> DomainResult<Vec<Sale>> {
        let mut out = Vec::new();
        for sale in self.sales.list(tenant_id) {
            if self.sale_matches(tenant_id, &sale, filters)? {
                out.push(sale);
            }
        }
        out.sort_by_key(|sale| sale.id_typed());
        Ok(out)
    }

    fn sale_matches(
        &self,
        tenant_id: TenantId,
        sale: &Sale,
        filters: &[SaleFilter],
    ) -> DomainResult<bool> {
        for filter in filters {
            let matched = match filter {
                SaleFilter::Party(party) => sale.party() == *party,
                SaleFilter::State(state) => sale.state() == *state,
                SaleFilter::InvoicingStatus(status) => sale.invoicing_status() == *status,
                SaleFilter::InvoiceLine(line_filter) => {
                    let mut any = false;
                    for line_id in sale.invoice_line_ids() {
                        let Some(line) = self.invoice_lines.find(tenant_id, line_id) else {
                            continue;
                        };
                        let invoice_state = match line.invoice() {
                            Some(invoice_id) => self
                                .invoices
                                .find(tenant_id, invoice_id)
                                .map(|invoice| invoice.state()),
                            None => None,
                        };
                        if line_filter.matches(&line, invoice_state) {
                            any = true;
                            break;
                        }
                    }
                    any
                }
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
