use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saleflow_core::{AggregateId, DomainError, DomainResult, Entity, TenantId};
use saleflow_invoicing::{Invoice, InvoiceId, InvoiceLine, InvoiceLineId, InvoiceLineKind, InvoiceState};
use saleflow_parties::{InvoiceGrouping, PartyId};

use crate::line::{SaleLine, SaleLineId};

/// Sale identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sale lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleState {
    Draft,
    Quotation,
    Confirmed,
    Processing,
    Done,
    Cancelled,
}

/// When a sale's lines become eligible for invoicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceMethod {
    /// On order confirmation.
    Order,
    /// As quantities are shipped.
    Shipment,
    /// Only on an explicit operator action.
    Manual,
}

/// Aggregate view of how fully a sale has been invoiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoicingStatus {
    /// No invoicing material exists.
    None,
    /// Invoices exist but are not all paid.
    Waiting,
    /// Loose invoice lines exist that no invoice has picked up yet.
    Pending,
    Paid,
    /// Operator attention required (a referenced invoice was cancelled).
    Exception,
}

/// Resolved state of one invoice line referenced by a sale, as needed by
/// the status aggregation: the line's id and its parent invoice (with that
/// invoice's state), or `None` while the line is loose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceLineView {
    pub id: InvoiceLineId,
    pub invoice: Option<(InvoiceId, InvoiceState)>,
}

/// What invoice creation decided to produce. Persisting the plan is the
/// service layer's job; standalone lines must be saved under the system
/// access context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoicePlan {
    /// Loose invoice lines, one batch, no invoice document.
    StandaloneLines(Vec<InvoiceLine>),
    /// A single draft invoice with its lines already attached.
    GroupedInvoice {
        invoice: Invoice,
        lines: Vec<InvoiceLine>,
    },
}

/// Sales order.
///
/// Besides the usual workflow state, a sale tracks two ignore sets used by
/// the invoicing-status aggregation: whole invoices ignored by the default
/// exception handling, and individual invoice lines ignored by the
/// standalone extension (so a cancelled downstream invoice does not block
/// the sale's lifecycle forever).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    id: SaleId,
    tenant_id: TenantId,
    party: PartyId,
    state: SaleState,
    invoice_method: InvoiceMethod,
    invoice_grouping: InvoiceGrouping,
    lines: Vec<SaleLine>,
    invoices_ignored: BTreeSet<InvoiceId>,
    invoice_lines_ignored: BTreeSet<InvoiceLineId>,
    invoicing_status: InvoicingStatus,
    created_at: DateTime<Utc>,
}

impl Sale {
    pub fn new(
        id: SaleId,
        tenant_id: TenantId,
        party: PartyId,
        invoice_method: InvoiceMethod,
        invoice_grouping: InvoiceGrouping,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            party,
            state: SaleState::Draft,
            invoice_method,
            invoice_grouping,
            lines: Vec::new(),
            invoices_ignored: BTreeSet::new(),
            invoice_lines_ignored: BTreeSet::new(),
            invoicing_status: InvoicingStatus::None,
            created_at,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn party(&self) -> PartyId {
        self.party
    }

    pub fn state(&self) -> SaleState {
        self.state
    }

    pub fn invoice_method(&self) -> InvoiceMethod {
        self.invoice_method
    }

    pub fn invoice_grouping(&self) -> InvoiceGrouping {
        self.invoice_grouping
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    pub fn invoices_ignored(&self) -> &BTreeSet<InvoiceId> {
        &self.invoices_ignored
    }

    pub fn invoice_lines_ignored(&self) -> &BTreeSet<InvoiceLineId> {
        &self.invoice_lines_ignored
    }

    pub fn invoicing_status(&self) -> InvoicingStatus {
        self.invoicing_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // ── workflow ────────────────────────────────────────────────────────

    pub fn add_line(&mut self, line: SaleLine) -> DomainResult<()> {
        if self.state != SaleState::Draft {
            return Err(DomainError::invariant(
                "lines can only be added to draft sales",
            ));
        }
        self.lines.push(line);
        Ok(())
    }

    pub fn quote(&mut self) -> DomainResult<()> {
        if self.state != SaleState::Draft {
            return Err(DomainError::invariant("only draft sales can be quoted"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot quote a sale without lines"));
        }
        self.state = SaleState::Quotation;
        Ok(())
    }

    pub fn confirm(&mut self) -> DomainResult<()> {
        if self.state != SaleState::Quotation {
            return Err(DomainError::invariant(
                "only quotations can be confirmed",
            ));
        }
        self.state = SaleState::Confirmed;
        Ok(())
    }

    pub fn begin_processing(&mut self) -> DomainResult<()> {
        if self.state != SaleState::Confirmed {
            return Err(DomainError::invariant(
                "only confirmed sales can start processing",
            ));
        }
        self.state = SaleState::Processing;
        Ok(())
    }

    pub fn mark_done(&mut self) -> DomainResult<()> {
        if self.state != SaleState::Processing {
            return Err(DomainError::invariant(
                "only processing sales can be finished",
            ));
        }
        self.state = SaleState::Done;
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        match self.state {
            SaleState::Draft | SaleState::Quotation => {
                self.state = SaleState::Cancelled;
                Ok(())
            }
            _ => Err(DomainError::invariant(
                "only draft sales and quotations can be cancelled",
            )),
        }
    }

    pub fn record_shipment(&mut self, line_id: SaleLineId, quantity: i64) -> DomainResult<()> {
        if self.state != SaleState::Processing {
            return Err(DomainError::invariant(
                "shipments can only be recorded while processing",
            ));
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id_typed() == line_id)
            .ok_or(DomainError::NotFound)?;
        line.record_shipment(quantity)
    }

    // ── derived invoice-line relation ───────────────────────────────────

    /// The set of distinct invoice lines reachable from this sale's lines,
    /// in first-seen order.
    pub fn invoice_line_ids(&self) -> Vec<InvoiceLineId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for line in &self.lines {
            for id in line.invoice_line_ids() {
                if seen.insert(*id) {
                    out.push(*id);
                }
            }
        }
        out
    }

    /// Distinct invoices linked to this sale through its invoice lines.
    pub fn linked_invoices(&self, views: &[InvoiceLineView]) -> Vec<InvoiceId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for view in views {
            if let Some((invoice_id, _)) = view.invoice {
                if seen.insert(invoice_id) {
                    out.push(invoice_id);
                }
            }
        }
        out
    }

    // ── invoice creation ────────────────────────────────────────────────

    /// Decide what invoice material this sale should produce now.
    ///
    /// `manual` is the explicit operator action; with the `Manual` invoice
    /// method nothing happens until it is passed as `true`. With standalone
    /// grouping the plan is a batch of loose lines (pseudo lines excluded,
    /// party stamped to the sale's party); otherwise the grouped default
    /// applies and a single draft invoice is planned.
    pub fn create_invoice(
        &self,
        manual: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<InvoicePlan>> {
        if !matches!(self.state, SaleState::Confirmed | SaleState::Processing) {
            return Err(DomainError::invariant(
                "invoices can only be created for confirmed or processing sales",
            ));
        }

        if self.invoice_method == InvoiceMethod::Manual && !manual {
            return Ok(None);
        }

        if self.invoice_grouping == InvoiceGrouping::Standalone {
            let mut lines = self.invoice_candidates()?;
            lines.retain(|line| line.kind() == InvoiceLineKind::Line);
            for line in &mut lines {
                line.set_party(self.party);
            }
            if lines.is_empty() {
                return Ok(None);
            }
            return Ok(Some(InvoicePlan::StandaloneLines(lines)));
        }

        self.grouped_invoice_plan(now)
    }

    /// Default (non-standalone) behavior: one draft invoice holding every
    /// candidate, each line's party normalized to the invoice's party.
    fn grouped_invoice_plan(&self, now: DateTime<Utc>) -> DomainResult<Option<InvoicePlan>> {
        let mut lines = self.invoice_candidates()?;
        if lines.is_empty() {
            return Ok(None);
        }
        let mut invoice = Invoice::new(
            InvoiceId::new(AggregateId::new()),
            self.tenant_id,
            self.party,
            now,
        );
        for line in &mut lines {
            line.set_party(invoice.party());
            line.attach(invoice.id_typed())?;
            invoice.add_line(line.id_typed())?;
        }
        Ok(Some(InvoicePlan::GroupedInvoice { invoice, lines }))
    }

    fn invoice_candidates(&self) -> DomainResult<Vec<InvoiceLine>> {
        let mut out = Vec::new();
        for line in &self.lines {
            if let Some(candidate) =
                line.invoice_candidate(self.tenant_id, self.party, self.invoice_method)?
            {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    /// Link freshly saved invoice lines back onto their generating sale
    /// lines (by origin).
    pub fn link_invoice_lines(&mut self, lines: &[InvoiceLine]) -> DomainResult<()> {
        for invoice_line in lines {
            let origin = invoice_line
                .origin()
                .ok_or_else(|| DomainError::invariant("invoice line has no sale-line origin"))?;
            let sale_line = self
                .lines
                .iter_mut()
                .find(|l| l.id_typed().0 == origin)
                .ok_or_else(|| {
                    DomainError::invariant("invoice line origin does not belong to this sale")
                })?;
            sale_line.link_invoice_line(invoice_line);
        }
        Ok(())
    }

    // ── invoicing-status aggregation ────────────────────────────────────

    /// Default status computation over the sale's distinct linked invoices,
    /// skipping invoices the exception handling chose to ignore.
    fn base_invoicing_status(&self, views: &[InvoiceLineView]) -> InvoicingStatus {
        let mut seen = BTreeSet::new();
        let mut states = Vec::new();
        for view in views {
            if let Some((invoice_id, state)) = view.invoice {
                if self.invoices_ignored.contains(&invoice_id) {
                    continue;
                }
                if seen.insert(invoice_id) {
                    states.push(state);
                }
            }
        }
        if states.is_empty() {
            InvoicingStatus::None
        } else if states.iter().any(|s| *s == InvoiceState::Cancelled) {
            InvoicingStatus::Exception
        } else if states.iter().all(|s| *s == InvoiceState::Paid) {
            InvoicingStatus::Paid
        } else {
            InvoicingStatus::Waiting
        }
    }

    /// Aggregate invoicing status.
    ///
    /// Starts from the default computation, then reconsiders it against the
    /// individual invoice lines referencing this sale, skipping explicitly
    /// ignored lines:
    /// - any remaining line on a cancelled invoice wins as `Exception`;
    /// - a `Paid` base survives only while every remaining line sits on a
    ///   paid invoice;
    /// - a `None` base with remaining (loose) lines becomes `Pending`;
    /// - otherwise the base stands.
    ///
    /// With no remaining lines at all the base is returned verbatim.
    pub fn compute_invoicing_status(&self, views: &[InvoiceLineView]) -> InvoicingStatus {
        let base = self.base_invoicing_status(views);
        let remaining: Vec<&InvoiceLineView> = views
            .iter()
            .filter(|v| !self.invoice_lines_ignored.contains(&v.id))
            .collect();
        if remaining.is_empty() {
            return base;
        }
        if remaining
            .iter()
            .any(|v| matches!(v.invoice, Some((_, InvoiceState::Cancelled))))
        {
            return InvoicingStatus::Exception;
        }
        if base == InvoicingStatus::Paid
            && remaining
                .iter()
                .all(|v| matches!(v.invoice, Some((_, InvoiceState::Paid))))
        {
            return InvoicingStatus::Paid;
        }
        if base == InvoicingStatus::None {
            return InvoicingStatus::Pending;
        }
        base
    }

    pub fn set_invoicing_status(&mut self, status: InvoicingStatus) {
        self.invoicing_status = status;
    }

    // ── exception handling ──────────────────────────────────────────────

    /// Invoice lines currently sitting on a cancelled invoice.
    pub fn cancelled_invoice_lines(&self, views: &[InvoiceLineView]) -> Vec<InvoiceLineId> {
        views
            .iter()
            .filter(|v| matches!(v.invoice, Some((_, InvoiceState::Cancelled))))
            .map(|v| v.id)
            .collect()
    }

    /// Distinct cancelled invoices linked to this sale.
    pub fn cancelled_invoices(&self, views: &[InvoiceLineView]) -> Vec<InvoiceId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for view in views {
            if let Some((invoice_id, InvoiceState::Cancelled)) = view.invoice {
                if seen.insert(invoice_id) {
                    out.push(invoice_id);
                }
            }
        }
        out
    }

    /// Union, never replacement: repeated resolutions accumulate.
    pub fn ignore_invoice_lines(&mut self, ids: impl IntoIterator<Item = InvoiceLineId>) {
        self.invoice_lines_ignored.extend(ids);
    }

    pub fn ignore_invoices(&mut self, ids: impl IntoIterator<Item = InvoiceId>) {
        self.invoices_ignored.extend(ids);
    }

    // ── duplication ─────────────────────────────────────────────────────

    /// Copy of this sale with fresh identities and no invoicing history:
    /// draft state, empty ignore sets, lines without generated invoice
    /// lines. A copied sale has no record of prior invoicing exceptions.
    pub fn duplicate(&self, new_id: SaleId, now: DateTime<Utc>) -> Sale {
        Sale {
            id: new_id,
            tenant_id: self.tenant_id,
            party: self.party,
            state: SaleState::Draft,
            invoice_method: self.invoice_method,
            invoice_grouping: self.invoice_grouping,
            lines: self.lines.iter().map(SaleLine::duplicate).collect(),
            invoices_ignored: BTreeSet::new(),
            invoice_lines_ignored: BTreeSet::new(),
            invoicing_status: InvoicingStatus::None,
            created_at: now,
        }
    }
}

impl Entity for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
