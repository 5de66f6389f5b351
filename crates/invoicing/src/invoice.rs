use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saleflow_core::{AggregateId, DomainError, DomainResult, Entity, TenantId};
use saleflow_parties::PartyId;

use crate::line::InvoiceLineId;

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Draft,
    Validated,
    Posted,
    Paid,
    Cancelled,
}

/// Customer invoice. Holds line membership by id; line records themselves
/// live in the invoice-line store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: TenantId,
    party: PartyId,
    state: InvoiceState,
    line_ids: Vec<InvoiceLineId>,
    created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        id: InvoiceId,
        tenant_id: TenantId,
        party: PartyId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            party,
            state: InvoiceState::Draft,
            line_ids: Vec::new(),
            created_at,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn party(&self) -> PartyId {
        self.party
    }

    pub fn state(&self) -> InvoiceState {
        self.state
    }

    pub fn line_ids(&self) -> &[InvoiceLineId] {
        &self.line_ids
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_draft(&self) -> bool {
        self.state == InvoiceState::Draft
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == InvoiceState::Cancelled
    }

    /// Line membership is only editable while the invoice is a draft.
    pub fn add_line(&mut self, line_id: InvoiceLineId) -> DomainResult<()> {
        if !self.is_draft() {
            return Err(DomainError::invariant(
                "lines can only be added to draft invoices",
            ));
        }
        if self.line_ids.contains(&line_id) {
            return Err(DomainError::conflict("line is already on this invoice"));
        }
        self.line_ids.push(line_id);
        Ok(())
    }

    pub fn remove_line(&mut self, line_id: InvoiceLineId) -> DomainResult<()> {
        if !self.is_draft() {
            return Err(DomainError::invariant(
                "lines can only be removed from draft invoices",
            ));
        }
        let before = self.line_ids.len();
        self.line_ids.retain(|id| *id != line_id);
        if self.line_ids.len() == before {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    pub fn validate(&mut self) -> DomainResult<()> {
        self.transition(InvoiceState::Draft, InvoiceState::Validated)
    }

    pub fn post(&mut self) -> DomainResult<()> {
        match self.state {
            InvoiceState::Draft | InvoiceState::Validated => {
                self.state = InvoiceState::Posted;
                Ok(())
            }
            _ => Err(DomainError::invariant(
                "only draft or validated invoices can be posted",
            )),
        }
    }

    pub fn pay(&mut self) -> DomainResult<()> {
        self.transition(InvoiceState::Posted, InvoiceState::Paid)
    }

    /// Cancel the invoice. Paid invoices cannot be cancelled; cancellation
    /// is terminal.
    pub fn cancel(&mut self) -> DomainResult<()> {
        match self.state {
            InvoiceState::Paid => Err(DomainError::invariant(
                "paid invoices cannot be cancelled",
            )),
            InvoiceState::Cancelled => {
                Err(DomainError::conflict("invoice is already cancelled"))
            }
            _ => {
                self.state = InvoiceState::Cancelled;
                Ok(())
            }
        }
    }

    fn transition(&mut self, from: InvoiceState, to: InvoiceState) -> DomainResult<()> {
        if self.state != from {
            return Err(DomainError::invariant(format!(
                "invalid invoice transition from {:?} to {:?}",
                self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
