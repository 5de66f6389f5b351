use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saleflow_core::{AggregateId, DomainError, DomainResult, Entity, TenantId};

/// Party identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub AggregateId);

impl PartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Party kind: customer or supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

/// How invoice material generated for this party's sales is grouped.
///
/// - `None`: one invoice per sale (no grouping across sales).
/// - `Standard`: append to the party's open draft invoice when one exists.
/// - `Standalone`: sale lines emit loose invoice lines directly; invoices
///   are assembled later by accounting from whatever lines exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceGrouping {
    None,
    Standard,
    Standalone,
}

impl Default for InvoiceGrouping {
    fn default() -> Self {
        Self::None
    }
}

/// Party record (customer or supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    id: PartyId,
    tenant_id: TenantId,
    kind: PartyKind,
    name: String,
    sale_invoice_grouping: InvoiceGrouping,
    created_at: DateTime<Utc>,
}

impl Party {
    pub fn new(
        id: PartyId,
        tenant_id: TenantId,
        kind: PartyKind,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("party name must not be empty"));
        }
        Ok(Self {
            id,
            tenant_id,
            kind,
            name,
            sale_invoice_grouping: InvoiceGrouping::default(),
            created_at,
        })
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Grouping preference applied to new sales for this party.
    pub fn sale_invoice_grouping(&self) -> InvoiceGrouping {
        self.sale_invoice_grouping
    }

    pub fn set_sale_invoice_grouping(&mut self, grouping: InvoiceGrouping) {
        self.sale_invoice_grouping = grouping;
    }
}

impl Entity for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
