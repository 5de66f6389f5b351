//! End-to-end workflow scenarios against the in-memory service.

use chrono::{DateTime, Utc};

use saleflow_core::{AccessContext, AggregateId, DomainError, TenantId, UserId};
use saleflow_invoicing::{InvoiceLineKind, InvoiceState, ProductId};
use saleflow_parties::{InvoiceGrouping, Party, PartyId, PartyKind};
use saleflow_sales::{
    InvoiceMethod, InvoicingStatus, Sale, SaleLine, SaleLineId, SaleLineKind, SaleState,
};

use crate::permissions;
use crate::query::{InvoiceLineFilter, SaleFilter};
use crate::service::InMemorySaleService;

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn sales_ctx() -> AccessContext {
    AccessContext::user(
        UserId::new(),
        vec![permissions::sale_manage(), permissions::stock_ship()],
    )
}

fn warehouse_ctx() -> AccessContext {
    AccessContext::user(UserId::new(), vec![permissions::stock_ship()])
}

fn accountant_ctx() -> AccessContext {
    AccessContext::user(
        UserId::new(),
        vec![
            permissions::invoice_manage(),
            permissions::invoice_line_write(),
        ],
    )
}

fn standalone_customer(tenant_id: TenantId) -> Party {
    let mut party = Party::new(
        PartyId::new(AggregateId::new()),
        tenant_id,
        PartyKind::Customer,
        "Customer",
        now(),
    )
    .unwrap();
    party.set_sale_invoice_grouping(InvoiceGrouping::Standalone);
    party
}

fn product_line(quantity: i64, unit_price: u64) -> SaleLine {
    SaleLine::product_line(
        SaleLineId::new(AggregateId::new()),
        ProductId::new(AggregateId::new()),
        "product",
        quantity,
        unit_price,
    )
    .unwrap()
}

fn pseudo_line(kind: SaleLineKind, description: &str) -> SaleLine {
    SaleLine::pseudo(SaleLineId::new(AggregateId::new()), kind, description).unwrap()
}

/// A five-line sale matching the classic scenario: three billable lines
/// interleaved with a comment and a subtotal.
fn confirmed_five_line_sale(service: &InMemorySaleService, party: &Party) -> Sale {
    let ctx = sales_ctx();
    let sale = service
        .create_sale(&ctx, party, InvoiceMethod::Order, now())
        .unwrap();
    let tenant_id = party.tenant_id();
    let sale_id = sale.id_typed();
    for line in [
        product_line(2, 1000),
        pseudo_line(SaleLineKind::Comment, "Comment"),
        product_line(3, 1000),
        product_line(4, 1000),
        pseudo_line(SaleLineKind::Subtotal, "Subtotal"),
    ] {
        service.add_line(&ctx, tenant_id, sale_id, line).unwrap();
    }
    service.quote(&ctx, tenant_id, sale_id).unwrap();
    service.confirm(&ctx, tenant_id, sale_id, now()).unwrap()
}

#[test]
fn standalone_sale_emits_loose_invoice_lines() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);

    let sale = confirmed_five_line_sale(&service, &party);
    assert_eq!(sale.state(), SaleState::Processing);
    assert_eq!(sale.invoicing_status(), InvoicingStatus::Pending);

    // Pseudo lines stay on the sale; only billable lines become material.
    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    assert_eq!(loose.len(), 3);
    for line in &loose {
        assert_eq!(line.kind(), InvoiceLineKind::Line);
        assert_eq!(line.party(), party.id_typed());
        assert!(line.invoice().is_none());
        assert!(line.origin().is_some());
    }

    // No invoice document exists yet.
    assert!(service.linked_invoices(&sale).unwrap().is_empty());
}

#[test]
fn accountant_assembles_invoices_from_loose_lines() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let sale = confirmed_five_line_sale(&service, &party);
    let acct = accountant_ctx();

    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    assert_eq!(loose.len(), 3);

    // First invoice takes one of the three loose lines.
    let invoice1 = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    service
        .attach_lines_to_invoice(&acct, tenant_id, invoice1.id_typed(), &[loose[0].id_typed()])
        .unwrap();

    let sale = service.sales().get(tenant_id, sale.id_typed()).unwrap();
    assert_eq!(service.linked_invoices(&sale).unwrap(), vec![invoice1.id_typed()]);

    // Second invoice takes both remaining lines, then gives one back.
    let invoice2 = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    service
        .attach_lines_to_invoice(
            &acct,
            tenant_id,
            invoice2.id_typed(),
            &[loose[1].id_typed(), loose[2].id_typed()],
        )
        .unwrap();
    service
        .detach_line_from_invoice(&acct, tenant_id, invoice2.id_typed(), loose[2].id_typed())
        .unwrap();

    let invoice2 = service.invoices().get(tenant_id, invoice2.id_typed()).unwrap();
    assert_eq!(invoice2.line_ids(), &[loose[1].id_typed()]);

    let linked = service.linked_invoices(&sale).unwrap();
    assert_eq!(linked.len(), 2);
    assert_eq!(
        service
            .invoice_lines()
            .find_unattached(tenant_id, party.id_typed())
            .len(),
        1
    );
}

#[test]
fn status_tracks_invoice_lifecycle() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let sale = confirmed_five_line_sale(&service, &party);
    let ctx = sales_ctx();
    let acct = accountant_ctx();

    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    let invoice = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    let line_ids: Vec<_> = loose.iter().map(|l| l.id_typed()).collect();
    service
        .attach_lines_to_invoice(&acct, tenant_id, invoice.id_typed(), &line_ids)
        .unwrap();

    let status = service.process(&ctx, tenant_id, sale.id_typed(), now()).unwrap();
    assert_eq!(status, InvoicingStatus::Waiting);

    service.post_invoice(&acct, tenant_id, invoice.id_typed()).unwrap();
    service.pay_invoice(&acct, tenant_id, invoice.id_typed()).unwrap();
    let status = service.process(&ctx, tenant_id, sale.id_typed(), now()).unwrap();
    assert_eq!(status, InvoicingStatus::Paid);

    // Fully paid processing sales are finished.
    let sale = service.sales().get(tenant_id, sale.id_typed()).unwrap();
    assert_eq!(sale.state(), SaleState::Done);
}

#[test]
fn manual_method_waits_for_the_explicit_action() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let ctx = sales_ctx();

    let sale = service
        .create_sale(&ctx, &party, InvoiceMethod::Manual, now())
        .unwrap();
    let sale_id = sale.id_typed();
    service
        .add_line(&ctx, tenant_id, sale_id, product_line(5, 200))
        .unwrap();
    service.quote(&ctx, tenant_id, sale_id).unwrap();
    let sale = service.confirm(&ctx, tenant_id, sale_id, now()).unwrap();

    // Nothing generated on confirmation.
    assert_eq!(sale.invoicing_status(), InvoicingStatus::None);
    assert!(service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed())
        .is_empty());

    let status = service.manual_invoice(&ctx, tenant_id, sale_id, now()).unwrap();
    assert_eq!(status, InvoicingStatus::Pending);
    assert_eq!(
        service
            .invoice_lines()
            .find_unattached(tenant_id, party.id_typed())
            .len(),
        1
    );
    assert!(service
        .linked_invoices(&service.sales().get(tenant_id, sale_id).unwrap())
        .unwrap()
        .is_empty());
}

#[test]
fn shipment_method_invoices_shipped_quantities() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let ctx = sales_ctx();

    let sale = service
        .create_sale(&ctx, &party, InvoiceMethod::Shipment, now())
        .unwrap();
    let sale_id = sale.id_typed();
    let line = product_line(10, 100);
    let line_id = line.id_typed();
    service.add_line(&ctx, tenant_id, sale_id, line).unwrap();
    service.quote(&ctx, tenant_id, sale_id).unwrap();
    service.confirm(&ctx, tenant_id, sale_id, now()).unwrap();

    assert!(service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed())
        .is_empty());

    service
        .record_shipment(&warehouse_ctx(), tenant_id, sale_id, line_id, 4, now())
        .unwrap();
    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    assert_eq!(loose.len(), 1);
    assert_eq!(loose[0].quantity(), 4);
}

#[test]
fn default_grouping_builds_one_draft_invoice() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = Party::new(
        PartyId::new(AggregateId::new()),
        tenant_id,
        PartyKind::Customer,
        "Grouped customer",
        now(),
    )
    .unwrap();
    let ctx = sales_ctx();

    let sale = service
        .create_sale(&ctx, &party, InvoiceMethod::Order, now())
        .unwrap();
    let sale_id = sale.id_typed();
    service
        .add_line(&ctx, tenant_id, sale_id, product_line(2, 500))
        .unwrap();
    service
        .add_line(&ctx, tenant_id, sale_id, product_line(3, 500))
        .unwrap();
    service.quote(&ctx, tenant_id, sale_id).unwrap();
    let sale = service.confirm(&ctx, tenant_id, sale_id, now()).unwrap();

    let linked = service.linked_invoices(&sale).unwrap();
    assert_eq!(linked.len(), 1);
    let invoice = service.invoices().get(tenant_id, linked[0]).unwrap();
    assert_eq!(invoice.state(), InvoiceState::Draft);
    assert_eq!(invoice.line_ids().len(), 2);
    assert_eq!(sale.invoicing_status(), InvoicingStatus::Waiting);
    assert!(service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed())
        .is_empty());
}

#[test]
fn failed_attach_batch_leaves_stores_untouched() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let other_party = standalone_customer(tenant_id);
    let ctx = sales_ctx();
    let acct = accountant_ctx();

    for p in [&party, &other_party] {
        let sale = service.create_sale(&ctx, p, InvoiceMethod::Order, now()).unwrap();
        service
            .add_line(&ctx, tenant_id, sale.id_typed(), product_line(1, 100))
            .unwrap();
        service.quote(&ctx, tenant_id, sale.id_typed()).unwrap();
        service.confirm(&ctx, tenant_id, sale.id_typed(), now()).unwrap();
    }
    let own_line = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed())[0]
        .id_typed();
    let foreign_line = service
        .invoice_lines()
        .find_unattached(tenant_id, other_party.id_typed())[0]
        .id_typed();

    let invoice = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    let err = service
        .attach_lines_to_invoice(&acct, tenant_id, invoice.id_typed(), &[own_line, foreign_line])
        .unwrap_err();
    assert!(matches!(err, DomainError::InvariantViolation(_)));

    // The first line of the batch was valid but must not have been saved.
    let stored = service.invoice_lines().get(tenant_id, own_line).unwrap();
    assert!(stored.invoice().is_none());
    let stored_invoice = service.invoices().get(tenant_id, invoice.id_typed()).unwrap();
    assert!(stored_invoice.line_ids().is_empty());

    // A clean retry with only the matching line still goes through.
    service
        .attach_lines_to_invoice(&acct, tenant_id, invoice.id_typed(), &[own_line])
        .unwrap();
    let stored_invoice = service.invoices().get(tenant_id, invoice.id_typed()).unwrap();
    assert_eq!(stored_invoice.line_ids(), &[own_line]);
}

#[test]
fn exception_resolution_ignores_cancelled_material() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let ctx = sales_ctx();
    let acct = accountant_ctx();

    let sale = service
        .create_sale(&ctx, &party, InvoiceMethod::Order, now())
        .unwrap();
    let sale_id = sale.id_typed();
    service
        .add_line(&ctx, tenant_id, sale_id, product_line(1, 900))
        .unwrap();
    service.quote(&ctx, tenant_id, sale_id).unwrap();
    service.confirm(&ctx, tenant_id, sale_id, now()).unwrap();

    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    let invoice = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    service
        .attach_lines_to_invoice(&acct, tenant_id, invoice.id_typed(), &[loose[0].id_typed()])
        .unwrap();
    service.cancel_invoice(&acct, tenant_id, invoice.id_typed()).unwrap();

    let status = service.process(&ctx, tenant_id, sale_id, now()).unwrap();
    assert_eq!(status, InvoicingStatus::Exception);

    let status = service
        .handle_invoice_exception(&ctx, tenant_id, sale_id, now())
        .unwrap();
    assert_eq!(status, InvoicingStatus::None);

    let sale = service.sales().get(tenant_id, sale_id).unwrap();
    assert!(sale.invoices_ignored().contains(&invoice.id_typed()));
    assert!(sale.invoice_lines_ignored().contains(&loose[0].id_typed()));

    // Resolving again changes nothing; the ignored sets only ever grow.
    let status = service
        .handle_invoice_exception(&ctx, tenant_id, sale_id, now())
        .unwrap();
    assert_eq!(status, InvoicingStatus::None);
    let sale = service.sales().get(tenant_id, sale_id).unwrap();
    assert_eq!(sale.invoice_lines_ignored().len(), 1);
}

#[test]
fn exception_resolution_is_a_no_op_on_finished_sales() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let ctx = sales_ctx();
    let acct = accountant_ctx();

    let sale = service
        .create_sale(&ctx, &party, InvoiceMethod::Order, now())
        .unwrap();
    let sale_id = sale.id_typed();
    service
        .add_line(&ctx, tenant_id, sale_id, product_line(1, 500))
        .unwrap();
    service.quote(&ctx, tenant_id, sale_id).unwrap();
    service.confirm(&ctx, tenant_id, sale_id, now()).unwrap();

    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    let invoice = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    service
        .attach_lines_to_invoice(&acct, tenant_id, invoice.id_typed(), &[loose[0].id_typed()])
        .unwrap();
    service.post_invoice(&acct, tenant_id, invoice.id_typed()).unwrap();
    service.pay_invoice(&acct, tenant_id, invoice.id_typed()).unwrap();
    service.process(&ctx, tenant_id, sale_id, now()).unwrap();
    assert_eq!(
        service.sales().get(tenant_id, sale_id).unwrap().state(),
        SaleState::Done
    );

    // Nothing to resolve and no processing to re-run; the call still
    // succeeds and just re-aggregates the status.
    let status = service
        .handle_invoice_exception(&ctx, tenant_id, sale_id, now())
        .unwrap();
    assert_eq!(status, InvoicingStatus::Paid);
}

#[test]
fn ignored_lines_restrict_deletion_until_the_sale_goes() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let ctx = sales_ctx();
    let acct = accountant_ctx();

    let sale = service
        .create_sale(&ctx, &party, InvoiceMethod::Order, now())
        .unwrap();
    let sale_id = sale.id_typed();
    service
        .add_line(&ctx, tenant_id, sale_id, product_line(1, 100))
        .unwrap();
    service.quote(&ctx, tenant_id, sale_id).unwrap();
    service.confirm(&ctx, tenant_id, sale_id, now()).unwrap();

    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    let line_id = loose[0].id_typed();
    let invoice = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    service
        .attach_lines_to_invoice(&acct, tenant_id, invoice.id_typed(), &[line_id])
        .unwrap();
    service.cancel_invoice(&acct, tenant_id, invoice.id_typed()).unwrap();
    service
        .handle_invoice_exception(&ctx, tenant_id, sale_id, now())
        .unwrap();

    let err = service
        .delete_invoice_line(&acct, tenant_id, line_id)
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    // Deleting the sale drops its ignored sets with it.
    service.delete_sale(&ctx, tenant_id, sale_id).unwrap();
    service.delete_invoice_line(&acct, tenant_id, line_id).unwrap();
}

#[test]
fn duplicated_sale_starts_from_a_clean_slate() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let sale = confirmed_five_line_sale(&service, &party);
    let ctx = sales_ctx();
    let acct = accountant_ctx();

    // Put the original into an exception to make the reset visible.
    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    let invoice = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    service
        .attach_lines_to_invoice(&acct, tenant_id, invoice.id_typed(), &[loose[0].id_typed()])
        .unwrap();
    service.cancel_invoice(&acct, tenant_id, invoice.id_typed()).unwrap();
    service
        .handle_invoice_exception(&ctx, tenant_id, sale.id_typed(), now())
        .unwrap();

    let copy = service
        .duplicate_sale(&ctx, tenant_id, sale.id_typed(), now())
        .unwrap();
    assert_ne!(copy.id_typed(), sale.id_typed());
    assert_eq!(copy.state(), SaleState::Draft);
    assert_eq!(copy.invoicing_status(), InvoicingStatus::None);
    assert!(copy.invoices_ignored().is_empty());
    assert!(copy.invoice_lines_ignored().is_empty());
    assert!(copy.invoice_line_ids().is_empty());
    assert_eq!(copy.lines().len(), sale.lines().len());
}

#[test]
fn sale_search_delegates_invoice_line_filters() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);
    let sale = confirmed_five_line_sale(&service, &party);
    let acct = accountant_ctx();

    let loose = service
        .invoice_lines()
        .find_unattached(tenant_id, party.id_typed());
    let invoice = service
        .create_customer_invoice(&acct, tenant_id, party.id_typed(), now())
        .unwrap();
    service
        .attach_lines_to_invoice(&acct, tenant_id, invoice.id_typed(), &[loose[0].id_typed()])
        .unwrap();
    service.cancel_invoice(&acct, tenant_id, invoice.id_typed()).unwrap();

    let hits = service
        .search_sales(
            tenant_id,
            &[SaleFilter::InvoiceLine(InvoiceLineFilter::InvoiceState(
                InvoiceState::Cancelled,
            ))],
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id_typed(), sale.id_typed());

    let hits = service
        .search_sales(
            tenant_id,
            &[
                SaleFilter::Party(party.id_typed()),
                SaleFilter::InvoiceLine(InvoiceLineFilter::Unattached),
            ],
        )
        .unwrap();
    assert_eq!(hits.len(), 1);

    let hits = service
        .search_sales(
            tenant_id,
            &[SaleFilter::InvoiceLine(InvoiceLineFilter::Invoice(
                invoice.id_typed(),
            ))],
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn permissions_gate_each_side_of_the_workflow() {
    saleflow_observability::init();
    let service = InMemorySaleService::in_memory();
    let tenant_id = TenantId::new();
    let party = standalone_customer(tenant_id);

    // The warehouse context cannot create sales.
    let err = service
        .create_sale(&warehouse_ctx(), &party, InvoiceMethod::Order, now())
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    // The sales context cannot drive invoices, even for its own sale. The
    // generated lines still land because the workflow saves them under the
    // system context.
    let sale = confirmed_five_line_sale(&service, &party);
    let err = service
        .create_customer_invoice(&sales_ctx(), tenant_id, party.id_typed(), now())
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
    assert_eq!(
        service
            .invoice_lines()
            .find_unattached(tenant_id, party.id_typed())
            .len(),
        3
    );
    assert_eq!(sale.invoicing_status(), InvoicingStatus::Pending);
}
