//! Permissions checked at the service and store boundaries.

use saleflow_core::Permission;

/// Manage sales: create, edit, confirm, resolve exceptions.
pub fn sale_manage() -> Permission {
    Permission::new("sale.manage")
}

/// Record shipped quantities on processing sales.
pub fn stock_ship() -> Permission {
    Permission::new("stock.ship")
}

/// Manage invoices: create, attach/detach lines, post, pay, cancel.
pub fn invoice_manage() -> Permission {
    Permission::new("invoice.manage")
}

/// Write invoice lines directly. Sale confirmation saves its generated
/// lines under the system context instead of requiring this from the
/// acting sales user.
pub fn invoice_line_write() -> Permission {
    Permission::new("invoice_line.write")
}
