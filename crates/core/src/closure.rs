use crate::domain::purchase_order::PurchaseOrderStatus;
use crate::ledger::OrderItemLedger;

/// An order is complete when every line has been delivered in full. An order
/// without lines is never complete.
pub fn is_complete(items: &[OrderItemLedger]) -> bool {
    !items.is_empty() && items.iter().all(OrderItemLedger::is_fully_delivered)
}

/// `Some(Closed)` when an open order has become complete. Closed orders stay
/// closed regardless of later deliveries.
pub fn closure_transition(
    status: PurchaseOrderStatus,
    items: &[OrderItemLedger],
) -> Option<PurchaseOrderStatus> {
    match status {
        PurchaseOrderStatus::Open if is_complete(items) => Some(PurchaseOrderStatus::Closed),
        _ => None,
    }
}
