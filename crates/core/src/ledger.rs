//! Requested/ordered/delivered sums for a request and per purchase-order item.
//!
//! Sums are always recomputed from the full item collections; nothing here is
//! cached between calls.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::delivery::DeliveryItem;
use crate::domain::material::Material;
use crate::domain::purchase_order::{PurchaseOrderItem, PurchaseOrderItemId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityLedger {
    pub requested: Decimal,
    pub ordered: Decimal,
    pub delivered: Decimal,
}

impl QuantityLedger {
    pub fn new(requested: Decimal, ordered: Decimal, delivered: Decimal) -> Self {
        Self { requested, ordered, delivered }
    }

    /// Builds a request's ledger from its materials, every purchase-order item
    /// referencing it, and the delivery items recorded against those order items.
    pub fn for_request(
        materials: &[Material],
        order_items: &[PurchaseOrderItem],
        delivery_items: &[DeliveryItem],
    ) -> Self {
        let delivered_by_item = delivered_by_order_item(delivery_items);
        let delivered = order_items
            .iter()
            .map(|item| delivered_by_item.get(&item.id).copied().unwrap_or(Decimal::ZERO))
            .sum();

        Self {
            requested: requested_quantity(materials),
            ordered: order_items.iter().map(|item| item.quantity).sum(),
            delivered,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemLedger {
    pub item_id: PurchaseOrderItemId,
    pub ordered: Decimal,
    pub delivered: Decimal,
}

impl OrderItemLedger {
    pub fn is_fully_delivered(&self) -> bool {
        self.delivered >= self.ordered
    }

    pub fn outstanding(&self) -> Decimal {
        (self.ordered - self.delivered).max(Decimal::ZERO)
    }
}

/// One ledger per order item, in order-item order.
pub fn order_item_ledgers(
    order_items: &[PurchaseOrderItem],
    delivery_items: &[DeliveryItem],
) -> Vec<OrderItemLedger> {
    let delivered_by_item = delivered_by_order_item(delivery_items);
    order_items
        .iter()
        .map(|item| OrderItemLedger {
            item_id: item.id.clone(),
            ordered: item.quantity,
            delivered: delivered_by_item.get(&item.id).copied().unwrap_or(Decimal::ZERO),
        })
        .collect()
}

pub fn requested_quantity(materials: &[Material]) -> Decimal {
    materials.iter().map(|material| material.quantity).sum()
}

pub fn delivered_by_order_item(
    delivery_items: &[DeliveryItem],
) -> HashMap<PurchaseOrderItemId, Decimal> {
    let mut totals: HashMap<PurchaseOrderItemId, Decimal> = HashMap::new();
    for item in delivery_items {
        *totals.entry(item.purchase_order_item_id.clone()).or_insert(Decimal::ZERO) +=
            item.quantity;
    }
    totals
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::delivery::{DeliveryCondition, DeliveryId, DeliveryItem, DeliveryItemId};
    use crate::domain::material::{Material, MaterialId, MaterialStatus, ResourceType};
    use crate::domain::purchase_order::{PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId};
    use crate::domain::request::RequestId;

    use super::{order_item_ledgers, QuantityLedger};

    fn material(id: &str, quantity: i64) -> Material {
        Material {
            id: MaterialId(id.to_string()),
            request_id: RequestId("REQ-1".to_string()),
            position: 0,
            name: id.to_string(),
            quantity: Decimal::from(quantity),
            unit: "bag".to_string(),
            rate_estimate: Decimal::ZERO,
            resource_type: ResourceType::Material,
            status: MaterialStatus::Approved,
            revision: 0,
            review_note: None,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    fn order_item(id: &str, order: &str, quantity: i64) -> PurchaseOrderItem {
        PurchaseOrderItem {
            id: PurchaseOrderItemId(id.to_string()),
            purchase_order_id: PurchaseOrderId(order.to_string()),
            request_id: RequestId("REQ-1".to_string()),
            position: 0,
            description: "Cement".to_string(),
            quantity: Decimal::from(quantity),
            unit_price: Decimal::ONE,
            total_price: Decimal::from(quantity),
        }
    }

    fn delivered(item: &str, quantity: i64) -> DeliveryItem {
        DeliveryItem {
            id: DeliveryItemId(format!("DI-{item}-{quantity}")),
            delivery_id: DeliveryId("DEL-1".to_string()),
            purchase_order_item_id: PurchaseOrderItemId(item.to_string()),
            quantity: Decimal::from(quantity),
            condition: DeliveryCondition::Good,
            remarks: None,
        }
    }

    #[test]
    fn request_ledger_sums_across_orders_and_deliveries() {
        let ledger = QuantityLedger::for_request(
            &[material("cement", 60), material("sand", 40)],
            &[order_item("POI-1", "PO-1", 70), order_item("POI-2", "PO-2", 30)],
            &[delivered("POI-1", 50), delivered("POI-1", 20), delivered("POI-2", 10)],
        );

        assert_eq!(
            ledger,
            QuantityLedger::new(Decimal::from(100), Decimal::from(100), Decimal::from(80))
        );
    }

    #[test]
    fn deliveries_for_foreign_items_are_ignored() {
        let ledger = QuantityLedger::for_request(
            &[material("cement", 10)],
            &[order_item("POI-1", "PO-1", 10)],
            &[delivered("POI-9", 10)],
        );

        assert_eq!(ledger.delivered, Decimal::ZERO);
    }

    #[test]
    fn item_ledgers_track_outstanding_quantity() {
        let ledgers = order_item_ledgers(
            &[order_item("POI-1", "PO-1", 10), order_item("POI-2", "PO-1", 5)],
            &[delivered("POI-1", 4), delivered("POI-2", 7)],
        );

        assert_eq!(ledgers[0].outstanding(), Decimal::from(6));
        assert!(!ledgers[0].is_fully_delivered());
        assert_eq!(ledgers[1].outstanding(), Decimal::ZERO);
        assert!(ledgers[1].is_fully_delivered());
    }
}
