use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use boqtrack_core::domain::delivery::{Delivery, DeliveryItem};
use boqtrack_core::domain::material::{Material, MaterialId};
use boqtrack_core::domain::purchase_order::{
    PurchaseOrder, PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId,
};
use boqtrack_core::domain::request::{Request, RequestId};
use boqtrack_core::domain::site::SiteId;
use boqtrack_core::store::{ChangeSet, ProcurementStore, StoreError};

/// Every table behind one lock, so a commit is validated and applied as a
/// single step.
#[derive(Default)]
pub struct InMemoryProcurementStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    requests: HashMap<String, Request>,
    materials: HashMap<String, Material>,
    purchase_orders: HashMap<String, PurchaseOrder>,
    purchase_order_items: HashMap<String, PurchaseOrderItem>,
    deliveries: HashMap<String, Delivery>,
    // Insertion order doubles as the recorded order of delivery lines.
    delivery_items: Vec<DeliveryItem>,
    sequences: HashMap<String, u32>,
}

impl InMemoryProcurementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn validate(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        let mut reference_codes: HashSet<&str> =
            self.requests.values().map(|request| request.reference_code.as_str()).collect();
        for request in &changes.new_requests {
            if self.requests.contains_key(&request.id.0) {
                return Err(duplicate_key("request", &request.id.0));
            }
            if !reference_codes.insert(request.reference_code.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "request reference `{}` is already taken",
                    request.reference_code
                )));
            }
        }

        let mut numbers: HashSet<&str> =
            self.purchase_orders.values().map(|order| order.number.as_str()).collect();
        for order in &changes.new_purchase_orders {
            if self.purchase_orders.contains_key(&order.id.0) {
                return Err(duplicate_key("purchase order", &order.id.0));
            }
            if !numbers.insert(order.number.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "purchase order number `{}` is already taken",
                    order.number
                )));
            }
        }

        for material in &changes.new_materials {
            if self.materials.contains_key(&material.id.0) {
                return Err(duplicate_key("material", &material.id.0));
            }
        }
        for item in &changes.new_purchase_order_items {
            if self.purchase_order_items.contains_key(&item.id.0) {
                return Err(duplicate_key("purchase order item", &item.id.0));
            }
        }
        for delivery in &changes.new_deliveries {
            if self.deliveries.contains_key(&delivery.id.0) {
                return Err(duplicate_key("delivery", &delivery.id.0));
            }
        }

        for update in &changes.updated_requests {
            let stored = self.requests.get(&update.value.id.0).map(|request| request.version);
            check_version("request", &update.value.id.0, stored, update.expected_version)?;
        }
        for update in &changes.updated_materials {
            let stored = self.materials.get(&update.value.id.0).map(|material| material.version);
            check_version("material", &update.value.id.0, stored, update.expected_version)?;
        }
        for update in &changes.updated_purchase_orders {
            let stored = self.purchase_orders.get(&update.value.id.0).map(|order| order.version);
            check_version("purchase order", &update.value.id.0, stored, update.expected_version)?;
        }

        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for request in changes.new_requests {
            self.requests.insert(request.id.0.clone(), request);
        }
        for material in changes.new_materials {
            self.materials.insert(material.id.0.clone(), material);
        }
        for order in changes.new_purchase_orders {
            self.purchase_orders.insert(order.id.0.clone(), order);
        }
        for item in changes.new_purchase_order_items {
            self.purchase_order_items.insert(item.id.0.clone(), item);
        }
        for delivery in changes.new_deliveries {
            self.deliveries.insert(delivery.id.0.clone(), delivery);
        }
        self.delivery_items.extend(changes.new_delivery_items);

        for update in changes.updated_requests {
            let mut request = update.value;
            request.version = update.expected_version + 1;
            self.requests.insert(request.id.0.clone(), request);
        }
        for update in changes.updated_materials {
            let mut material = update.value;
            material.version = update.expected_version + 1;
            self.materials.insert(material.id.0.clone(), material);
        }
        for update in changes.updated_purchase_orders {
            let mut order = update.value;
            order.version = update.expected_version + 1;
            self.purchase_orders.insert(order.id.0.clone(), order);
        }
    }
}

fn duplicate_key(entity: &str, id: &str) -> StoreError {
    StoreError::Conflict(format!("{entity} `{id}` already exists"))
}

fn check_version(
    entity: &str,
    id: &str,
    stored: Option<i64>,
    expected: i64,
) -> Result<(), StoreError> {
    match stored {
        Some(version) if version == expected => Ok(()),
        Some(version) => Err(StoreError::Conflict(format!(
            "{entity} `{id}` was modified concurrently \
             (expected version {expected}, found {version})"
        ))),
        None => Err(StoreError::Backend(format!("{entity} `{id}` does not exist"))),
    }
}

#[async_trait]
impl ProcurementStore for InMemoryProcurementStore {
    async fn find_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.requests.get(&id.0).cloned())
    }

    async fn request_reference_exists(&self, reference_code: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.requests.values().any(|request| request.reference_code == reference_code))
    }

    async fn requests_overlapping(
        &self,
        site_id: &SiteId,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Request>, StoreError> {
        let tables = self.tables.read().await;
        let mut requests: Vec<Request> = tables
            .requests
            .values()
            .filter(|request| &request.site_id == site_id)
            .filter(|request| {
                request.window.start() < window_end && request.window.end() > window_start
            })
            .cloned()
            .collect();
        requests.sort_by(|left, right| {
            left.window.start().cmp(&right.window.start()).then_with(|| left.id.cmp(&right.id))
        });
        Ok(requests)
    }

    async fn find_material(&self, id: &MaterialId) -> Result<Option<Material>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.materials.get(&id.0).cloned())
    }

    async fn materials_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Material>, StoreError> {
        let tables = self.tables.read().await;
        let mut materials: Vec<Material> = tables
            .materials
            .values()
            .filter(|material| &material.request_id == request_id)
            .cloned()
            .collect();
        materials.sort_by_key(|material| material.position);
        Ok(materials)
    }

    async fn find_purchase_order(
        &self,
        id: &PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.purchase_orders.get(&id.0).cloned())
    }

    async fn purchase_order_number_exists(&self, number: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.purchase_orders.values().any(|order| order.number == number))
    }

    async fn purchase_order_items_for_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<PurchaseOrderItem> = tables
            .purchase_order_items
            .values()
            .filter(|item| &item.purchase_order_id == purchase_order_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    async fn purchase_order_items_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<PurchaseOrderItem> = tables
            .purchase_order_items
            .values()
            .filter(|item| &item.request_id == request_id)
            .cloned()
            .collect();
        items.sort_by(|left, right| {
            left.purchase_order_id
                .0
                .cmp(&right.purchase_order_id.0)
                .then_with(|| left.position.cmp(&right.position))
        });
        Ok(items)
    }

    async fn deliveries_for_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<Delivery>, StoreError> {
        let tables = self.tables.read().await;
        let mut deliveries: Vec<Delivery> = tables
            .deliveries
            .values()
            .filter(|delivery| &delivery.purchase_order_id == purchase_order_id)
            .cloned()
            .collect();
        deliveries.sort_by(|left, right| {
            left.delivered_at.cmp(&right.delivered_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(deliveries)
    }

    async fn delivery_items_for_order_item(
        &self,
        purchase_order_item_id: &PurchaseOrderItemId,
    ) -> Result<Vec<DeliveryItem>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .delivery_items
            .iter()
            .filter(|item| &item.purchase_order_item_id == purchase_order_item_id)
            .cloned()
            .collect())
    }

    async fn reserve_sequence(&self, key: &str) -> Result<u32, StoreError> {
        let mut tables = self.tables.write().await;
        let counter = tables.sequences.entry(key.to_string()).or_insert(0);
        *counter = counter.checked_add(1).ok_or_else(|| {
            StoreError::Backend(format!("sequence `{key}` is exhausted"))
        })?;
        Ok(*counter)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables.write().await;
        tables.validate(&changes)?;
        tables.apply(changes);
        Ok(())
    }
}
