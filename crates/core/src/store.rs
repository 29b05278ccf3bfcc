//! Persistence port consumed by the procurement services.
//!
//! Aggregates are loaded independently by id or by foreign-key scan. Every
//! mutation an operation makes is collected in a [`ChangeSet`] and handed to
//! [`ProcurementStore::commit`], which applies all of it or none of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::delivery::{Delivery, DeliveryItem};
use crate::domain::material::{Material, MaterialId};
use crate::domain::purchase_order::{
    PurchaseOrder, PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId,
};
use crate::domain::request::{Request, RequestId};
use crate::domain::site::SiteId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A version check or uniqueness constraint failed; retry with fresh reads.
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Backend(String),
}

/// An update to an aggregate read at `expected_version`. On commit the stored
/// version must still match, and is then incremented.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub expected_version: i64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, expected_version: i64) -> Self {
        Self { value, expected_version }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub new_requests: Vec<Request>,
    pub new_materials: Vec<Material>,
    pub new_purchase_orders: Vec<PurchaseOrder>,
    pub new_purchase_order_items: Vec<PurchaseOrderItem>,
    pub new_deliveries: Vec<Delivery>,
    pub new_delivery_items: Vec<DeliveryItem>,
    pub updated_requests: Vec<Versioned<Request>>,
    pub updated_materials: Vec<Versioned<Material>>,
    pub updated_purchase_orders: Vec<Versioned<PurchaseOrder>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new_requests.is_empty()
            && self.new_materials.is_empty()
            && self.new_purchase_orders.is_empty()
            && self.new_purchase_order_items.is_empty()
            && self.new_deliveries.is_empty()
            && self.new_delivery_items.is_empty()
            && self.updated_requests.is_empty()
            && self.updated_materials.is_empty()
            && self.updated_purchase_orders.is_empty()
    }

    /// Queues a request update, keeping only the latest copy per request.
    pub fn update_request(&mut self, request: Request, expected_version: i64) {
        if let Some(existing) =
            self.updated_requests.iter_mut().find(|entry| entry.value.id == request.id)
        {
            existing.value = request;
            return;
        }
        self.updated_requests.push(Versioned::new(request, expected_version));
    }

    pub fn update_material(&mut self, material: Material, expected_version: i64) {
        self.updated_materials.push(Versioned::new(material, expected_version));
    }

    pub fn update_purchase_order(&mut self, order: PurchaseOrder, expected_version: i64) {
        self.updated_purchase_orders.push(Versioned::new(order, expected_version));
    }
}

#[async_trait]
pub trait ProcurementStore: Send + Sync {
    async fn find_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError>;

    async fn request_reference_exists(&self, reference_code: &str) -> Result<bool, StoreError>;

    /// Requests at `site_id` with `start < window_end AND end > window_start`.
    async fn requests_overlapping(
        &self,
        site_id: &SiteId,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Request>, StoreError>;

    async fn find_material(&self, id: &MaterialId) -> Result<Option<Material>, StoreError>;

    /// Ordered by position.
    async fn materials_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Material>, StoreError>;

    async fn find_purchase_order(
        &self,
        id: &PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError>;

    async fn purchase_order_number_exists(&self, number: &str) -> Result<bool, StoreError>;

    /// Ordered by position.
    async fn purchase_order_items_for_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError>;

    /// Across every order referencing the request.
    async fn purchase_order_items_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<PurchaseOrderItem>, StoreError>;

    async fn deliveries_for_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<Delivery>, StoreError>;

    async fn delivery_items_for_order_item(
        &self,
        purchase_order_item_id: &PurchaseOrderItemId,
    ) -> Result<Vec<DeliveryItem>, StoreError>;

    /// Atomically reserves the next value of the named sequence, starting at 1.
    async fn reserve_sequence(&self, key: &str) -> Result<u32, StoreError>;

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}
