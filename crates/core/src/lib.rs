pub mod approval;
pub mod audit;
pub mod closure;
pub mod config;
pub mod domain;
pub mod duplicates;
pub mod errors;
pub mod ledger;
pub mod reconciliation;
pub mod sequence;
pub mod services;
pub mod store;

pub use approval::aggregate_material_statuses;
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use closure::{closure_transition, is_complete};
pub use domain::delivery::{
    Delivery, DeliveryCondition, DeliveryId, DeliveryItem, DeliveryItemId, NewDelivery,
    NewDeliveryItem,
};
pub use domain::material::{
    Material, MaterialCorrection, MaterialId, MaterialStatus, NewMaterial, ResourceType,
};
pub use domain::purchase_order::{
    NewPurchaseOrder, NewPurchaseOrderItem, PurchaseOrder, PurchaseOrderId, PurchaseOrderItem,
    PurchaseOrderItemId, PurchaseOrderStatus,
};
pub use domain::request::{
    NewRequest, PlannedWindow, Priority, Request, RequestId, RequestStatus, StatusChange,
};
pub use domain::site::{Actor, ActorRole, ProjectId, SiteId};
pub use duplicates::{DuplicateDetectorConfig, DuplicateWarning};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ledger::{OrderItemLedger, QuantityLedger};
pub use reconciliation::{derive_fulfilment_status, reconcile, ReconciliationOutcome};
pub use store::{ChangeSet, ProcurementStore, StoreError};
