//! Orchestration over the [`ProcurementStore`] port.
//!
//! Each public operation validates its input, loads the aggregates it needs,
//! computes every state change in memory, and hands the result to the store as
//! a single [`ChangeSet`](crate::store::ChangeSet). Audit events are emitted only
//! after the commit succeeded.

pub mod delivery;
pub mod procurement;
pub mod requests;

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::AppConfig;
use crate::domain::delivery::DeliveryItem;
use crate::domain::purchase_order::PurchaseOrderItem;
use crate::domain::request::{Request, RequestId, StatusChange};
use crate::domain::site::Actor;
use crate::errors::DomainError;
use crate::ledger::QuantityLedger;
use crate::reconciliation::reconcile;
use crate::sequence::SequenceAllocator;
use crate::store::{ChangeSet, ProcurementStore, StoreError};

pub use delivery::{DeliveryReceipt, DeliveryService};
pub use procurement::{CreatedPurchaseOrder, PurchaseOrderService};
pub use requests::{ApprovalOutcome, CreatedRequest, RequestCreation, RequestService};

/// The three services wired against one store and one audit sink.
#[derive(Clone)]
pub struct ProcurementServices {
    pub requests: RequestService,
    pub purchase_orders: PurchaseOrderService,
    pub deliveries: DeliveryService,
}

impl ProcurementServices {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        audit: Arc<dyn AuditSink>,
        config: &AppConfig,
    ) -> Self {
        let allocator = SequenceAllocator::from_config(&config.procurement);
        Self {
            requests: RequestService::new(
                store.clone(),
                audit.clone(),
                allocator.clone(),
                config.duplicates,
            ),
            purchase_orders: PurchaseOrderService::new(store.clone(), audit.clone(), allocator),
            deliveries: DeliveryService::new(store, audit),
        }
    }
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn audit_context(actor: &Actor) -> AuditContext {
    AuditContext::for_actor(actor)
}

/// Commits `changes`, recording a failed persistence event under `context`
/// when the store rejects them.
pub(crate) async fn commit_changes(
    store: &dyn ProcurementStore,
    audit: &dyn AuditSink,
    context: &AuditContext,
    operation: &str,
    changes: ChangeSet,
) -> Result<(), StoreError> {
    store.commit(changes).await.map_err(|error| {
        audit.emit(
            AuditEvent::new(
                context,
                "store.commit_failed",
                AuditCategory::Persistence,
                AuditOutcome::Failed,
            )
            .with_metadata("operation", operation)
            .with_metadata("conflict", matches!(error, StoreError::Conflict(_)).to_string())
            .with_metadata("error", error.to_string()),
        );
        error
    })
}

/// Recomputes a request's ledger from the store, counting order and delivery
/// items that are about to be committed alongside it.
pub(crate) async fn request_ledger(
    store: &dyn ProcurementStore,
    request_id: &RequestId,
    pending_order_items: &[PurchaseOrderItem],
    pending_delivery_items: &[DeliveryItem],
) -> Result<QuantityLedger, StoreError> {
    let materials = store.materials_for_request(request_id).await?;

    let mut order_items = store.purchase_order_items_for_request(request_id).await?;
    let mut delivery_items = Vec::new();
    for item in &order_items {
        delivery_items.extend(store.delivery_items_for_order_item(&item.id).await?);
    }
    order_items.extend(
        pending_order_items.iter().filter(|item| &item.request_id == request_id).cloned(),
    );
    delivery_items.extend(pending_delivery_items.iter().cloned());

    Ok(QuantityLedger::for_request(&materials, &order_items, &delivery_items))
}

/// Applies the reconciled fulfilment status to `request` when it differs from
/// the current one.
pub(crate) fn apply_reconciliation(
    request: &mut Request,
    ledger: &QuantityLedger,
) -> Result<Option<StatusChange>, DomainError> {
    let outcome = reconcile(ledger);
    if outcome.under_ordered {
        warn!(
            event_name = "procurement.reconcile.under_ordered",
            request_id = %request.id.0,
            requested = %ledger.requested,
            ordered = %ledger.ordered,
            delivered = %ledger.delivered,
            "order fully delivered but smaller than the requested quantity"
        );
    }

    match outcome.change_from(request.status) {
        Some(next) => request.transition_to(next).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn emit_status_change(
    audit: &dyn AuditSink,
    context: &AuditContext,
    category: AuditCategory,
    change: &StatusChange,
) {
    audit.emit(
        AuditEvent::new(context, "request.status_changed", category, AuditOutcome::Success)
            .for_request(&change.request_id)
            .with_metadata("from", change.from.as_str())
            .with_metadata("to", change.to.as_str()),
    );
}
