//! Purchase-order placement and closure.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::info;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::closure::closure_transition;
use crate::domain::purchase_order::{
    NewPurchaseOrder, PurchaseOrder, PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId,
    PurchaseOrderStatus,
};
use crate::domain::request::{Request, RequestId, RequestStatus, StatusChange};
use crate::domain::site::Actor;
use crate::errors::ApplicationError;
use crate::ledger::order_item_ledgers;
use crate::sequence::{SequenceAllocator, SequenceKind};
use crate::services::{
    apply_reconciliation, audit_context, commit_changes, emit_status_change, new_id,
    request_ledger,
};
use crate::store::{ChangeSet, ProcurementStore};

#[derive(Clone, Debug, PartialEq)]
pub struct CreatedPurchaseOrder {
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
    pub status_changes: Vec<StatusChange>,
}

#[derive(Clone)]
pub struct PurchaseOrderService {
    store: Arc<dyn ProcurementStore>,
    audit: Arc<dyn AuditSink>,
    allocator: SequenceAllocator,
}

impl PurchaseOrderService {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        audit: Arc<dyn AuditSink>,
        allocator: SequenceAllocator,
    ) -> Self {
        Self { store, audit, allocator }
    }

    pub async fn create_purchase_order(
        &self,
        actor: &Actor,
        input: NewPurchaseOrder,
    ) -> Result<CreatedPurchaseOrder, ApplicationError> {
        if input.items.is_empty() {
            return Err(ApplicationError::Validation(
                "a purchase order needs at least one item".to_string(),
            ));
        }
        for item in &input.items {
            item.validate()?;
        }

        let mut requests: BTreeMap<RequestId, Request> = BTreeMap::new();
        for item in &input.items {
            if requests.contains_key(&item.request_id) {
                continue;
            }
            let request = self
                .store
                .find_request(&item.request_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found("request", item.request_id.0.clone()))?;
            if request.project_id != input.project_id {
                return Err(ApplicationError::InvalidState(format!(
                    "request {} belongs to project {}, not {}",
                    request.id.0, request.project_id.0, input.project_id.0
                )));
            }
            if !request.status.accepts_orders() {
                return Err(ApplicationError::InvalidState(format!(
                    "request {} is {} and cannot be ordered",
                    request.id.0,
                    request.status.as_str()
                )));
            }
            requests.insert(request.id.clone(), request);
        }

        let now = Utc::now();
        let number = self
            .allocator
            .allocate(self.store.as_ref(), SequenceKind::PurchaseOrder, now.year())
            .await?;
        let order = PurchaseOrder {
            id: PurchaseOrderId(new_id()),
            number,
            project_id: input.project_id,
            site_id: input.site_id,
            status: PurchaseOrderStatus::Open,
            created_by: actor.user_id.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let mut items = Vec::with_capacity(input.items.len());
        for (position, line) in input.items.into_iter().enumerate() {
            items.push(PurchaseOrderItem::new(
                PurchaseOrderItemId(new_id()),
                order.id.clone(),
                u32::try_from(position).unwrap_or(u32::MAX),
                line,
            )?);
        }

        let mut changes = ChangeSet::default();
        let mut status_changes = Vec::new();
        for (request_id, mut request) in requests {
            let expected_version = request.version;
            let change = if request.status == RequestStatus::Approved {
                Some(request.transition_to(RequestStatus::Ordered)?)
            } else {
                let ledger = request_ledger(self.store.as_ref(), &request_id, &items, &[]).await?;
                apply_reconciliation(&mut request, &ledger)?
            };
            status_changes.extend(change);
            changes.update_request(request, expected_version);
        }

        changes.new_purchase_orders.push(order.clone());
        changes.new_purchase_order_items = items.clone();
        let context = audit_context(actor);
        commit_changes(
            self.store.as_ref(),
            self.audit.as_ref(),
            &context,
            "purchase_order.create",
            changes,
        )
        .await?;

        info!(
            event_name = "procurement.purchase_order.created",
            purchase_order_id = %order.id.0,
            number = %order.number,
            items = items.len(),
            requests_moved = status_changes.len(),
            "purchase order created"
        );
        self.audit.emit(
            AuditEvent::new(
                &context,
                "purchase_order.created",
                AuditCategory::Ordering,
                AuditOutcome::Success,
            )
            .for_purchase_order(&order.id)
            .with_metadata("number", order.number.clone())
            .with_metadata("items", items.len().to_string()),
        );
        for change in &status_changes {
            emit_status_change(self.audit.as_ref(), &context, AuditCategory::Ordering, change);
        }

        Ok(CreatedPurchaseOrder { order, items, status_changes })
    }

    /// Closes an open order whose items are all delivered in full. Returns
    /// `true` only when this call closed it.
    pub async fn close_if_complete(
        &self,
        actor: &Actor,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<bool, ApplicationError> {
        let mut order = self.store.find_purchase_order(purchase_order_id).await?.ok_or_else(|| {
            ApplicationError::not_found("purchase order", purchase_order_id.0.clone())
        })?;

        let items = self.store.purchase_order_items_for_order(purchase_order_id).await?;
        let mut delivered = Vec::new();
        for item in &items {
            delivered.extend(self.store.delivery_items_for_order_item(&item.id).await?);
        }

        let ledgers = order_item_ledgers(&items, &delivered);
        let Some(next) = closure_transition(order.status, &ledgers) else {
            return Ok(false);
        };

        let expected_version = order.version;
        order.transition_to(next)?;
        let mut changes = ChangeSet::default();
        changes.update_purchase_order(order.clone(), expected_version);
        let context = audit_context(actor);
        commit_changes(
            self.store.as_ref(),
            self.audit.as_ref(),
            &context,
            "purchase_order.close",
            changes,
        )
        .await?;

        info!(
            event_name = "procurement.purchase_order.closed",
            purchase_order_id = %order.id.0,
            number = %order.number,
            "purchase order closed"
        );
        self.audit.emit(
            AuditEvent::new(
                &context,
                "purchase_order.closed",
                AuditCategory::Ordering,
                AuditOutcome::Success,
            )
            .for_purchase_order(&order.id),
        );
        Ok(true)
    }
}
