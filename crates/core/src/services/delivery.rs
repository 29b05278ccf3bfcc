//! Delivery recording and request reconciliation.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::closure::closure_transition;
use crate::domain::delivery::{Delivery, DeliveryId, DeliveryItem, DeliveryItemId, NewDelivery};
use crate::domain::purchase_order::{PurchaseOrder, PurchaseOrderItemId};
use crate::domain::request::{RequestId, StatusChange};
use crate::domain::site::Actor;
use crate::errors::ApplicationError;
use crate::ledger::order_item_ledgers;
use crate::services::{
    apply_reconciliation, audit_context, commit_changes, emit_status_change, new_id,
    request_ledger,
};
use crate::store::{ChangeSet, ProcurementStore};

#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryReceipt {
    pub delivery: Delivery,
    pub items: Vec<DeliveryItem>,
    pub status_changes: Vec<StatusChange>,
    pub order_closed: bool,
}

#[derive(Clone)]
pub struct DeliveryService {
    store: Arc<dyn ProcurementStore>,
    audit: Arc<dyn AuditSink>,
}

impl DeliveryService {
    pub fn new(store: Arc<dyn ProcurementStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Records a delivery against a purchase order, reconciles every request
    /// the order serves, and closes the order once it is fully delivered.
    pub async fn record_delivery(
        &self,
        actor: &Actor,
        input: NewDelivery,
    ) -> Result<DeliveryReceipt, ApplicationError> {
        if input.items.is_empty() {
            return Err(ApplicationError::Validation(
                "a delivery needs at least one item".to_string(),
            ));
        }
        for item in &input.items {
            item.validate()?;
        }

        let order_id = input.purchase_order_id.clone();
        let mut order = self
            .store
            .find_purchase_order(&order_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("purchase order", order_id.0.clone()))?;
        let order_items = self.store.purchase_order_items_for_order(&order_id).await?;

        let known: HashSet<&PurchaseOrderItemId> =
            order_items.iter().map(|item| &item.id).collect();
        if let Some(foreign) =
            input.items.iter().find(|item| !known.contains(&item.purchase_order_item_id))
        {
            return Err(ApplicationError::InvalidState(format!(
                "order item {} is not part of purchase order {}",
                foreign.purchase_order_item_id.0, order.number
            )));
        }

        let now = Utc::now();
        let delivery = Delivery {
            id: DeliveryId(new_id()),
            purchase_order_id: order_id.clone(),
            delivered_at: input.delivered_at,
            verified_by: actor.user_id.clone(),
            notes: input.notes.filter(|text| !text.trim().is_empty()),
            created_at: now,
        };
        let items: Vec<DeliveryItem> = input
            .items
            .into_iter()
            .map(|line| DeliveryItem {
                id: DeliveryItemId(new_id()),
                delivery_id: delivery.id.clone(),
                purchase_order_item_id: line.purchase_order_item_id,
                quantity: line.quantity,
                condition: line.condition,
                remarks: line.remarks.filter(|text| !text.trim().is_empty()),
            })
            .collect();

        let mut changes = ChangeSet::default();
        let mut status_changes = Vec::new();

        // Headers are written back at their read version even when unchanged,
        // so overlapping deliveries on the same order or request conflict.
        let served: BTreeSet<RequestId> =
            order_items.iter().map(|item| item.request_id.clone()).collect();
        for request_id in &served {
            let mut request = self
                .store
                .find_request(request_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found("request", request_id.0.clone()))?;
            let expected_version = request.version;
            let ledger = request_ledger(self.store.as_ref(), request_id, &[], &items).await?;
            if let Some(change) = apply_reconciliation(&mut request, &ledger)? {
                status_changes.push(change);
            }
            changes.update_request(request, expected_version);
        }

        let mut delivered = items.clone();
        for item in &order_items {
            delivered.extend(self.store.delivery_items_for_order_item(&item.id).await?);
        }
        let ledgers = order_item_ledgers(&order_items, &delivered);
        let order_version = order.version;
        let order_closed = match closure_transition(order.status, &ledgers) {
            Some(next) => {
                order.transition_to(next)?;
                true
            }
            None => false,
        };
        changes.update_purchase_order(order.clone(), order_version);

        changes.new_deliveries.push(delivery.clone());
        changes.new_delivery_items = items.clone();
        let context = audit_context(actor);
        commit_changes(
            self.store.as_ref(),
            self.audit.as_ref(),
            &context,
            "delivery.record",
            changes,
        )
        .await?;

        info!(
            event_name = "procurement.delivery.recorded",
            delivery_id = %delivery.id.0,
            purchase_order_id = %order_id.0,
            items = items.len(),
            requests_moved = status_changes.len(),
            order_closed,
            "delivery recorded"
        );
        self.emit_receipt(&context, &order, &delivery, &status_changes, order_closed);

        Ok(DeliveryReceipt { delivery, items, status_changes, order_closed })
    }

    /// Re-derives a request's fulfilment status from the stored ledgers.
    /// Writes nothing when the status is already current.
    pub async fn reconcile(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> Result<Option<StatusChange>, ApplicationError> {
        let mut request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("request", request_id.0.clone()))?;
        let expected_version = request.version;

        let ledger = request_ledger(self.store.as_ref(), request_id, &[], &[]).await?;
        let Some(change) = apply_reconciliation(&mut request, &ledger)? else {
            debug!(
                event_name = "procurement.reconcile.unchanged",
                request_id = %request_id.0,
                status = request.status.as_str(),
                "request status already current"
            );
            return Ok(None);
        };

        let mut changes = ChangeSet::default();
        changes.update_request(request, expected_version);
        let context = audit_context(actor);
        commit_changes(
            self.store.as_ref(),
            self.audit.as_ref(),
            &context,
            "request.reconcile",
            changes,
        )
        .await?;

        info!(
            event_name = "procurement.reconcile.applied",
            request_id = %request_id.0,
            from = change.from.as_str(),
            to = change.to.as_str(),
            "request status reconciled"
        );
        emit_status_change(self.audit.as_ref(), &context, AuditCategory::Reconciliation, &change);
        Ok(Some(change))
    }

    fn emit_receipt(
        &self,
        context: &AuditContext,
        order: &PurchaseOrder,
        delivery: &Delivery,
        status_changes: &[StatusChange],
        order_closed: bool,
    ) {
        self.audit.emit(
            AuditEvent::new(
                context,
                "delivery.recorded",
                AuditCategory::Delivery,
                AuditOutcome::Success,
            )
            .for_purchase_order(&order.id)
            .with_metadata("delivery_id", delivery.id.0.clone())
            .with_metadata("order_closed", order_closed.to_string()),
        );
        for change in status_changes {
            let category = AuditCategory::Reconciliation;
            emit_status_change(self.audit.as_ref(), context, category, change);
        }
        if order_closed {
            self.audit.emit(
                AuditEvent::new(
                    context,
                    "purchase_order.closed",
                    AuditCategory::Delivery,
                    AuditOutcome::Success,
                )
                .for_purchase_order(&order.id),
            );
        }
    }
}
