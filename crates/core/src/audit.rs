use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::purchase_order::PurchaseOrderId;
use crate::domain::request::RequestId;
use crate::domain::site::Actor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Approval,
    Ordering,
    Delivery,
    Reconciliation,
    Persistence,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approval => "approval",
            Self::Ordering => "ordering",
            Self::Delivery => "delivery",
            Self::Reconciliation => "reconciliation",
            Self::Persistence => "persistence",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub correlation_id: String,
    pub actor: String,
    pub actor_role: Option<String>,
}

impl AuditContext {
    pub fn new(correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), actor: actor.into(), actor_role: None }
    }

    /// A context with a fresh correlation id, for callers outside a request scope.
    pub fn system(actor: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), actor)
    }

    /// A fresh context attributed to `actor`, role included.
    pub fn for_actor(actor: &Actor) -> Self {
        Self { actor_role: Some(actor.role.as_str().to_string()), ..Self::system(&actor.user_id) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub request_id: Option<RequestId>,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub actor_role: Option<String>,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            request_id: None,
            purchase_order_id: None,
            correlation_id: context.correlation_id.clone(),
            event_type: event_type.into(),
            category,
            actor: context.actor.clone(),
            actor_role: context.actor_role.clone(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn for_request(mut self, request_id: &RequestId) -> Self {
        self.request_id = Some(request_id.clone());
        self
    }

    pub fn for_purchase_order(mut self, purchase_order_id: &PurchaseOrderId) -> Self {
        self.purchase_order_id = Some(purchase_order_id.clone());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.event_type == event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards audit events to the tracing pipeline as structured records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        tracing::info!(
            event_name = "audit.event",
            audit_event_id = %event.event_id,
            audit_event_type = %event.event_type,
            category = event.category.as_str(),
            outcome = event.outcome.as_str(),
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            actor_role = event.actor_role.as_deref().unwrap_or(""),
            request_id = event.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
            purchase_order_id =
                event.purchase_order_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
            metadata = %metadata,
            "audit event recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{
        AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
        TracingAuditSink,
    };
    use crate::domain::request::RequestId;
    use crate::domain::site::{Actor, ActorRole};

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new("corr-123", "pm-1");
        sink.emit(
            AuditEvent::new(
                &context,
                "request.status_changed",
                AuditCategory::Reconciliation,
                AuditOutcome::Success,
            )
            .for_request(&RequestId("REQ-1".to_owned()))
            .with_metadata("from", "ORDERED")
            .with_metadata("to", "PARTIALLY_DELIVERED"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "corr-123");
        assert_eq!(events[0].actor, "pm-1");
        assert_eq!(events[0].request_id.as_ref().map(|id| id.0.as_str()), Some("REQ-1"));
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("PARTIALLY_DELIVERED"));
        assert_eq!(sink.events_of_type("request.status_changed").len(), 1);
        assert!(sink.events_of_type("delivery.recorded").is_empty());
    }

    #[test]
    fn tracing_sink_accepts_events_without_subscriber() {
        let context = AuditContext::system("store");
        TracingAuditSink.emit(AuditEvent::new(
            &context,
            "store.commit_failed",
            AuditCategory::Persistence,
            AuditOutcome::Failed,
        ));
        assert!(!context.correlation_id.is_empty());
    }

    #[test]
    fn actor_context_carries_role_onto_events() {
        let context = AuditContext::for_actor(&Actor::new("store-1", ActorRole::Storekeeper));
        let event = AuditEvent::new(
            &context,
            "delivery.recorded",
            AuditCategory::Delivery,
            AuditOutcome::Success,
        );

        assert_eq!(event.actor, "store-1");
        assert_eq!(event.actor_role.as_deref(), Some("storekeeper"));
        assert_eq!(event.correlation_id, context.correlation_id);
    }
}
