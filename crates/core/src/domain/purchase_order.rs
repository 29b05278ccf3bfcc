use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;
use crate::domain::site::{ProjectId, SiteId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseOrderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseOrderItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Open,
    Closed,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    // No re-open transition exists; closed orders stay closed.
    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        matches!((self, next), (Self::Open, Self::Closed))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub number: String,
    pub project_id: ProjectId,
    pub site_id: Option<SiteId>,
    pub status: PurchaseOrderStatus,
    pub created_by: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn transition_to(&mut self, next: PurchaseOrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidPurchaseOrderTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: PurchaseOrderItemId,
    pub purchase_order_id: PurchaseOrderId,
    pub request_id: RequestId,
    pub position: u32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl PurchaseOrderItem {
    pub fn new(
        id: PurchaseOrderItemId,
        purchase_order_id: PurchaseOrderId,
        position: u32,
        line: NewPurchaseOrderItem,
    ) -> Result<Self, DomainError> {
        line.validate()?;
        Ok(Self {
            id,
            purchase_order_id,
            request_id: line.request_id,
            position,
            description: line.description.trim().to_string(),
            total_price: line.quantity * line.unit_price,
            quantity: line.quantity,
            unit_price: line.unit_price,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub project_id: ProjectId,
    pub site_id: Option<SiteId>,
    pub items: Vec<NewPurchaseOrderItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPurchaseOrderItem {
    pub request_id: RequestId,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl NewPurchaseOrderItem {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "ordered quantity for request {} must be positive, got {}",
                self.request_id.0, self.quantity
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "unit price for request {} cannot be negative, got {}",
                self.request_id.0, self.unit_price
            )));
        }
        Ok(())
    }
}
