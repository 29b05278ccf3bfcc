use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::purchase_order::{PurchaseOrderId, PurchaseOrderItemId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryCondition {
    Good,
    Damaged,
    PartialDamage,
    Other,
}

impl DeliveryCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Damaged => "damaged",
            Self::PartialDamage => "partial_damage",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "good" => Some(Self::Good),
            "damaged" => Some(Self::Damaged),
            "partial_damage" => Some(Self::PartialDamage),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub purchase_order_id: PurchaseOrderId,
    pub delivered_at: DateTime<Utc>,
    pub verified_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub id: DeliveryItemId,
    pub delivery_id: DeliveryId,
    pub purchase_order_item_id: PurchaseOrderItemId,
    pub quantity: Decimal,
    pub condition: DeliveryCondition,
    pub remarks: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDelivery {
    pub purchase_order_id: PurchaseOrderId,
    pub delivered_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub items: Vec<NewDeliveryItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDeliveryItem {
    pub purchase_order_item_id: PurchaseOrderItemId,
    pub quantity: Decimal,
    pub condition: DeliveryCondition,
    pub remarks: Option<String>,
}

impl NewDeliveryItem {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "delivered quantity for order item {} must be positive, got {}",
                self.purchase_order_item_id.0, self.quantity
            )));
        }
        Ok(())
    }
}
