use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Material,
    Labour,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Material => "material",
            Self::Labour => "labour",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "material" => Some(Self::Material),
            "labour" | "labor" => Some(Self::Labour),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    Pending,
    Approved,
    Rejected,
}

impl MaterialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub request_id: RequestId,
    pub position: u32,
    pub name: String,
    pub quantity: Decimal,
    pub unit: String,
    pub rate_estimate: Decimal,
    pub resource_type: ResourceType,
    pub status: MaterialStatus,
    pub revision: u32,
    pub review_note: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Material {
    pub fn normalized_name(&self) -> String {
        normalize_material_name(&self.name)
    }

    pub fn estimated_cost(&self) -> Decimal {
        self.quantity * self.rate_estimate
    }

    /// Records a reviewer decision.
    pub fn review(&mut self, decision: MaterialStatus, note: Option<String>) {
        self.status = decision;
        self.review_note = note;
        self.updated_at = Utc::now();
    }

    /// Applies a correction to a rejected line: status resets to pending and
    /// the revision counter moves forward.
    pub fn correct(&mut self, correction: MaterialCorrection) -> Result<(), DomainError> {
        if self.status != MaterialStatus::Rejected {
            return Err(DomainError::InvariantViolation(format!(
                "material {} can only be corrected after rejection (status is {})",
                self.id.0,
                self.status.as_str()
            )));
        }
        correction.validate()?;

        if let Some(name) = correction.name {
            self.name = name.trim().to_string();
        }
        if let Some(quantity) = correction.quantity {
            self.quantity = quantity;
        }
        if let Some(unit) = correction.unit {
            self.unit = unit.trim().to_string();
        }
        if let Some(rate_estimate) = correction.rate_estimate {
            self.rate_estimate = rate_estimate;
        }
        self.status = MaterialStatus::Pending;
        self.review_note = None;
        self.revision += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewMaterial {
    pub name: String,
    pub quantity: Decimal,
    pub unit: String,
    pub rate_estimate: Decimal,
    pub resource_type: ResourceType,
}

impl NewMaterial {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_name(&self.name)?;
        validate_quantity(self.quantity)?;
        validate_rate(self.rate_estimate)?;
        if self.unit.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "material `{}` needs a measurement unit",
                self.name.trim()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialCorrection {
    pub name: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub rate_estimate: Option<Decimal>,
}

impl MaterialCorrection {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        if let Some(rate) = self.rate_estimate {
            validate_rate(rate)?;
        }
        if matches!(&self.unit, Some(unit) if unit.trim().is_empty()) {
            return Err(DomainError::Validation("measurement unit cannot be blank".to_string()));
        }
        Ok(())
    }
}

pub fn normalize_material_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::Validation("material name is required".to_string()));
    }
    Ok(())
}

fn validate_quantity(quantity: Decimal) -> Result<(), DomainError> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::Validation(format!(
            "material quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

fn validate_rate(rate: Decimal) -> Result<(), DomainError> {
    if rate < Decimal::ZERO {
        return Err(DomainError::Validation(format!(
            "rate estimate cannot be negative, got {rate}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        normalize_material_name, Material, MaterialCorrection, MaterialId, MaterialStatus,
        NewMaterial, ResourceType,
    };
    use crate::domain::request::RequestId;

    fn material(status: MaterialStatus) -> Material {
        Material {
            id: MaterialId("MAT-1".to_string()),
            request_id: RequestId("REQ-1".to_string()),
            position: 0,
            name: "Cement".to_string(),
            quantity: Decimal::from(100),
            unit: "bag".to_string(),
            rate_estimate: Decimal::new(4_250, 2),
            resource_type: ResourceType::Material,
            status,
            revision: 0,
            review_note: Some("wrong grade".to_string()),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn correction_resets_rejected_material_and_bumps_revision() {
        let mut material = material(MaterialStatus::Rejected);
        material
            .correct(MaterialCorrection {
                quantity: Some(Decimal::from(80)),
                ..MaterialCorrection::default()
            })
            .expect("rejected material accepts corrections");

        assert_eq!(material.status, MaterialStatus::Pending);
        assert_eq!(material.revision, 1);
        assert_eq!(material.quantity, Decimal::from(80));
        assert_eq!(material.review_note, None);
    }

    #[test]
    fn correction_is_refused_unless_rejected() {
        let mut material = material(MaterialStatus::Approved);
        assert!(material.correct(MaterialCorrection::default()).is_err());
        assert_eq!(material.revision, 0);
    }

    #[test]
    fn correction_with_non_positive_quantity_leaves_material_untouched() {
        let mut material = material(MaterialStatus::Rejected);
        let result = material.correct(MaterialCorrection {
            quantity: Some(Decimal::ZERO),
            ..MaterialCorrection::default()
        });

        assert!(result.is_err());
        assert_eq!(material.status, MaterialStatus::Rejected);
        assert_eq!(material.quantity, Decimal::from(100));
    }

    #[test]
    fn new_material_validation() {
        let valid = NewMaterial {
            name: "Sand".to_string(),
            quantity: Decimal::new(25, 1),
            unit: "m3".to_string(),
            rate_estimate: Decimal::ZERO,
            resource_type: ResourceType::Material,
        };
        assert!(valid.validate().is_ok());
        assert!(NewMaterial { quantity: Decimal::new(-1, 0), ..valid.clone() }.validate().is_err());
        assert!(NewMaterial { name: "  ".to_string(), ..valid.clone() }.validate().is_err());
        assert!(NewMaterial { unit: String::new(), ..valid }.validate().is_err());
    }

    #[test]
    fn names_normalize_case_and_whitespace() {
        assert_eq!(normalize_material_name("  Portland CEMENT "), "portland cement");
    }
}
