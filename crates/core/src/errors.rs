use thiserror::Error;

use crate::domain::purchase_order::PurchaseOrderStatus;
use crate::domain::request::RequestStatus;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid request transition from {from:?} to {to:?}")]
    InvalidRequestTransition { from: RequestStatus, to: RequestStatus },
    #[error("invalid purchase order transition from {from:?} to {to:?}")]
    InvalidPurchaseOrderTransition { from: PurchaseOrderStatus, to: PurchaseOrderStatus },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflicting update: {message}")]
    Conflict { message: String, retryable: bool },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Conflicts raised by the store (version moved, sequence collision) can be
    /// retried by the caller with fresh reads.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { retryable: true, .. })
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(message) => Self::Conflict { message, retryable: true },
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String, retryable: bool },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The referenced record does not exist.",
            Self::Conflict { retryable: true, .. } => {
                "The record was changed by someone else. Reload and try again."
            }
            Self::Conflict { retryable: false, .. } => {
                "The operation is not allowed in the record's current state."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        match value {
            ApplicationError::Validation(_)
            | ApplicationError::Domain(DomainError::Validation(_)) => {
                Self::BadRequest { message, correlation_id: String::new() }
            }
            ApplicationError::NotFound { .. } => {
                Self::NotFound { message, correlation_id: String::new() }
            }
            ApplicationError::InvalidState(_)
            | ApplicationError::Domain(DomainError::InvalidRequestTransition { .. })
            | ApplicationError::Domain(DomainError::InvalidPurchaseOrderTransition { .. })
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => {
                Self::Conflict { message, correlation_id: String::new(), retryable: false }
            }
            ApplicationError::Conflict { retryable, .. } => {
                Self::Conflict { message, correlation_id: String::new(), retryable }
            }
            ApplicationError::Persistence(_) => {
                Self::ServiceUnavailable { message, correlation_id: String::new() }
            }
            ApplicationError::Configuration(_) => {
                Self::Internal { message, correlation_id: String::new() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::RequestStatus;
    use crate::store::StoreError;

    use super::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn validation_maps_to_bad_request_with_correlation_id() {
        let interface = ApplicationError::from(DomainError::Validation(
            "material quantity must be positive".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn invalid_transition_maps_to_non_retryable_conflict() {
        let interface = ApplicationError::from(DomainError::InvalidRequestTransition {
            from: RequestStatus::Pending,
            to: RequestStatus::Ordered,
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { retryable: false, .. }));
    }

    #[test]
    fn store_conflict_is_retryable() {
        let error = ApplicationError::from(StoreError::Conflict(
            "request REQ-1 changed since it was read".to_owned(),
        ));
        assert!(error.is_retryable());

        let interface = error.into_interface("req-3");
        assert!(matches!(interface, InterfaceError::Conflict { retryable: true, .. }));
        assert_eq!(
            interface.user_message(),
            "The record was changed by someone else. Reload and try again."
        );
    }

    #[test]
    fn not_found_is_surfaced_and_never_retryable() {
        let error = ApplicationError::not_found("purchase order", "PO-404");
        assert!(!error.is_retryable());
        assert_eq!(error.to_string(), "purchase order `PO-404` not found");
        assert!(matches!(error.into_interface("req-4"), InterfaceError::NotFound { .. }));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::from(StoreError::Backend("disk I/O error".to_owned()))
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("bad sequence width".to_owned())
            .into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
