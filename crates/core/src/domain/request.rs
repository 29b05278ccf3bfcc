use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::material::NewMaterial;
use crate::domain::site::{ProjectId, SiteId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    PartiallyApproved,
    Rejected,
    Ordered,
    PartiallyDelivered,
    Delivered,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::PartiallyApproved => "partially_approved",
            Self::Rejected => "rejected",
            Self::Ordered => "ordered",
            Self::PartiallyDelivered => "partially_delivered",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "partially_approved" => Some(Self::PartiallyApproved),
            "rejected" => Some(Self::Rejected),
            "ordered" => Some(Self::Ordered),
            "partially_delivered" => Some(Self::PartiallyDelivered),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }

    /// Statuses driven by material review.
    pub fn is_approval_phase(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::PartiallyApproved | Self::Rejected)
    }

    /// Statuses driven by the requested/ordered/delivered ledgers.
    pub fn is_fulfilment_phase(&self) -> bool {
        matches!(self, Self::Ordered | Self::PartiallyDelivered | Self::Delivered)
    }

    /// Statuses a purchase order item may reference.
    pub fn accepts_orders(&self) -> bool {
        matches!(self, Self::Approved | Self::Ordered | Self::PartiallyDelivered)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        if *self == next {
            return false;
        }

        match (self, next) {
            (from, to) if from.is_approval_phase() && to.is_approval_phase() => true,
            (Self::Approved, to) if to.is_fulfilment_phase() => true,
            (from, to) if from.is_fulfilment_phase() && to.is_fulfilment_phase() => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    Urgent,
}

impl Priority {
    pub fn from_emergency(emergency: bool) -> Self {
        if emergency {
            Self::Urgent
        } else {
            Self::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
        }
    }
}

/// Planned usage window. `start` is always strictly before `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl PlannedWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::Validation(format!(
                "planned start {start} must be before planned end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Half-open overlap test.
    pub fn overlaps(&self, other: &PlannedWindow) -> bool {
        self.start < other.end && self.end > other.start
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub reference_code: String,
    pub project_id: ProjectId,
    pub site_id: SiteId,
    pub title: String,
    pub description: Option<String>,
    pub created_by: String,
    pub window: PlannedWindow,
    pub emergency: bool,
    pub priority: Priority,
    pub status: RequestStatus,
    pub duplicate_of: Option<RequestId>,
    pub duplicate_explanation: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        self.status.can_transition_to(next)
    }

    pub fn transition_to(&mut self, next: RequestStatus) -> Result<StatusChange, DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidRequestTransition { from: self.status, to: next });
        }

        let change = StatusChange { request_id: self.id.clone(), from: self.status, to: next };
        self.status = next;
        self.updated_at = Utc::now();
        Ok(change)
    }

    pub fn is_flagged_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub request_id: RequestId,
    pub from: RequestStatus,
    pub to: RequestStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub project_id: ProjectId,
    pub site_id: SiteId,
    pub title: String,
    pub description: Option<String>,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub emergency: bool,
    pub materials: Vec<NewMaterial>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::domain::site::{ProjectId, SiteId};
    use crate::errors::DomainError;

    use super::{PlannedWindow, Priority, Request, RequestId, RequestStatus};

    fn request(status: RequestStatus) -> Request {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid date");
        Request {
            id: RequestId("REQ-1".to_string()),
            reference_code: "BOQ-2026-0001".to_string(),
            project_id: ProjectId("PRJ-1".to_string()),
            site_id: SiteId("SITE-1".to_string()),
            title: "Slab casting".to_string(),
            description: None,
            created_by: "eng-1".to_string(),
            window: PlannedWindow::new(start, start + Duration::days(10)).expect("window"),
            emergency: false,
            priority: Priority::Normal,
            status,
            duplicate_of: None,
            duplicate_explanation: None,
            version: 1,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn approved_request_can_be_ordered() {
        let mut request = request(RequestStatus::Approved);
        let change = request.transition_to(RequestStatus::Ordered).expect("approved -> ordered");

        assert_eq!(change.from, RequestStatus::Approved);
        assert_eq!(change.to, RequestStatus::Ordered);
        assert_eq!(request.status, RequestStatus::Ordered);
    }

    #[test]
    fn pending_request_cannot_jump_to_fulfilment() {
        let mut request = request(RequestStatus::Pending);
        let error = request
            .transition_to(RequestStatus::Ordered)
            .expect_err("pending -> ordered should fail");

        assert!(matches!(
            error,
            DomainError::InvalidRequestTransition {
                from: RequestStatus::Pending,
                to: RequestStatus::Ordered
            }
        ));
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[test]
    fn fulfilment_requests_cannot_reenter_approval() {
        for status in
            [RequestStatus::Ordered, RequestStatus::PartiallyDelivered, RequestStatus::Delivered]
        {
            assert!(!status.can_transition_to(RequestStatus::Pending));
            assert!(!status.can_transition_to(RequestStatus::Approved));
        }
    }

    #[test]
    fn partially_approved_request_is_not_orderable() {
        assert!(!RequestStatus::PartiallyApproved.accepts_orders());
        assert!(!RequestStatus::PartiallyApproved.can_transition_to(RequestStatus::Ordered));
    }

    #[test]
    fn same_status_is_not_a_transition() {
        assert!(!RequestStatus::Ordered.can_transition_to(RequestStatus::Ordered));
    }

    #[test]
    fn window_requires_start_before_end() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid date");
        assert!(PlannedWindow::new(start, start).is_err());
        assert!(PlannedWindow::new(start, start - Duration::hours(1)).is_err());
    }

    #[test]
    fn window_overlap_is_half_open() {
        let day = |d: u32| Utc.with_ymd_and_hms(2026, 3, d, 0, 0, 0).single().expect("valid date");
        let first = PlannedWindow::new(day(1), day(10)).expect("window");
        let touching = PlannedWindow::new(day(10), day(20)).expect("window");
        let inside = PlannedWindow::new(day(9), day(20)).expect("window");

        assert!(!first.overlaps(&touching));
        assert!(first.overlaps(&inside));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::PartiallyApproved,
            RequestStatus::Rejected,
            RequestStatus::Ordered,
            RequestStatus::PartiallyDelivered,
            RequestStatus::Delivered,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(Priority::from_emergency(true), Priority::Urgent);
    }
}
