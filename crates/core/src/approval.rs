use crate::domain::material::MaterialStatus;
use crate::domain::request::RequestStatus;

/// Collapses line-item review outcomes into the request's approval status.
///
/// Any pending line keeps the whole request pending; otherwise the request is
/// approved, rejected, or partially approved depending on the mix.
pub fn aggregate_material_statuses(statuses: &[MaterialStatus]) -> RequestStatus {
    if statuses.is_empty() || statuses.contains(&MaterialStatus::Pending) {
        return RequestStatus::Pending;
    }
    if statuses.iter().all(|status| *status == MaterialStatus::Approved) {
        return RequestStatus::Approved;
    }
    if statuses.iter().all(|status| *status == MaterialStatus::Rejected) {
        return RequestStatus::Rejected;
    }
    RequestStatus::PartiallyApproved
}
