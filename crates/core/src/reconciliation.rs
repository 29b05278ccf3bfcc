//! Derives a request's fulfilment status from its quantity ledger.
//!
//! Rules are evaluated in priority order; several can hold at once at
//! boundary values, and the first match wins.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestStatus;
use crate::ledger::QuantityLedger;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    /// `None` when nothing has been ordered yet.
    pub derived: Option<RequestStatus>,
    /// Fully delivered against an order that was smaller than the request.
    pub under_ordered: bool,
}

impl ReconciliationOutcome {
    /// The status to write, if it differs from `current`.
    pub fn change_from(&self, current: RequestStatus) -> Option<RequestStatus> {
        self.derived.filter(|derived| *derived != current)
    }
}

pub fn reconcile(ledger: &QuantityLedger) -> ReconciliationOutcome {
    let QuantityLedger { requested, ordered, delivered } = *ledger;

    if ordered <= Decimal::ZERO {
        return ReconciliationOutcome { derived: None, under_ordered: false };
    }

    if delivered == Decimal::ZERO {
        return ReconciliationOutcome {
            derived: Some(RequestStatus::Ordered),
            under_ordered: false,
        };
    }

    if delivered > Decimal::ZERO && delivered < ordered {
        return ReconciliationOutcome {
            derived: Some(RequestStatus::PartiallyDelivered),
            under_ordered: false,
        };
    }

    if ordered < requested {
        return ReconciliationOutcome {
            derived: Some(RequestStatus::PartiallyDelivered),
            under_ordered: true,
        };
    }

    ReconciliationOutcome { derived: Some(RequestStatus::Delivered), under_ordered: false }
}

pub fn derive_fulfilment_status(ledger: &QuantityLedger) -> Option<RequestStatus> {
    reconcile(ledger).derived
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::request::RequestStatus;
    use crate::ledger::QuantityLedger;

    use super::{derive_fulfilment_status, reconcile};

    fn ledger(requested: i64, ordered: i64, delivered: i64) -> QuantityLedger {
        QuantityLedger::new(
            Decimal::from(requested),
            Decimal::from(ordered),
            Decimal::from(delivered),
        )
    }

    #[test]
    fn nothing_ordered_leaves_status_alone() {
        assert_eq!(derive_fulfilment_status(&ledger(100, 0, 0)), None);
    }

    #[test]
    fn ordered_but_not_delivered_is_ordered() {
        assert_eq!(derive_fulfilment_status(&ledger(100, 100, 0)), Some(RequestStatus::Ordered));
        assert_eq!(derive_fulfilment_status(&ledger(100, 40, 0)), Some(RequestStatus::Ordered));
    }

    #[test]
    fn partial_delivery_against_order() {
        assert_eq!(
            derive_fulfilment_status(&ledger(100, 100, 60)),
            Some(RequestStatus::PartiallyDelivered)
        );
    }

    #[test]
    fn all_three_equal_is_delivered() {
        let outcome = reconcile(&ledger(100, 100, 100));
        assert_eq!(outcome.derived, Some(RequestStatus::Delivered));
        assert!(!outcome.under_ordered);
    }

    #[test]
    fn full_delivery_of_short_order_is_partial_and_flagged() {
        let outcome = reconcile(&ledger(100, 80, 80));
        assert_eq!(outcome.derived, Some(RequestStatus::PartiallyDelivered));
        assert!(outcome.under_ordered);
    }

    #[test]
    fn over_ordering_and_over_delivery_still_delivered() {
        let delivered = Some(RequestStatus::Delivered);
        assert_eq!(derive_fulfilment_status(&ledger(100, 120, 120)), delivered);
        assert_eq!(derive_fulfilment_status(&ledger(100, 100, 130)), delivered);
    }

    #[test]
    fn fractional_quantities_respect_boundaries() {
        let just_short = QuantityLedger::new(
            Decimal::new(1005, 1),
            Decimal::new(1005, 1),
            Decimal::new(1004, 1),
        );
        assert_eq!(derive_fulfilment_status(&just_short), Some(RequestStatus::PartiallyDelivered));
    }

    #[test]
    fn decision_is_deterministic_over_a_grid() {
        for requested in [1, 50, 100] {
            for ordered in [0, 1, 50, 100, 150] {
                for delivered in [0, 1, 50, 100, 150] {
                    let input = ledger(requested, ordered, delivered);
                    assert_eq!(reconcile(&input), reconcile(&input));
                }
            }
        }
    }

    #[test]
    fn change_is_reported_only_when_status_differs() {
        let outcome = reconcile(&ledger(100, 100, 0));
        assert_eq!(outcome.change_from(RequestStatus::Ordered), None);
        assert_eq!(outcome.change_from(RequestStatus::Approved), Some(RequestStatus::Ordered));
    }
}
