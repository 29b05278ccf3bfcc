//! Human-readable reference numbers (`PO-2026-0001`, `BOQ-2026-0001`).
//!
//! Numbers come from a reserved per-year counter in the store, so two
//! concurrent allocations never receive the same value. The probe afterwards
//! only skips numbers that were written outside the counter.

use tracing::debug;

use crate::config::ProcurementConfig;
use crate::store::{ProcurementStore, StoreError};

const MAX_PROBES: u32 = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceKind {
    PurchaseOrder,
    Request,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceAllocator {
    purchase_order_prefix: String,
    request_prefix: String,
    width: usize,
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::from_config(&ProcurementConfig::default())
    }
}

impl SequenceAllocator {
    pub fn from_config(config: &ProcurementConfig) -> Self {
        Self {
            purchase_order_prefix: config.purchase_order_prefix.clone(),
            request_prefix: config.request_prefix.clone(),
            width: config.sequence_width,
        }
    }

    pub fn format(&self, kind: SequenceKind, year: i32, sequence: u32) -> String {
        format!("{}-{year}-{sequence:0width$}", self.prefix(kind), width = self.width)
    }

    pub async fn allocate<S>(
        &self,
        store: &S,
        kind: SequenceKind,
        year: i32,
    ) -> Result<String, StoreError>
    where
        S: ProcurementStore + ?Sized,
    {
        let key = format!("{}-{year}", self.prefix(kind));

        for _ in 0..MAX_PROBES {
            let sequence = store.reserve_sequence(&key).await?;
            let candidate = self.format(kind, year, sequence);
            let taken = match kind {
                SequenceKind::PurchaseOrder => {
                    store.purchase_order_number_exists(&candidate).await?
                }
                SequenceKind::Request => store.request_reference_exists(&candidate).await?,
            };
            if !taken {
                return Ok(candidate);
            }
            debug!(
                event_name = "procurement.sequence.skipped",
                sequence_key = %key,
                candidate = %candidate,
                "reserved number already in use, probing next"
            );
        }

        Err(StoreError::Conflict(format!(
            "no free number for sequence `{key}` after {MAX_PROBES} attempts"
        )))
    }

    fn prefix(&self, kind: SequenceKind) -> &str {
        match kind {
            SequenceKind::PurchaseOrder => &self.purchase_order_prefix,
            SequenceKind::Request => &self.request_prefix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SequenceAllocator, SequenceKind};

    #[test]
    fn formats_with_zero_padded_sequence() {
        let allocator = SequenceAllocator::default();
        assert_eq!(allocator.format(SequenceKind::PurchaseOrder, 2026, 7), "PO-2026-0007");
        assert_eq!(allocator.format(SequenceKind::Request, 2026, 12_345), "BOQ-2026-12345");
    }
}
