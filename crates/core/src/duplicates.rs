//! Flags new requests whose planned window and material set overlap an
//! existing request at the same site.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::material::{normalize_material_name, Material};
use crate::domain::request::{PlannedWindow, Request, RequestId, RequestStatus};
use crate::domain::site::SiteId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateDetectorConfig {
    pub enabled: bool,
    /// Drop warnings whose material overlap is empty. Off by default: every
    /// temporal overlap at the site is reported as advisory.
    pub require_material_match: bool,
}

impl Default for DuplicateDetectorConfig {
    fn default() -> Self {
        Self { enabled: true, require_material_match: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateQuery {
    pub site_id: SiteId,
    pub material_names: BTreeSet<String>,
    pub window: PlannedWindow,
}

impl DuplicateQuery {
    pub fn new<I, S>(site_id: SiteId, material_names: I, window: PlannedWindow) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { site_id, material_names: normalize_material_names(material_names), window }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateWarning {
    pub request_id: RequestId,
    pub reference_code: String,
    pub title: String,
    pub status: RequestStatus,
    pub window: PlannedWindow,
    pub overlapping_materials: Vec<String>,
    pub overlap_percentage: Decimal,
}

/// Trimmed, lower-cased, de-duplicated; blank names are dropped.
pub fn normalize_material_names<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| normalize_material_name(name.as_ref()))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Share of the candidate's planned duration, in whole days, that falls inside
/// the existing window. A missing window on either side counts as a full
/// overlap, as does a candidate shorter than one day.
pub fn overlap_percentage(
    existing: Option<&PlannedWindow>,
    candidate: Option<&PlannedWindow>,
) -> Decimal {
    let (Some(existing), Some(candidate)) = (existing, candidate) else {
        return Decimal::ONE_HUNDRED;
    };

    let overlap_start = existing.start().max(candidate.start());
    let overlap_end = existing.end().min(candidate.end());
    if overlap_start > overlap_end {
        return Decimal::ZERO;
    }

    let total_days = (candidate.end() - candidate.start()).num_days();
    if total_days == 0 {
        return Decimal::ONE_HUNDRED;
    }

    let overlap_days = (overlap_end - overlap_start).num_days();
    (Decimal::from(overlap_days) * Decimal::ONE_HUNDRED / Decimal::from(total_days)).round_dp(2)
}

/// Builds one warning per existing request at the same site whose window
/// overlaps the candidate's. `existing` pairs each request with its materials.
pub fn detect_duplicates(
    query: &DuplicateQuery,
    existing: &[(Request, Vec<Material>)],
    config: &DuplicateDetectorConfig,
) -> Vec<DuplicateWarning> {
    let mut warnings: Vec<DuplicateWarning> = existing
        .iter()
        .filter(|(request, _)| request.site_id == query.site_id)
        .filter(|(request, _)| request.window.overlaps(&query.window))
        .map(|(request, materials)| {
            let overlapping_materials: Vec<String> = materials
                .iter()
                .map(Material::normalized_name)
                .filter(|name| query.material_names.contains(name))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            DuplicateWarning {
                request_id: request.id.clone(),
                reference_code: request.reference_code.clone(),
                title: request.title.clone(),
                status: request.status,
                window: request.window,
                overlapping_materials,
                overlap_percentage: overlap_percentage(
                    Some(&request.window),
                    Some(&query.window),
                ),
            }
        })
        .filter(|warning| {
            !config.require_material_match || !warning.overlapping_materials.is_empty()
        })
        .collect();

    warnings.sort_by(|left, right| {
        left.window
            .start()
            .cmp(&right.window.start())
            .then_with(|| left.request_id.cmp(&right.request_id))
    });
    warnings
}
