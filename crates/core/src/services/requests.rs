//! Request intake, duplicate screening and line-item approval.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::approval::aggregate_material_statuses;
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::material::{Material, MaterialCorrection, MaterialId, MaterialStatus};
use crate::domain::request::{
    NewRequest, PlannedWindow, Priority, Request, RequestId, RequestStatus, StatusChange,
};
use crate::domain::site::{Actor, SiteId};
use crate::duplicates::{
    detect_duplicates, DuplicateDetectorConfig, DuplicateQuery, DuplicateWarning,
};
use crate::errors::ApplicationError;
use crate::sequence::{SequenceAllocator, SequenceKind};
use crate::services::{audit_context, commit_changes, emit_status_change, new_id};
use crate::store::{ChangeSet, ProcurementStore};

#[derive(Clone, Debug, PartialEq)]
pub struct CreatedRequest {
    pub request: Request,
    pub materials: Vec<Material>,
    /// Warnings that were overridden by the caller's explanation.
    pub overridden_warnings: Vec<DuplicateWarning>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequestCreation {
    Created(Box<CreatedRequest>),
    /// Nothing was written; resubmit with an explanation to proceed.
    DuplicateDetected(Vec<DuplicateWarning>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApprovalOutcome {
    pub material: Material,
    pub status_change: Option<StatusChange>,
}

#[derive(Clone)]
pub struct RequestService {
    store: Arc<dyn ProcurementStore>,
    audit: Arc<dyn AuditSink>,
    allocator: SequenceAllocator,
    duplicates: DuplicateDetectorConfig,
}

impl RequestService {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        audit: Arc<dyn AuditSink>,
        allocator: SequenceAllocator,
        duplicates: DuplicateDetectorConfig,
    ) -> Self {
        Self { store, audit, allocator, duplicates }
    }

    pub async fn create_request(
        &self,
        actor: &Actor,
        input: NewRequest,
        explanation: Option<String>,
    ) -> Result<RequestCreation, ApplicationError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ApplicationError::Validation("request title cannot be blank".to_string()));
        }
        if input.materials.is_empty() {
            return Err(ApplicationError::Validation(
                "a request needs at least one material line".to_string(),
            ));
        }
        for material in &input.materials {
            material.validate()?;
        }
        let window = PlannedWindow::new(input.planned_start, input.planned_end)?;
        let explanation =
            explanation.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());

        let warnings = if self.duplicates.enabled {
            let names = input.materials.iter().map(|material| material.name.as_str());
            self.screen(DuplicateQuery::new(input.site_id.clone(), names, window)).await?
        } else {
            Vec::new()
        };

        let context = audit_context(actor);
        if !warnings.is_empty() && explanation.is_none() {
            info!(
                event_name = "procurement.request.duplicate_detected",
                site_id = %input.site_id.0,
                warnings = warnings.len(),
                "request creation held back by duplicate warnings"
            );
            let overlapping: Vec<&str> =
                warnings.iter().map(|warning| warning.request_id.0.as_str()).collect();
            self.audit.emit(
                AuditEvent::new(
                    &context,
                    "request.duplicate_detected",
                    AuditCategory::Approval,
                    AuditOutcome::Rejected,
                )
                .with_metadata("site_id", input.site_id.0.clone())
                .with_metadata("overlapping_requests", overlapping.join(",")),
            );
            return Ok(RequestCreation::DuplicateDetected(warnings));
        }

        let now = Utc::now();
        let reference_code =
            self.allocator.allocate(self.store.as_ref(), SequenceKind::Request, now.year()).await?;
        let duplicate_of = warnings.first().map(|warning| warning.request_id.clone());

        let request = Request {
            id: RequestId(new_id()),
            reference_code,
            project_id: input.project_id,
            site_id: input.site_id,
            title: title.to_string(),
            description: input.description.filter(|text| !text.trim().is_empty()),
            created_by: actor.user_id.clone(),
            window,
            emergency: input.emergency,
            priority: Priority::from_emergency(input.emergency),
            status: RequestStatus::Pending,
            duplicate_explanation: duplicate_of.as_ref().and(explanation),
            duplicate_of,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let materials: Vec<Material> = input
            .materials
            .into_iter()
            .enumerate()
            .map(|(position, line)| Material {
                id: MaterialId(new_id()),
                request_id: request.id.clone(),
                position: u32::try_from(position).unwrap_or(u32::MAX),
                name: line.name.trim().to_string(),
                quantity: line.quantity,
                unit: line.unit.trim().to_string(),
                rate_estimate: line.rate_estimate,
                resource_type: line.resource_type,
                status: MaterialStatus::Pending,
                revision: 0,
                review_note: None,
                version: 1,
                updated_at: now,
            })
            .collect();

        let changes = ChangeSet {
            new_requests: vec![request.clone()],
            new_materials: materials.clone(),
            ..ChangeSet::default()
        };
        commit_changes(
            self.store.as_ref(),
            self.audit.as_ref(),
            &context,
            "request.create",
            changes,
        )
        .await?;

        info!(
            event_name = "procurement.request.created",
            request_id = %request.id.0,
            reference_code = %request.reference_code,
            site_id = %request.site_id.0,
            materials = materials.len(),
            flagged_duplicate = request.is_flagged_duplicate(),
            "request created"
        );
        let estimated_cost: Decimal = materials.iter().map(Material::estimated_cost).sum();
        let mut event = AuditEvent::new(
            &context,
            "request.created",
            AuditCategory::Approval,
            AuditOutcome::Success,
        )
        .for_request(&request.id)
        .with_metadata("reference_code", request.reference_code.clone())
        .with_metadata("estimated_cost", estimated_cost.to_string());
        if let Some(original) = &request.duplicate_of {
            event = event.with_metadata("duplicate_of", original.0.clone());
        }
        self.audit.emit(event);

        Ok(RequestCreation::Created(Box::new(CreatedRequest {
            request,
            materials,
            overridden_warnings: warnings,
        })))
    }

    /// Lists existing requests at `site_id` whose window overlaps the given one.
    pub async fn find_duplicates<I, S>(
        &self,
        site_id: &SiteId,
        material_names: I,
        planned_start: DateTime<Utc>,
        planned_end: DateTime<Utc>,
    ) -> Result<Vec<DuplicateWarning>, ApplicationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let window = PlannedWindow::new(planned_start, planned_end)?;
        self.screen(DuplicateQuery::new(site_id.clone(), material_names, window)).await
    }

    async fn screen(
        &self,
        query: DuplicateQuery,
    ) -> Result<Vec<DuplicateWarning>, ApplicationError> {
        let overlapping = self
            .store
            .requests_overlapping(&query.site_id, query.window.start(), query.window.end())
            .await?;

        let mut existing = Vec::with_capacity(overlapping.len());
        for request in overlapping {
            let materials = self.store.materials_for_request(&request.id).await?;
            existing.push((request, materials));
        }

        Ok(detect_duplicates(&query, &existing, &self.duplicates))
    }

    /// Records a reviewer decision on one line and re-aggregates the request.
    pub async fn review_material(
        &self,
        actor: &Actor,
        material_id: &MaterialId,
        decision: MaterialStatus,
        note: Option<String>,
    ) -> Result<ApprovalOutcome, ApplicationError> {
        let (mut material, request) = self.load_for_review(material_id).await?;
        let expected_version = material.version;
        material.review(decision, note.filter(|text| !text.trim().is_empty()));

        let context = audit_context(actor);
        let outcome = self
            .commit_review(&context, "material.review", material, expected_version, request)
            .await?;

        info!(
            event_name = "procurement.material.reviewed",
            material_id = %material_id.0,
            request_id = %outcome.material.request_id.0,
            decision = decision.as_str(),
            "material reviewed"
        );
        self.emit_review(&context, "material.reviewed", &outcome);
        Ok(outcome)
    }

    /// Amends a rejected line, returning it to pending under a new revision.
    pub async fn correct_material(
        &self,
        actor: &Actor,
        material_id: &MaterialId,
        correction: MaterialCorrection,
    ) -> Result<ApprovalOutcome, ApplicationError> {
        let (mut material, request) = self.load_for_review(material_id).await?;
        let expected_version = material.version;
        material.correct(correction)?;

        let context = audit_context(actor);
        let outcome = self
            .commit_review(&context, "material.correct", material, expected_version, request)
            .await?;

        info!(
            event_name = "procurement.material.corrected",
            material_id = %material_id.0,
            request_id = %outcome.material.request_id.0,
            revision = outcome.material.revision,
            "material corrected"
        );
        self.emit_review(&context, "material.corrected", &outcome);
        Ok(outcome)
    }

    /// Recomputes the approval status from the stored material statuses.
    pub async fn aggregate_approval(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> Result<Option<StatusChange>, ApplicationError> {
        let mut request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("request", request_id.0.clone()))?;
        ensure_approval_phase(&request)?;

        let materials = self.store.materials_for_request(request_id).await?;
        let statuses: Vec<MaterialStatus> =
            materials.iter().map(|material| material.status).collect();
        let aggregated = aggregate_material_statuses(&statuses);
        if aggregated == request.status {
            return Ok(None);
        }

        let expected_version = request.version;
        let change = request.transition_to(aggregated)?;
        let mut changes = ChangeSet::default();
        changes.update_request(request, expected_version);
        let context = audit_context(actor);
        commit_changes(
            self.store.as_ref(),
            self.audit.as_ref(),
            &context,
            "request.aggregate_approval",
            changes,
        )
        .await?;

        emit_status_change(self.audit.as_ref(), &context, AuditCategory::Approval, &change);
        Ok(Some(change))
    }

    async fn load_for_review(
        &self,
        material_id: &MaterialId,
    ) -> Result<(Material, Request), ApplicationError> {
        let material = self
            .store
            .find_material(material_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("material", material_id.0.clone()))?;
        let request = self
            .store
            .find_request(&material.request_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("request", material.request_id.0.clone()))?;
        ensure_approval_phase(&request)?;
        Ok((material, request))
    }

    /// The parent request is written back at the version read before its
    /// sibling lines, so concurrent reviews on one request conflict.
    async fn commit_review(
        &self,
        context: &AuditContext,
        operation: &str,
        material: Material,
        material_version: i64,
        mut request: Request,
    ) -> Result<ApprovalOutcome, ApplicationError> {
        let statuses: Vec<MaterialStatus> = self
            .store
            .materials_for_request(&request.id)
            .await?
            .into_iter()
            .map(|stored| if stored.id == material.id { material.status } else { stored.status })
            .collect();
        let aggregated = aggregate_material_statuses(&statuses);

        let request_version = request.version;
        let status_change = if aggregated != request.status {
            Some(request.transition_to(aggregated)?)
        } else {
            None
        };
        let mut changes = ChangeSet::default();
        changes.update_material(material.clone(), material_version);
        changes.update_request(request, request_version);
        commit_changes(self.store.as_ref(), self.audit.as_ref(), context, operation, changes)
            .await?;

        Ok(ApprovalOutcome { material, status_change })
    }

    fn emit_review(&self, context: &AuditContext, event_type: &str, outcome: &ApprovalOutcome) {
        self.audit.emit(
            AuditEvent::new(context, event_type, AuditCategory::Approval, AuditOutcome::Success)
                .for_request(&outcome.material.request_id)
                .with_metadata("material_id", outcome.material.id.0.clone())
                .with_metadata("material_status", outcome.material.status.as_str())
                .with_metadata("revision", outcome.material.revision.to_string()),
        );
        if let Some(change) = &outcome.status_change {
            emit_status_change(self.audit.as_ref(), context, AuditCategory::Approval, change);
        }
    }
}

fn ensure_approval_phase(request: &Request) -> Result<(), ApplicationError> {
    if request.status.is_approval_phase() {
        return Ok(());
    }
    Err(ApplicationError::InvalidState(format!(
        "request {} is {} and no longer open for material review",
        request.id.0,
        request.status.as_str()
    )))
}
