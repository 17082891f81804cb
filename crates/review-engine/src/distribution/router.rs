use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Column, GroupId, ItemId, PhaseId, ReviewerId, Tier, Verdict};
use super::kind::ItemKind;
use super::service::{DistributionError, ReviewDistributionService};
use super::store::{ItemStore, StoreError};
use crate::config::DistributionConfig;

/// Shared handler state: the engine plus the request size limits.
pub struct DistributionState<S, K> {
    pub service: Arc<ReviewDistributionService<S, K>>,
    pub limits: DistributionConfig,
}

impl<S, K> Clone for DistributionState<S, K> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            limits: self.limits,
        }
    }
}

/// Router builder exposing the distribution operations of one phase family.
pub fn distribution_router<S, K>(
    service: Arc<ReviewDistributionService<S, K>>,
    limits: DistributionConfig,
) -> Router
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    Router::new()
        .route(
            "/api/v1/phases/:phase_id/distribution",
            post(distribution_handler::<S, K>),
        )
        .route(
            "/api/v1/phases/:phase_id/batches",
            post(batch_handler::<S, K>),
        )
        .route(
            "/api/v1/phases/:phase_id/redistributions",
            post(redistribution_handler::<S, K>),
        )
        .route(
            "/api/v1/phases/:phase_id/reviews",
            post(review_handler::<S, K>),
        )
        .route(
            "/api/v1/phases/:phase_id/approvals",
            post(approval_handler::<S, K>),
        )
        .route(
            "/api/v1/phases/:phase_id/validation",
            post(validation_handler::<S, K>),
        )
        .route(
            "/api/v1/phases/:phase_id/progress",
            get(progress_handler::<S, K>),
        )
        .route(
            "/api/v1/phases/:phase_id/reviewers/:reviewer/pending",
            get(pending_handler::<S, K>),
        )
        .with_state(DistributionState { service, limits })
}

#[derive(Debug, Deserialize)]
pub struct DistributionRequest {
    pub column: Column,
    pub groups: BTreeMap<String, GroupId>,
    #[serde(default)]
    pub tier: Option<Tier>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub reviewer: ReviewerId,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub quantity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RedistributionRequest {
    #[serde(default)]
    pub tier: Option<Tier>,
    pub source: ReviewerId,
    pub target: ReviewerId,
    #[serde(default)]
    pub quantity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub item: ItemId,
    pub reviewer: ReviewerId,
    pub verdict: Verdict,
    #[serde(default = "completed_by_default")]
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub item: ItemId,
    pub approver: ReviewerId,
    pub verdict: Verdict,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    #[serde(default)]
    pub tier: Option<Tier>,
}

fn completed_by_default() -> bool {
    true
}

pub(crate) async fn distribution_handler<S, K>(
    State(state): State<DistributionState<S, K>>,
    Path(phase_id): Path<String>,
    Json(request): Json<DistributionRequest>,
) -> Response
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    let phase = PhaseId(phase_id);
    let tier = request.tier.unwrap_or(Tier::Evaluator);
    match state
        .service
        .distribute_initial(&phase, &request.column, &request.groups, tier)
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn batch_handler<S, K>(
    State(state): State<DistributionState<S, K>>,
    Path(phase_id): Path<String>,
    Json(request): Json<BatchRequest>,
) -> Response
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    let phase = PhaseId(phase_id);
    let tier = request.tier.unwrap_or(Tier::Evaluator);
    let requested = state.limits.clamp(request.quantity);
    match state
        .service
        .acquire_batch(&phase, &request.reviewer, tier, requested)
    {
        Ok(outcome) => {
            let payload = json!({
                "reviewer": request.reviewer,
                "tier": tier,
                "requested": requested,
                "assigned": outcome.total(),
                "outcome": outcome,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn redistribution_handler<S, K>(
    State(state): State<DistributionState<S, K>>,
    Path(phase_id): Path<String>,
    Json(request): Json<RedistributionRequest>,
) -> Response
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    let phase = PhaseId(phase_id);
    let tier = request.tier.unwrap_or(Tier::Evaluator);
    let max = state.limits.clamp(request.quantity);
    match state
        .service
        .redistribute(&phase, tier, &request.source, &request.target, max)
    {
        Ok(moved) => {
            let payload = json!({
                "source": request.source,
                "target": request.target,
                "moved": moved,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn review_handler<S, K>(
    State(state): State<DistributionState<S, K>>,
    Path(phase_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    let phase = PhaseId(phase_id);
    match state.service.record_review(
        &phase,
        &request.item,
        &request.reviewer,
        request.verdict,
        request.completed,
    ) {
        Ok(status) => {
            let payload = json!({
                "item": request.item,
                "status": status.label(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approval_handler<S, K>(
    State(state): State<DistributionState<S, K>>,
    Path(phase_id): Path<String>,
    Json(request): Json<ApprovalRequest>,
) -> Response
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    let phase = PhaseId(phase_id);
    match state
        .service
        .record_approval(&phase, &request.item, &request.approver, request.verdict)
    {
        Ok(status) => {
            let payload = json!({
                "item": request.item,
                "status": status.label(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn validation_handler<S, K>(
    State(state): State<DistributionState<S, K>>,
    Path(phase_id): Path<String>,
) -> Response
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    let phase = PhaseId(phase_id);
    match state.service.validate_phase(&phase) {
        Ok(()) => {
            let payload = json!({
                "phase": phase,
                "valid": true,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn progress_handler<S, K>(
    State(state): State<DistributionState<S, K>>,
    Path(phase_id): Path<String>,
) -> Response
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    let phase = PhaseId(phase_id);
    match state.service.progress_report(&phase) {
        Ok(buckets) => {
            let payload = json!({
                "phase": phase,
                "buckets": buckets,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pending_handler<S, K>(
    State(state): State<DistributionState<S, K>>,
    Path((phase_id, reviewer)): Path<(String, String)>,
    Query(query): Query<PendingQuery>,
) -> Response
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    let phase = PhaseId(phase_id);
    let reviewer = ReviewerId(reviewer);
    let tier = query.tier.unwrap_or(Tier::Evaluator);
    match state.service.pending_items(&phase, &reviewer, tier) {
        Ok(items) => {
            let payload = json!({
                "reviewer": reviewer,
                "tier": tier,
                "pending": items.len(),
                "items": items,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

/// HTTP status for a distribution failure.
pub fn status_for(error: &DistributionError) -> StatusCode {
    match error {
        DistributionError::PhaseNotFound(_)
        | DistributionError::GroupNotFound(_)
        | DistributionError::ItemNotFound(_)
        | DistributionError::MailboxNotFound { .. } => StatusCode::NOT_FOUND,
        DistributionError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DistributionError::InvariantViolation { .. }
        | DistributionError::ReviewLocked { .. }
        | DistributionError::NotAwaitingApproval { .. } => StatusCode::CONFLICT,
        DistributionError::PhaseClosed(_) => StatusCode::FORBIDDEN,
        DistributionError::NotAssigned { .. }
        | DistributionError::SameReviewer(_)
        | DistributionError::ApproverTierDisabled(_) => StatusCode::BAD_REQUEST,
        DistributionError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        DistributionError::Store(StoreError::Missing(_)) => StatusCode::NOT_FOUND,
        DistributionError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn error_response(error: DistributionError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (status_for(&error), Json(payload)).into_response()
}
