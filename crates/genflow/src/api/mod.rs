use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::JwtKeys;
use crate::config::PollSettings;
use crate::jobs::reaper::stale_elapsed;
use crate::jobs::{GenerationJob, JobTracker, StalenessReaper, TenantScope};

pub mod error;
pub mod extract;
pub mod models;

use error::{ApiError, ApiResult};
use extract::{AuthUser, ServiceCaller};
use models::{
    CompleteRequest, CreateJobRequest, CreateJobResponse, FailRequest, JobsQuery, JobsSnapshot,
    ProgressRequest,
};

#[derive(Clone)]
pub struct ApiState {
    pub tracker: JobTracker,
    pub reaper: StalenessReaper,
    pub jwt: JwtKeys,
    /// Shared secret for agent callbacks; `None` disables the `/internal` routes.
    pub service_token: Option<String>,
    pub poll: PollSettings,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Browser polling
        .route("/generation/jobs", get(poll_jobs))
        .route("/generation/jobs/:id", get(get_job))
        // Agent callbacks
        .route("/internal/jobs", post(create_job))
        .route("/internal/jobs/:id/start", post(start_job))
        .route("/internal/jobs/:id/progress", post(report_progress))
        .route("/internal/jobs/:id/complete", post(complete_job))
        .route("/internal/jobs/:id/fail", post(fail_job))
        // Health
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn require_brand(q: JobsQuery) -> ApiResult<String> {
    q.brand_id
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| ApiError::NotFound("brandId is required".into()))
}

/// Reap stale jobs of `scope`, then read the active and recent projections.
///
/// Reaping runs first so a job past its budget is never reported as active.
/// A failed reap is logged and the read still goes ahead. Jobs that crossed
/// the budget after the reap, or whose reap write failed, are left out of the
/// active list; the next reap closes them.
pub async fn snapshot_for(state: &ApiState, scope: &TenantScope) -> ApiResult<JobsSnapshot> {
    match state.reaper.reap_stale_jobs(scope).await {
        Ok(report) if report.reaped > 0 => {
            tracing::debug!(
                brand_id = %scope.brand_id,
                user_id = %scope.user_id,
                reaped = report.reaped,
                "reaped stale jobs before poll"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(brand_id = %scope.brand_id, error = %e, "stale job reap failed");
        }
    }

    let mut active_jobs = state
        .tracker
        .get_active_jobs_for_user(scope, state.poll.active_limit)
        .await?;
    let now = Utc::now();
    active_jobs.retain(|job| stale_elapsed(job, now, state.reaper.budget()).is_none());
    let recent_jobs = state
        .tracker
        .get_recent_jobs_for_user(
            scope,
            state.poll.recent_limit,
            state.poll.recent_window_minutes,
        )
        .await?;

    Ok(JobsSnapshot {
        active_jobs,
        recent_jobs,
    })
}

pub async fn poll_jobs(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(q): Query<JobsQuery>,
) -> ApiResult<Json<JobsSnapshot>> {
    let brand_id = require_brand(q)?;
    let scope = user.scope_for(&state, &brand_id).await?;
    Ok(Json(snapshot_for(&state, &scope).await?))
}

pub async fn get_job(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(q): Query<JobsQuery>,
) -> ApiResult<Json<GenerationJob>> {
    let brand_id = require_brand(q)?;
    let scope = user.scope_for(&state, &brand_id).await?;
    Ok(Json(state.tracker.get_job(&scope, id).await?))
}

// ----------------------------
// Agent callbacks
// ----------------------------

pub async fn create_job(
    State(state): State<ApiState>,
    _caller: ServiceCaller,
    Json(body): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    if body.brand_id.trim().is_empty() || body.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("brandId and userId are required".into()));
    }

    let scope = TenantScope::new(body.brand_id, body.user_id);
    let job_id = state.tracker.create_job(&scope, body.kind).await?;
    Ok((StatusCode::CREATED, Json(CreateJobResponse { job_id })))
}

pub async fn start_job(
    State(state): State<ApiState>,
    _caller: ServiceCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GenerationJob>> {
    Ok(Json(state.tracker.start_job(id).await?))
}

pub async fn report_progress(
    State(state): State<ApiState>,
    _caller: ServiceCaller,
    Path(id): Path<Uuid>,
    Json(body): Json<ProgressRequest>,
) -> ApiResult<Json<GenerationJob>> {
    Ok(Json(state.tracker.report_progress(id, body.progress).await?))
}

pub async fn complete_job(
    State(state): State<ApiState>,
    _caller: ServiceCaller,
    Path(id): Path<Uuid>,
    Json(body): Json<CompleteRequest>,
) -> ApiResult<Json<GenerationJob>> {
    Ok(Json(state.tracker.complete_job(id, body.result_ref).await?))
}

pub async fn fail_job(
    State(state): State<ApiState>,
    _caller: ServiceCaller,
    Path(id): Path<Uuid>,
    Json(body): Json<FailRequest>,
) -> ApiResult<Json<GenerationJob>> {
    if body.error.trim().is_empty() {
        return Err(ApiError::BadRequest("error is required".into()));
    }
    Ok(Json(state.tracker.fail_job(id, &body.error).await?))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
