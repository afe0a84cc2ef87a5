#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tower::ServiceExt;

use genflow::api::{self, ApiState};
use genflow::auth::JwtKeys;
use genflow::config::PollSettings;
use genflow::error::{JobError, JobResult};
use genflow::jobs::{
    BrandAccess, GenerationJob, GenerationKind, JobPatch, JobStatus, JobStore, JobTracker,
    MemoryJobStore, StalenessReaper, TenantScope,
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret";
pub const SERVICE_TOKEN: &str = "agent-token";

pub fn scope(brand: &str, user: &str) -> TenantScope {
    TenantScope::new(brand, user)
}

pub fn tracker(store: &MemoryJobStore) -> JobTracker {
    JobTracker::new(Arc::new(store.clone()))
}

pub fn reaper(store: &MemoryJobStore) -> StalenessReaper {
    reaper_over(Arc::new(store.clone()))
}

pub fn reaper_over(store: Arc<dyn JobStore>) -> StalenessReaper {
    StalenessReaper::new(JobTracker::new(store), Duration::minutes(2))
}

pub fn app(store: &MemoryJobStore) -> Router {
    app_over(Arc::new(store.clone()))
}

pub fn app_over(store: Arc<dyn JobStore>) -> Router {
    api::router(ApiState {
        tracker: JobTracker::new(store.clone()),
        reaper: reaper_over(store),
        jwt: JwtKeys::from_secret(JWT_SECRET),
        service_token: Some(SERVICE_TOKEN.to_string()),
        poll: PollSettings::default(),
    })
}

/// Store that serves reads from memory but fails every update, like a
/// database that went read-only mid-request.
#[derive(Clone)]
pub struct FailingWrites(pub MemoryJobStore);

#[async_trait]
impl JobStore for FailingWrites {
    async fn insert(&self, job: &GenerationJob) -> JobResult<()> {
        self.0.insert(job).await
    }

    async fn get(&self, job_id: Uuid) -> JobResult<GenerationJob> {
        self.0.get(job_id).await
    }

    async fn update(&self, _job_id: Uuid, _patch: JobPatch) -> JobResult<GenerationJob> {
        Err(JobError::Storage("database is read-only".into()))
    }

    async fn query_active(
        &self,
        scope: &TenantScope,
        limit: i64,
    ) -> JobResult<Vec<GenerationJob>> {
        self.0.query_active(scope, limit).await
    }

    async fn query_recent(
        &self,
        scope: &TenantScope,
        limit: i64,
        since: DateTime<Utc>,
    ) -> JobResult<Vec<GenerationJob>> {
        self.0.query_recent(scope, limit, since).await
    }

    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> JobResult<Vec<GenerationJob>> {
        self.0.query_stale(cutoff, limit).await
    }

    async fn brand_access(&self, brand_id: &str, user_id: &str) -> JobResult<BrandAccess> {
        self.0.brand_access(brand_id, user_id).await
    }
}

pub fn token_for(user: &str) -> String {
    JwtKeys::from_secret(JWT_SECRET)
        .issue_token(user, Duration::minutes(10))
        .expect("token")
}

/// A job record in an arbitrary lifecycle state, for seeding stores directly.
pub fn job_in(
    scope: &TenantScope,
    status: JobStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
) -> GenerationJob {
    let created_at = started_at.unwrap_or_else(Utc::now) - Duration::seconds(1);
    let mut job = GenerationJob::new(scope, GenerationKind::Image, created_at);
    job.status = status;
    job.started_at = started_at;
    job.completed_at = completed_at;
    match status {
        JobStatus::Completed => {
            job.progress = 100;
            job.result_ref = Some(format!("assets/{}", job.id));
        }
        JobStatus::Failed => job.error = Some("worker crashed".into()),
        _ => {}
    }
    job
}

pub async fn send(app: Router, req: Request<Body>) -> Response<Body> {
    app.oneshot(req).await.expect("request")
}

pub fn poll_request(brand: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/generation/jobs?brandId={brand}"))
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn agent_post(path: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-service-token", SERVICE_TOKEN)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Postgres pool for store tests, or `None` when `TEST_DATABASE_URL` is unset.
pub async fn setup_db() -> Option<PgPool> {
    let _ = dotenvy::dotenv();

    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");

    sqlx::query("TRUNCATE TABLE generation_jobs, brand_members, brands CASCADE")
        .execute(&pool)
        .await
        .expect("truncate failed");

    Some(pool)
}
