use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::JobResult;
use crate::jobs::model::{GenerationJob, GenerationKind, JobPatch, TenantScope};

/// Hard cap on rows returned by any list query.
pub const MAX_LIST_LIMIT: i64 = 500;

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIST_LIMIT)
}

/// Outcome of a brand membership lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrandAccess {
    Granted,
    Denied,
    UnknownBrand,
}

/// Persistence of generation job records.
///
/// Every mutation is a single-record merge-patch; implementations must apply
/// it atomically (read, [`GenerationJob::apply`], write back) so concurrent
/// writers cannot interleave inside one update.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &GenerationJob) -> JobResult<()>;

    async fn get(&self, job_id: Uuid) -> JobResult<GenerationJob>;

    async fn update(&self, job_id: Uuid, patch: JobPatch) -> JobResult<GenerationJob>;

    /// `pending`/`processing` jobs of the tenant, newest first.
    async fn query_active(&self, scope: &TenantScope, limit: i64)
        -> JobResult<Vec<GenerationJob>>;

    /// Terminal jobs of the tenant with `completed_at >= since`, most recently finished first.
    async fn query_recent(
        &self,
        scope: &TenantScope,
        limit: i64,
        since: DateTime<Utc>,
    ) -> JobResult<Vec<GenerationJob>>;

    /// Active jobs of any tenant whose clock started before `cutoff`, oldest first.
    async fn query_stale(&self, cutoff: DateTime<Utc>, limit: i64)
        -> JobResult<Vec<GenerationJob>>;

    async fn brand_access(&self, brand_id: &str, user_id: &str) -> JobResult<BrandAccess>;

    async fn create(&self, scope: &TenantScope, kind: GenerationKind) -> JobResult<Uuid> {
        let job = GenerationJob::new(scope, kind, Utc::now());
        self.insert(&job).await?;
        Ok(job.id)
    }
}
