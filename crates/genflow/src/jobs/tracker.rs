use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::{JobError, JobResult};
use crate::jobs::model::{GenerationJob, GenerationKind, JobPatch, JobStatus, TenantScope};
use crate::jobs::store::JobStore;

/// Facade over the record store used by routes and agent callbacks.
///
/// There is no in-process queue behind it: generation runs in the external
/// agent service, which reports back through `start_job` / `report_progress`
/// / `complete_job` / `fail_job`.
#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn JobStore>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub async fn create_job(&self, scope: &TenantScope, kind: GenerationKind) -> JobResult<Uuid> {
        let job_id = self.store.create(scope, kind).await?;
        tracing::info!(
            %job_id,
            brand_id = %scope.brand_id,
            user_id = %scope.user_id,
            kind = %kind,
            "generation job created"
        );
        Ok(job_id)
    }

    /// A job owned by another tenant is reported as missing.
    pub async fn get_job(&self, scope: &TenantScope, job_id: Uuid) -> JobResult<GenerationJob> {
        let job = self.store.get(job_id).await?;
        if !scope.owns(&job) {
            return Err(JobError::NotFound { job_id });
        }
        Ok(job)
    }

    pub async fn start_job(&self, job_id: Uuid) -> JobResult<GenerationJob> {
        let job = self.store.update(job_id, JobPatch::started()).await?;
        tracing::info!(%job_id, "generation job started");
        Ok(job)
    }

    pub async fn report_progress(&self, job_id: Uuid, progress: i32) -> JobResult<GenerationJob> {
        self.store.update(job_id, JobPatch::progress(progress)).await
    }

    pub async fn complete_job(
        &self,
        job_id: Uuid,
        result_ref: Option<String>,
    ) -> JobResult<GenerationJob> {
        let job = self
            .store
            .update(job_id, JobPatch::completed(result_ref))
            .await?;
        tracing::info!(%job_id, "generation job completed");
        Ok(job)
    }

    /// Mark the job failed with `message`; status, error and completion time
    /// land in one write.
    pub async fn fail_job(&self, job_id: Uuid, message: &str) -> JobResult<GenerationJob> {
        let job = self
            .store
            .update(job_id, JobPatch::failed(message, Utc::now()))
            .await?;
        tracing::warn!(%job_id, error = %message, "generation job failed");
        Ok(job)
    }

    /// Like [`fail_job`](Self::fail_job) but only if the job is still in `expected`.
    pub async fn fail_job_if(
        &self,
        job_id: Uuid,
        expected: JobStatus,
        message: &str,
    ) -> JobResult<GenerationJob> {
        let job = self
            .store
            .update(
                job_id,
                JobPatch::failed(message, Utc::now()).guarded(expected),
            )
            .await?;
        tracing::warn!(%job_id, error = %message, "generation job failed");
        Ok(job)
    }

    pub async fn get_active_jobs_for_user(
        &self,
        scope: &TenantScope,
        limit: i64,
    ) -> JobResult<Vec<GenerationJob>> {
        self.store.query_active(scope, limit).await
    }

    pub async fn get_recent_jobs_for_user(
        &self,
        scope: &TenantScope,
        limit: i64,
        within_minutes: i64,
    ) -> JobResult<Vec<GenerationJob>> {
        let since = Utc::now() - Duration::minutes(within_minutes.max(0));
        self.store.query_recent(scope, limit, since).await
    }
}
