use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{JobError, JobResult};
use crate::jobs::model::{GenerationJob, JobPatch, TenantScope};
use crate::jobs::store::{clamp_limit, BrandAccess, JobStore};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, GenerationJob>,
    brands: HashMap<String, HashSet<String>>,
}

/// In-process job store for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(&self, brand_id: &str, user_id: &str) {
        let mut inner = self.inner.write().await;
        inner
            .brands
            .entry(brand_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub async fn add_brand(&self, brand_id: &str) {
        let mut inner = self.inner.write().await;
        inner.brands.entry(brand_id.to_string()).or_default();
    }

    /// Overwrite a stored record, bypassing lifecycle checks. Fixture use only.
    pub async fn put_raw(&self, job: GenerationJob) {
        self.inner.write().await.jobs.insert(job.id, job);
    }
}

fn take_sorted<F>(mut jobs: Vec<GenerationJob>, limit: i64, key: F) -> Vec<GenerationJob>
where
    F: Fn(&GenerationJob) -> (DateTime<Utc>, Uuid),
{
    jobs.sort_by_key(|j| std::cmp::Reverse(key(j)));
    jobs.truncate(clamp_limit(limit) as usize);
    jobs
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &GenerationJob) -> JobResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.id) {
            return Err(JobError::Storage(format!("duplicate job id {}", job.id)));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> JobResult<GenerationJob> {
        self.inner
            .read()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(JobError::NotFound { job_id })
    }

    async fn update(&self, job_id: Uuid, patch: JobPatch) -> JobResult<GenerationJob> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(JobError::NotFound { job_id })?;

        // Apply to a copy so a rejected patch leaves the record untouched.
        let mut job = stored.clone();
        job.apply(patch, Utc::now())?;
        *stored = job.clone();
        Ok(job)
    }

    async fn query_active(
        &self,
        scope: &TenantScope,
        limit: i64,
    ) -> JobResult<Vec<GenerationJob>> {
        let inner = self.inner.read().await;
        let jobs = inner
            .jobs
            .values()
            .filter(|j| scope.owns(j) && j.status.is_active())
            .cloned()
            .collect();
        Ok(take_sorted(jobs, limit, |j| (j.created_at, j.id)))
    }

    async fn query_recent(
        &self,
        scope: &TenantScope,
        limit: i64,
        since: DateTime<Utc>,
    ) -> JobResult<Vec<GenerationJob>> {
        let inner = self.inner.read().await;
        let jobs = inner
            .jobs
            .values()
            .filter(|j| scope.owns(j) && j.status.is_terminal())
            .filter(|j| j.completed_at.is_some_and(|at| at >= since))
            .cloned()
            .collect();
        Ok(take_sorted(jobs, limit, |j| {
            (j.completed_at.unwrap_or(j.created_at), j.id)
        }))
    }

    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> JobResult<Vec<GenerationJob>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<GenerationJob> = inner
            .jobs
            .values()
            .filter(|j| j.status.is_active() && j.clock_start() < cutoff)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.clock_start());
        jobs.truncate(clamp_limit(limit) as usize);
        Ok(jobs)
    }

    async fn brand_access(&self, brand_id: &str, user_id: &str) -> JobResult<BrandAccess> {
        let inner = self.inner.read().await;
        Ok(match inner.brands.get(brand_id) {
            None => BrandAccess::UnknownBrand,
            Some(members) if members.contains(user_id) => BrandAccess::Granted,
            Some(_) => BrandAccess::Denied,
        })
    }
}
