// crates/genflow/src/jobs/repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{JobError, JobResult};
use crate::jobs::model::{GenerationJob, JobPatch, TenantScope};
use crate::jobs::store::{clamp_limit, BrandAccess, JobStore};

const JOB_COLUMNS: &str = r#"
    id, brand_id, user_id, job_type, status, progress,
    created_at, started_at, completed_at,
    error, result_ref
"#;

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    brand_id: String,
    user_id: String,
    job_type: String,
    status: String,
    progress: i32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    result_ref: Option<String>,
}

impl TryFrom<JobRow> for GenerationJob {
    type Error = JobError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(GenerationJob {
            id: row.id,
            brand_id: row.brand_id,
            user_id: row.user_id,
            kind: row.job_type.parse()?,
            status: row.status.parse()?,
            progress: row.progress,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
            result_ref: row.result_ref,
        })
    }
}

fn into_jobs(rows: Vec<JobRow>) -> JobResult<Vec<GenerationJob>> {
    rows.into_iter().map(GenerationJob::try_from).collect()
}

/// PostgreSQL-backed job record store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ----------------------------
    // Brand membership (seeding / admin)
    // ----------------------------

    pub async fn upsert_brand(&self, brand_id: &str) -> JobResult<()> {
        sqlx::query("INSERT INTO brands (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(brand_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_member(&self, brand_id: &str, user_id: &str) -> JobResult<()> {
        sqlx::query(
            r#"
            INSERT INTO brand_members (brand_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (brand_id, user_id) DO NOTHING
            "#,
        )
        .bind(brand_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &GenerationJob) -> JobResult<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_jobs (
                id, brand_id, user_id, job_type, status, progress,
                created_at, started_at, completed_at,
                error, result_ref
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id)
        .bind(&job.brand_id)
        .bind(&job.user_id)
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error)
        .bind(&job.result_ref)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> JobResult<GenerationJob> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(JobError::NotFound { job_id })?.try_into()
    }

    async fn update(&self, job_id: Uuid, patch: JobPatch) -> JobResult<GenerationJob> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent patches to the same job.
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut job: GenerationJob = row.ok_or(JobError::NotFound { job_id })?.try_into()?;
        job.apply(patch, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = $2,
                progress = $3,
                started_at = $4,
                completed_at = $5,
                error = $6,
                result_ref = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error)
        .bind(&job.result_ref)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn query_active(
        &self,
        scope: &TenantScope,
        limit: i64,
    ) -> JobResult<Vec<GenerationJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM generation_jobs
            WHERE brand_id = $1 AND user_id = $2
              AND status IN ('pending', 'processing')
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        ))
        .bind(&scope.brand_id)
        .bind(&scope.user_id)
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        into_jobs(rows)
    }

    async fn query_recent(
        &self,
        scope: &TenantScope,
        limit: i64,
        since: DateTime<Utc>,
    ) -> JobResult<Vec<GenerationJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM generation_jobs
            WHERE brand_id = $1 AND user_id = $2
              AND status IN ('completed', 'failed')
              AND completed_at >= $3
            ORDER BY completed_at DESC, id DESC
            LIMIT $4
            "#
        ))
        .bind(&scope.brand_id)
        .bind(&scope.user_id)
        .bind(since)
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        into_jobs(rows)
    }

    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> JobResult<Vec<GenerationJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM generation_jobs
            WHERE status IN ('pending', 'processing')
              AND COALESCE(started_at, created_at) < $1
            ORDER BY COALESCE(started_at, created_at) ASC
            LIMIT $2
            "#
        ))
        .bind(cutoff)
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        into_jobs(rows)
    }

    async fn brand_access(&self, brand_id: &str, user_id: &str) -> JobResult<BrandAccess> {
        let row: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM brand_members m
                WHERE m.brand_id = b.id AND m.user_id = $2
            )
            FROM brands b
            WHERE b.id = $1
            "#,
        )
        .bind(brand_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => BrandAccess::UnknownBrand,
            Some((true,)) => BrandAccess::Granted,
            Some((false,)) => BrandAccess::Denied,
        })
    }
}
