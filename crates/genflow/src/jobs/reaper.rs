//! Force-fails jobs whose external worker went quiet.
//!
//! A job is stale once `now - (started_at ?? created_at)` exceeds the
//! budget. The poll route calls [`StalenessReaper::reap_stale_jobs`] before
//! reading, and [`run_sweep`] closes jobs of tenants that stopped polling.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::jobs::model::{GenerationJob, TenantScope};
use crate::jobs::tracker::JobTracker;

pub const DEFAULT_STALE_AFTER_SECS: i64 = 120;

/// Upper bound on jobs examined per reap pass.
const SCAN_LIMIT: i64 = 500;

/// Counters for one reap pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    pub scanned: usize,
    pub reaped: usize,
    pub failed_writes: usize,
}

#[derive(Clone)]
pub struct StalenessReaper {
    tracker: JobTracker,
    budget: Duration,
}

/// Elapsed time past the clock start, if it exceeds `budget`.
pub fn stale_elapsed(
    job: &GenerationJob,
    now: DateTime<Utc>,
    budget: Duration,
) -> Option<Duration> {
    if !job.status.is_active() {
        return None;
    }
    let elapsed = now - job.clock_start();
    (elapsed > budget).then_some(elapsed)
}

pub fn timeout_message(elapsed: Duration) -> String {
    let minutes = elapsed.num_minutes();
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    format!("Generation timed out after {minutes} {unit}")
}

impl StalenessReaper {
    pub fn new(tracker: JobTracker, budget: Duration) -> Self {
        Self { tracker, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Fail every stale active job of `scope`. Write errors are logged and
    /// counted, never returned: a failed reap must not break the caller's read.
    pub async fn reap_stale_jobs(&self, scope: &TenantScope) -> Result<ReapReport, JobError> {
        let active = self
            .tracker
            .get_active_jobs_for_user(scope, SCAN_LIMIT)
            .await?;
        Ok(self.reap(&active, Utc::now()).await)
    }

    /// Fail stale active jobs of every tenant.
    pub async fn sweep(&self) -> Result<ReapReport, JobError> {
        let now = Utc::now();
        let stale = self
            .tracker
            .store()
            .query_stale(now - self.budget, SCAN_LIMIT)
            .await?;
        Ok(self.reap(&stale, now).await)
    }

    async fn reap(&self, jobs: &[GenerationJob], now: DateTime<Utc>) -> ReapReport {
        let mut report = ReapReport {
            scanned: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            let Some(elapsed) = stale_elapsed(job, now, self.budget) else {
                continue;
            };
            let message = timeout_message(elapsed);

            match self.tracker.fail_job_if(job.id, job.status, &message).await {
                Ok(_) => {
                    report.reaped += 1;
                    tracing::info!(
                        job_id = %job.id,
                        brand_id = %job.brand_id,
                        elapsed_minutes = elapsed.num_minutes(),
                        "reaped stale generation job"
                    );
                }
                // Someone else moved the job first (usually the completion callback).
                Err(JobError::Conflict { .. } | JobError::Immutable { .. }) => {
                    tracing::debug!(job_id = %job.id, "stale job already moved on; skipping");
                }
                Err(e) => {
                    report.failed_writes += 1;
                    tracing::error!(job_id = %job.id, error = %e, "failed to reap stale job");
                }
            }
        }

        report
    }
}

/// Background sweep loop; runs until `cancel` fires.
pub async fn run_sweep(reaper: StalenessReaper, every: StdDuration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = every.as_secs(),
        budget_secs = reaper.budget().num_seconds(),
        "stale job sweep started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("stale job sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match reaper.sweep().await {
                    Ok(report) if report.reaped > 0 || report.failed_writes > 0 => {
                        tracing::info!(
                            scanned = report.scanned,
                            reaped = report.reaped,
                            failed_writes = report.failed_writes,
                            "stale job sweep finished"
                        );
                    }
                    Ok(_) => tracing::debug!("stale job sweep: nothing to reap"),
                    Err(e) => tracing::error!(error = %e, "stale job sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::{GenerationKind, JobStatus};

    fn budget() -> Duration {
        Duration::seconds(DEFAULT_STALE_AFTER_SECS)
    }

    fn job_started(ago: Duration) -> GenerationJob {
        let now = Utc::now();
        let mut job = GenerationJob::new(
            &TenantScope::new("b", "u"),
            GenerationKind::Video,
            now - ago - Duration::seconds(5),
        );
        job.status = JobStatus::Processing;
        job.started_at = Some(now - ago);
        job
    }

    #[test]
    fn within_budget_is_not_stale() {
        let job = job_started(Duration::seconds(90));
        assert!(stale_elapsed(&job, Utc::now(), budget()).is_none());
    }

    #[test]
    fn past_budget_is_stale() {
        let job = job_started(Duration::minutes(3));
        let elapsed = stale_elapsed(&job, Utc::now(), budget()).unwrap();
        assert_eq!(elapsed.num_minutes(), 3);
        assert_eq!(timeout_message(elapsed), "Generation timed out after 3 minutes");
    }

    #[test]
    fn pending_falls_back_to_created_at() {
        let now = Utc::now();
        let job = GenerationJob::new(
            &TenantScope::new("b", "u"),
            GenerationKind::Image,
            now - Duration::minutes(5),
        );
        assert!(stale_elapsed(&job, now, budget()).is_some());
    }

    #[test]
    fn terminal_jobs_are_never_stale() {
        let mut job = job_started(Duration::minutes(10));
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        assert!(stale_elapsed(&job, Utc::now(), budget()).is_none());
    }

    #[test]
    fn singular_minute() {
        assert_eq!(
            timeout_message(Duration::seconds(61)),
            "Generation timed out after 1 minute"
        );
    }
}
