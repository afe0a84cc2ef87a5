use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{JobError, JobResult};

/// Tenant scope every read and write is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantScope {
    pub brand_id: String,
    pub user_id: String,
}

impl TenantScope {
    pub fn new(brand_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            brand_id: brand_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn owns(&self, job: &GenerationJob) -> bool {
        job.brand_id == self.brand_id && job.user_id == self.user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Forward-only: staying put is allowed while active, terminal states never move.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, _) => true,
            (JobStatus::Processing, JobStatus::Pending) => false,
            (JobStatus::Processing, _) => true,
            (JobStatus::Completed | JobStatus::Failed, _) => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(JobError::Validation(format!("unknown job status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Image,
    Video,
    Music,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Image => "image",
            GenerationKind::Video => "video",
            GenerationKind::Music => "music",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" => Ok(GenerationKind::Image),
            "video" => Ok(GenerationKind::Video),
            "music" => Ok(GenerationKind::Music),
            other => Err(JobError::Validation(format!(
                "unknown generation type: {other}"
            ))),
        }
    }
}

/// Postgres keeps microseconds; finer timestamps would not survive a round trip.
pub fn storage_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::microseconds(1)).unwrap_or(at)
}

/// One tracked external generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: Uuid,
    pub brand_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: GenerationKind,
    pub status: JobStatus,
    pub progress: i32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
}

impl GenerationJob {
    pub fn new(scope: &TenantScope, kind: GenerationKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            brand_id: scope.brand_id.clone(),
            user_id: scope.user_id.clone(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            created_at: storage_precision(now),
            started_at: None,
            completed_at: None,
            error: None,
            result_ref: None,
        }
    }

    /// Reference point for staleness: when work began, or when the job was filed.
    pub fn clock_start(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.created_at)
    }

    /// Merge `patch` into this job, enforcing the lifecycle rules.
    ///
    /// Both store implementations route every write through here so the
    /// invariants live in one place:
    /// - terminal jobs are immutable
    /// - status only moves forward
    /// - `started_at` is stamped once and never changes
    /// - `completed_at` is stamped on entering a terminal status
    /// - `error` only survives on `failed`, `result_ref` only on `completed`
    pub fn apply(&mut self, patch: JobPatch, now: DateTime<Utc>) -> JobResult<()> {
        let now = storage_precision(now);
        if let Some(expected) = patch.expect_status {
            if self.status != expected {
                return Err(JobError::Conflict {
                    job_id: self.id,
                    expected,
                    actual: self.status,
                });
            }
        }

        if self.status.is_terminal() {
            return Err(JobError::Immutable {
                job_id: self.id,
                status: self.status,
            });
        }

        if let Some(progress) = patch.progress {
            if !(0..=100).contains(&progress) {
                return Err(JobError::Validation(format!(
                    "progress must be within 0..=100, got {progress}"
                )));
            }
        }

        let next = patch.status.unwrap_or(self.status);
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        if next == JobStatus::Failed && patch.error.is_none() {
            return Err(JobError::Validation(
                "a failed job needs an error message".into(),
            ));
        }

        if self.started_at.is_none() {
            if let Some(started_at) = patch.started_at {
                self.started_at = Some(storage_precision(started_at));
            } else if next == JobStatus::Processing {
                self.started_at = Some(now);
            }
        }

        if let Some(progress) = patch.progress {
            self.progress = progress;
        }

        if next.is_terminal() {
            self.completed_at = Some(patch.completed_at.map_or(now, storage_precision));
        }

        self.error = if next == JobStatus::Failed {
            patch.error
        } else {
            None
        };
        self.result_ref = if next == JobStatus::Completed {
            patch.result_ref
        } else {
            None
        };
        if next == JobStatus::Completed {
            self.progress = 100;
        }

        self.status = next;
        Ok(())
    }
}

/// Merge-patch for a job. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result_ref: Option<String>,

    /// Compare-and-swap guard: reject the patch unless the job is in this status.
    pub expect_status: Option<JobStatus>,
}

impl JobPatch {
    pub fn started() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            ..Default::default()
        }
    }

    pub fn progress(progress: i32) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn completed(result_ref: Option<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            result_ref,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(message.into()),
            completed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn guarded(mut self, expected: JobStatus) -> Self {
        self.expect_status = Some(expected);
        self
    }
}
