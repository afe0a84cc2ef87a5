use uuid::Uuid;

use crate::jobs::model::JobStatus;

/// Errors raised by the job record store and the tracker built on top of it.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {job_id} not found")]
    NotFound { job_id: Uuid },

    /// The job reached `completed` or `failed` and can no longer change.
    #[error("job {job_id} is {status} and can no longer be updated")]
    Immutable { job_id: Uuid, status: JobStatus },

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// A guarded update found the job in a different status than expected.
    #[error("job {job_id} expected status {expected} but found {actual}")]
    Conflict {
        job_id: Uuid,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("invalid job data: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        JobError::Storage(err.to_string())
    }
}

pub type JobResult<T> = Result<T, JobError>;
