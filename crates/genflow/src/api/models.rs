// crates/genflow/src/api/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::{GenerationJob, GenerationKind};

/// Body of `GET /generation/jobs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsSnapshot {
    pub active_jobs: Vec<GenerationJob>,
    pub recent_jobs: Vec<GenerationJob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsQuery {
    pub brand_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub brand_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: GenerationKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub result_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub error: String,
}
