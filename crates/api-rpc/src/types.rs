//! RPC Request/Response Types
//!
//! Parameters are always passed by name (a JSON object).

use autopost_core::application::ValidationDecision;
use autopost_core::domain::{Execution, ExecutionId, Job, JobId, SiteId, Topic};
use autopost_core::port::HistoryStats;
use serde::{Deserialize, Serialize};

/// jobs.get / delete / pause / resume / execute
#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub job_id: JobId,
    pub deleted: bool,
}

/// executions.list.v1
#[derive(Debug, Deserialize)]
pub struct ListExecutionsRequest {
    pub job_id: JobId,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionListResponse {
    pub job_id: JobId,
    pub executions: Vec<Execution>,
}

/// executions.validate.v1
///
/// `{"execution_id": "...", "decision": "approve", "title": "..."}`
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub execution_id: ExecutionId,
    #[serde(flatten)]
    pub decision: ValidationDecision,
}

/// topics.add.v1
#[derive(Debug, Deserialize)]
pub struct AddTopicsRequest {
    pub site_id: SiteId,
    pub titles: Vec<String>,
}

/// topics.list.v1
#[derive(Debug, Deserialize)]
pub struct SiteRequest {
    pub site_id: SiteId,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicsResponse {
    pub site_id: SiteId,
    pub topics: Vec<Topic>,
}

/// admin.stats.v1
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub active_workers: usize,
    #[serde(flatten)]
    pub history: HistoryStats,
}
