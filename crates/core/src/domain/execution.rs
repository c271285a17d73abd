// Execution Domain Model - one run attempt of a job

use super::error::{DomainError, Result};
use super::job::{CategoryId, Job, JobId, ProviderId, SiteId};
use super::topic::TopicId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Execution ID (UUID v4)
pub type ExecutionId = String;

/// Execution State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Generating,
    PendingValidation,
    Validated,
    Publishing,
    Published,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Published | ExecutionStatus::Failed)
    }

    /// States a worker is actively driving (as opposed to suspended awaiting validation)
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Pending | ExecutionStatus::Generating | ExecutionStatus::Publishing
        )
    }

    fn can_transition_to(&self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Generating) => true,
            (Generating, PendingValidation) | (Generating, Validated) => true,
            (PendingValidation, Validated) => true,
            (Validated, Publishing) => true,
            (Publishing, Published) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Generating => "GENERATING",
            ExecutionStatus::PendingValidation => "PENDING_VALIDATION",
            ExecutionStatus::Validated => "VALIDATED",
            ExecutionStatus::Publishing => "PUBLISHING",
            ExecutionStatus::Published => "PUBLISHED",
            ExecutionStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ExecutionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ExecutionStatus::Pending),
            "GENERATING" => Ok(ExecutionStatus::Generating),
            "PENDING_VALIDATION" => Ok(ExecutionStatus::PendingValidation),
            "VALIDATED" => Ok(ExecutionStatus::Validated),
            "PUBLISHING" => Ok(ExecutionStatus::Publishing),
            "PUBLISHED" => Ok(ExecutionStatus::Published),
            "FAILED" => Ok(ExecutionStatus::Failed),
            other => Err(DomainError::UnknownVariant {
                kind: "execution status",
                value: other.to_string(),
            }),
        }
    }
}

/// What started the execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "SCHEDULED"),
            Trigger::Manual => write!(f, "MANUAL"),
        }
    }
}

impl FromStr for Trigger {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(Trigger::Scheduled),
            "MANUAL" => Ok(Trigger::Manual),
            other => Err(DomainError::UnknownVariant {
                kind: "trigger",
                value: other.to_string(),
            }),
        }
    }
}

/// Execution Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub job_id: JobId,
    pub site_id: SiteId,
    pub provider_id: ProviderId,
    pub trigger: Trigger,
    pub status: ExecutionStatus,

    pub created_at: i64, // admitted by the dispatcher
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    // Resolved in Pending
    pub topic_id: Option<TopicId>,
    pub topic_title: Option<String>,
    pub category_id: Option<CategoryId>,
    pub category_name: Option<String>,

    // Produced by Generating / Publishing
    pub title: Option<String>,
    pub content: Option<String>,
    pub tokens_used: Option<i64>,
    pub published_url: Option<String>,
    pub generation_attempts: i32,
    pub publish_attempts: i32,

    pub error: Option<String>,
    pub updated_at: i64,
}

impl Execution {
    /// Create a pending execution for a job snapshot
    pub fn new(id: impl Into<String>, job: &Job, trigger: Trigger, now_millis: i64) -> Self {
        Self {
            id: id.into(),
            job_id: job.id,
            site_id: job.site_id,
            provider_id: job.provider_id,
            trigger,
            status: ExecutionStatus::Pending,
            created_at: now_millis,
            started_at: None,
            finished_at: None,
            topic_id: None,
            topic_title: None,
            category_id: None,
            category_name: None,
            title: None,
            content: None,
            tokens_used: None,
            published_url: None,
            generation_attempts: 0,
            publish_attempts: 0,
            error: None,
            updated_at: now_millis,
        }
    }

    /// Move to `to`, rejecting edges outside the execution state machine
    pub fn transition(&mut self, to: ExecutionStatus, now_millis: i64) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        if self.status == ExecutionStatus::Pending && to == ExecutionStatus::Generating {
            self.started_at = Some(now_millis);
        }
        if to.is_terminal() {
            self.finished_at = Some(now_millis);
        }
        self.status = to;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Mark as Failed with a reason
    pub fn fail(&mut self, reason: impl Into<String>, now_millis: i64) -> Result<()> {
        self.transition(ExecutionStatus::Failed, now_millis)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Time the run counts as having happened (start, or admission if it never started)
    pub fn run_at(&self) -> i64 {
        self.started_at.unwrap_or(self.created_at)
    }
}
