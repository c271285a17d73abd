// Job Domain Model

use super::error::DomainError;
use super::schedule::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Job ID (assigned by the store)
pub type JobId = i64;

/// External catalog identifiers
pub type SiteId = i64;
pub type PromptId = i64;
pub type ProviderId = i64;
pub type CategoryId = i64;

/// Job Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Active,
    Paused,
    Completed,
    Error,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Active => write!(f, "ACTIVE"),
            JobStatus::Paused => write!(f, "PAUSED"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(JobStatus::Active),
            "PAUSED" => Ok(JobStatus::Paused),
            "COMPLETED" => Ok(JobStatus::Completed),
            "ERROR" => Ok(JobStatus::Error),
            other => Err(DomainError::UnknownVariant {
                kind: "job status",
                value: other.to_string(),
            }),
        }
    }
}

/// How the topic of a run is chosen from the site's topic pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStrategy {
    /// Each topic is used at most once
    Unique,
    /// Any topic, uniformly
    Random,
    /// Least-used topic, generated as a variation
    ReuseWithVariation,
}

impl TopicStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStrategy::Unique => "unique",
            TopicStrategy::Random => "random",
            TopicStrategy::ReuseWithVariation => "reuse_with_variation",
        }
    }
}

impl FromStr for TopicStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unique" => Ok(TopicStrategy::Unique),
            "random" => Ok(TopicStrategy::Random),
            "reuse_with_variation" => Ok(TopicStrategy::ReuseWithVariation),
            other => Err(DomainError::UnknownVariant {
                kind: "topic strategy",
                value: other.to_string(),
            }),
        }
    }
}

/// How the category of a run is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryStrategy {
    /// Cycle through the job's categories
    #[serde(rename = "round_robin")]
    RoundRobin,
    /// Random member of the job's categories
    #[serde(rename = "random")]
    Random,
    /// Random category among everything the site offers
    #[serde(rename = "random-all")]
    RandomAll,
}

impl CategoryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryStrategy::RoundRobin => "round_robin",
            CategoryStrategy::Random => "random",
            CategoryStrategy::RandomAll => "random-all",
        }
    }

    /// Strategies that draw from `Job::category_ids`
    pub fn uses_job_categories(&self) -> bool {
        matches!(self, CategoryStrategy::RoundRobin | CategoryStrategy::Random)
    }
}

impl FromStr for CategoryStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(CategoryStrategy::RoundRobin),
            "random" => Ok(CategoryStrategy::Random),
            "random-all" => Ok(CategoryStrategy::RandomAll),
            other => Err(DomainError::UnknownVariant {
                kind: "category strategy",
                value: other.to_string(),
            }),
        }
    }
}

/// Run bookkeeping owned by the engine (never written by users)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Start time of the latest run attempt, successful or not
    pub last_run_at: Option<i64>,
    pub last_success_at: Option<i64>,
    pub next_run_at: Option<i64>,
    pub total_executions: i64,
    pub failed_executions: i64,
    pub consecutive_failures: i64,
    pub last_category_index: i64,
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,

    // Targets
    pub site_id: SiteId,
    pub prompt_id: PromptId,
    pub provider_id: ProviderId,

    // Generation config
    pub placeholders: BTreeMap<String, String>,
    pub topic_strategy: Option<TopicStrategy>,
    pub category_strategy: Option<CategoryStrategy>,
    pub category_ids: Vec<CategoryId>,
    pub requires_validation: bool,
    pub jitter_enabled: bool,
    pub jitter_minutes: u32,

    pub schedule: Schedule,
    pub status: JobStatus,
    pub run: RunState,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
}

impl Job {
    /// Create a new job
    ///
    /// `id` is a placeholder until the repository assigns one on insert.
    pub fn new(
        name: impl Into<String>,
        site_id: SiteId,
        prompt_id: PromptId,
        provider_id: ProviderId,
        schedule: Schedule,
        created_at: i64,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            site_id,
            prompt_id,
            provider_id,
            placeholders: BTreeMap::new(),
            topic_strategy: None,
            category_strategy: None,
            category_ids: Vec::new(),
            requires_validation: false,
            jitter_enabled: false,
            jitter_minutes: 0,
            schedule,
            status: JobStatus::Active,
            run: RunState::default(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Create a test job with deterministic timestamps (for tests only)
    pub fn new_test(site_id: SiteId, schedule: Schedule) -> Self {
        Self::new(format!("job for site {}", site_id), site_id, 1, 1, schedule, 1_000)
    }

    pub fn is_schedulable(&self) -> bool {
        self.status == JobStatus::Active
    }

    /// Maximum jitter in milliseconds (0 when jitter is off)
    pub fn jitter_window_millis(&self) -> i64 {
        if self.jitter_enabled {
            i64::from(self.jitter_minutes) * 60 * 1000
        } else {
            0
        }
    }
}
