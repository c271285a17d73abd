// Engine configuration consumed by the scheduler, dispatcher and executor

use crate::application::retry::RetryPolicy;
use crate::application::worker::constants::*;
use crate::error::{AppError, Result};
use std::time::Duration;

/// Tunables of the scheduling engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub tick_interval: Duration,
    pub max_concurrent_executions: usize,
    pub generation_max_attempts: u32,
    pub publish_max_attempts: u32,
    pub retry_base_delay: Duration,
    /// Lease lifetime, the backstop against a hung worker
    pub lease_duration: Duration,
    /// Consecutive failures that move a job to Error (0 disables)
    pub consecutive_failure_threshold: u32,
    pub generation_timeout: Duration,
    pub publish_timeout: Duration,
    /// At most one running execution per site across jobs
    pub serialize_site_executions: bool,
    pub check_site_health: bool,
    /// Fixed offset used to read hour/minute/weekday of wall-clock schedules
    pub utc_offset_minutes: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
            generation_max_attempts: DEFAULT_GENERATION_MAX_ATTEMPTS,
            publish_max_attempts: DEFAULT_PUBLISH_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            lease_duration: DEFAULT_LEASE_DURATION,
            consecutive_failure_threshold: DEFAULT_CONSECUTIVE_FAILURE_THRESHOLD,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            serialize_site_executions: true,
            check_site_health: true,
            utc_offset_minutes: 0,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(AppError::Config("tick interval must be positive".into()));
        }
        if self.max_concurrent_executions == 0 {
            return Err(AppError::Config(
                "max concurrent executions must be at least 1".into(),
            ));
        }
        if self.generation_max_attempts == 0 || self.publish_max_attempts == 0 {
            return Err(AppError::Config("attempt counts must be at least 1".into()));
        }
        let longest_run = self.max_execution_time();
        if self.lease_duration < longest_run {
            return Err(AppError::Config(format!(
                "lease duration of {}s is shorter than the longest possible run ({}s)",
                self.lease_duration.as_secs(),
                longest_run.as_secs_f64().ceil() as u64
            )));
        }
        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(AppError::Config(format!(
                "utc offset {} minutes is out of range",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }

    /// Upper bound of one run with every call timing out and every retry taken
    ///
    /// Two site calls (health check and category lookup) precede generation.
    pub fn max_execution_time(&self) -> Duration {
        let generation = RetryPolicy::for_generation(self.retry_base_delay, self.generation_max_attempts)
            .max_elapsed(self.generation_timeout);
        let publishing = RetryPolicy::for_publishing(self.retry_base_delay, self.publish_max_attempts)
            .max_elapsed(self.publish_timeout);
        self.publish_timeout * 2 + generation + publishing
    }

    pub fn lease_millis(&self) -> i64 {
        self.lease_duration.as_millis() as i64
    }
}
