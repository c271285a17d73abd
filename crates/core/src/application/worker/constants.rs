// Engine constants (no magic values)
use std::time::Duration;

/// Scheduler tick (15s)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);

/// Worker pool size
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 4;

/// AI generation attempts per run (first call included)
pub const DEFAULT_GENERATION_MAX_ATTEMPTS: u32 = 3;

/// Publish attempts per run: one retry
pub const DEFAULT_PUBLISH_MAX_ATTEMPTS: u32 = 2;

/// Base delay of exponential backoff (2s)
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Backoff multiplier per attempt
pub const RETRY_BACKOFF_FACTOR: f64 = 2.0;

/// Execution lease lifetime (15 minutes)
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15 * 60);

pub const DEFAULT_CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;

/// Timeout of one AI generation call (120s)
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout of one publish call (60s)
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound of configurable jitter (one day)
pub const MAX_JITTER_MINUTES: u32 = 24 * 60;

/// Error stored on executions cut short by a daemon restart
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by engine restart";

/// Error stored on executions whose lease expired under a hung worker
pub const ORPHANED_BY_EXPIRED_LEASE: &str = "lease expired before the execution finished";
