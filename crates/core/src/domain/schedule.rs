// Schedule Domain Model

use serde::{Deserialize, Serialize};

const MINUTE_MS: i64 = 60 * 1000;

/// Unit of an `Interval` schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    /// Length of one unit in milliseconds
    pub fn millis(&self) -> i64 {
        match self {
            IntervalUnit::Minutes => MINUTE_MS,
            IntervalUnit::Hours => 60 * MINUTE_MS,
            IntervalUnit::Days => 24 * 60 * MINUTE_MS,
            IntervalUnit::Weeks => 7 * 24 * 60 * MINUTE_MS,
        }
    }
}

/// When a job fires.
///
/// Weekdays are numbered `0 = Sunday` through `6 = Saturday`.
/// Timestamps are epoch milliseconds; wall-clock fields (`hour`, `minute`,
/// `day`) are interpreted in the engine's configured UTC offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Only runs through an explicit run-now
    Manual,
    /// Fires once at `execute_at`
    Once { execute_at: i64 },
    /// Fires every `value` units, first at `start_at` (or immediately)
    Interval {
        value: u32,
        unit: IntervalUnit,
        #[serde(default)]
        start_at: Option<i64>,
    },
    /// Fires at `hour:minute` on the listed weekdays (empty = every day)
    Daily {
        hour: u32,
        minute: u32,
        #[serde(default)]
        weekdays: Vec<u32>,
    },
    /// Fires at `hour:minute` on one weekday
    Weekly { weekday: u32, hour: u32, minute: u32 },
    /// Fires at `hour:minute` on `day` of each month, clamped to the month's last day
    Monthly { day: u32, hour: u32, minute: u32 },
}

impl Schedule {
    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::Manual => "manual",
            Schedule::Once { .. } => "once",
            Schedule::Interval { .. } => "interval",
            Schedule::Daily { .. } => "daily",
            Schedule::Weekly { .. } => "weekly",
            Schedule::Monthly { .. } => "monthly",
        }
    }

    /// True for schedules that keep producing fire times
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Schedule::Manual | Schedule::Once { .. })
    }

    /// Interval period in milliseconds (None for non-interval schedules)
    pub fn period_millis(&self) -> Option<i64> {
        match self {
            Schedule::Interval { value, unit, .. } => Some(i64::from(*value) * unit.millis()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Manual => write!(f, "manual"),
            Schedule::Once { execute_at } => write!(f, "once at {}", execute_at),
            Schedule::Interval { value, unit, .. } => write!(f, "every {} {:?}", value, unit),
            Schedule::Daily {
                hour,
                minute,
                weekdays,
            } => write!(f, "daily {:02}:{:02} on {:?}", hour, minute, weekdays),
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => write!(f, "weekly day {} {:02}:{:02}", weekday, hour, minute),
            Schedule::Monthly { day, hour, minute } => {
                write!(f, "monthly day {} {:02}:{:02}", day, hour, minute)
            }
        }
    }
}
