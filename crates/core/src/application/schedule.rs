//! Schedule evaluation
//!
//! Pure functions deciding whether a schedule is due and when it fires next.
//! Wall-clock schedules (`Daily`, `Weekly`, `Monthly`) are read in a fixed
//! UTC offset. Recurring schedules always count from the last actual fire,
//! so an outage of any length yields a single catch-up run.

use crate::domain::{Job, Schedule};
use crate::error::{AppError, Result};
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;

/// Days scanned forward to find the next wall-clock slot
const MAX_SCAN_DAYS: u64 = 400;

/// Why an evaluation came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    Due,
    /// Manual schedules never fire on their own
    Manual,
    NotYetDue,
    /// Today's weekday (or month day) is not part of the schedule
    DayExcluded,
    /// The current slot already has a run
    AlreadyRan,
    /// A one-shot schedule that already fired
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub due: bool,
    pub next_run_at: Option<i64>,
    pub reason: EvaluationReason,
}

impl Evaluation {
    fn due(next_run_at: i64) -> Self {
        Self {
            due: true,
            next_run_at: Some(next_run_at),
            reason: EvaluationReason::Due,
        }
    }

    fn waiting(next_run_at: Option<i64>, reason: EvaluationReason) -> Self {
        Self {
            due: false,
            next_run_at,
            reason,
        }
    }
}

/// Evaluates schedules in one fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct ScheduleEvaluator {
    offset: FixedOffset,
}

impl Default for ScheduleEvaluator {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl ScheduleEvaluator {
    pub fn new(utc_offset_minutes: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            AppError::Config(format!("invalid utc offset: {} minutes", utc_offset_minutes))
        })?;
        Ok(Self { offset })
    }

    /// Evaluate a job's schedule against its run state
    ///
    /// An interval without `start_at` is anchored at the job's creation.
    pub fn evaluate_job(&self, job: &Job, now: i64) -> Evaluation {
        self.evaluate_anchored(&job.schedule, now, job.run.last_run_at, job.created_at)
    }

    /// Evaluate `schedule` at `now` given the last fire time
    pub fn evaluate(&self, schedule: &Schedule, now: i64, last_run_at: Option<i64>) -> Evaluation {
        self.evaluate_anchored(schedule, now, last_run_at, now)
    }

    fn evaluate_anchored(
        &self,
        schedule: &Schedule,
        now: i64,
        last_run_at: Option<i64>,
        anchor: i64,
    ) -> Evaluation {
        match schedule {
            Schedule::Manual => Evaluation::waiting(None, EvaluationReason::Manual),
            Schedule::Once { execute_at } => match last_run_at {
                Some(last) if last >= *execute_at => {
                    Evaluation::waiting(None, EvaluationReason::Exhausted)
                }
                _ if now >= *execute_at => Evaluation::due(*execute_at),
                _ => Evaluation::waiting(Some(*execute_at), EvaluationReason::NotYetDue),
            },
            Schedule::Interval { start_at, .. } => {
                let period = schedule.period_millis().unwrap_or(0);
                let next = match (last_run_at, start_at) {
                    (Some(last), Some(start)) => (last + period).max(*start),
                    (Some(last), None) => last + period,
                    (None, Some(start)) => *start,
                    (None, None) => anchor.min(now),
                };
                if now >= next {
                    Evaluation::due(next)
                } else {
                    Evaluation::waiting(Some(next), EvaluationReason::NotYetDue)
                }
            }
            Schedule::Daily { hour, minute, .. }
            | Schedule::Weekly { hour, minute, .. }
            | Schedule::Monthly { hour, minute, .. } => {
                self.evaluate_wall_clock(schedule, *hour, *minute, now, last_run_at)
            }
        }
    }

    fn evaluate_wall_clock(
        &self,
        schedule: &Schedule,
        hour: u32,
        minute: u32,
        now: i64,
        last_run_at: Option<i64>,
    ) -> Evaluation {
        let Some(local_now) = self.to_local(now) else {
            return Evaluation::waiting(None, EvaluationReason::NotYetDue);
        };
        let today = local_now.date_naive();

        let reason = if !fires_on(schedule, today) {
            EvaluationReason::DayExcluded
        } else {
            match self.slot_millis(today, hour, minute) {
                Some(slot) if now >= slot => {
                    if last_run_at.map_or(true, |last| last < slot) {
                        return Evaluation::due(slot);
                    }
                    EvaluationReason::AlreadyRan
                }
                _ => EvaluationReason::NotYetDue,
            }
        };

        let next = (0..=MAX_SCAN_DAYS)
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .filter(|date| fires_on(schedule, *date))
            .filter_map(|date| self.slot_millis(date, hour, minute))
            .find(|slot| *slot > now);

        Evaluation::waiting(next, reason)
    }

    fn to_local(&self, millis: i64) -> Option<DateTime<FixedOffset>> {
        DateTime::from_timestamp_millis(millis).map(|utc| utc.with_timezone(&self.offset))
    }

    fn slot_millis(&self, date: NaiveDate, hour: u32, minute: u32) -> Option<i64> {
        date.and_hms_opt(hour, minute, 0)?
            .and_local_timezone(self.offset)
            .single()
            .map(|dt| dt.timestamp_millis())
    }
}

/// Does a wall-clock schedule have a slot on `date`?
fn fires_on(schedule: &Schedule, date: NaiveDate) -> bool {
    let weekday = date.weekday().num_days_from_sunday();
    match schedule {
        Schedule::Daily { weekdays, .. } => weekdays.is_empty() || weekdays.contains(&weekday),
        Schedule::Weekly { weekday: wanted, .. } => weekday == *wanted,
        Schedule::Monthly { day, .. } => {
            date.day() == (*day).min(days_in_month(date.year(), date.month()))
        }
        _ => false,
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}
