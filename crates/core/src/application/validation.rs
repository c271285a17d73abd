// Job configuration validation, applied on create and update

use crate::application::worker::constants::MAX_JITTER_MINUTES;
use crate::domain::{CategoryStrategy, Job, Schedule};
use crate::error::{AppError, Result};

const MAX_NAME_LEN: usize = 200;

/// Reject a job definition the scheduler could not run unambiguously
pub fn validate_job(job: &Job) -> Result<()> {
    let name = job.name.trim();
    if name.is_empty() {
        return Err(invalid("job name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid(format!(
            "job name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }
    for (field, id) in [
        ("site_id", job.site_id),
        ("prompt_id", job.prompt_id),
        ("provider_id", job.provider_id),
    ] {
        if id <= 0 {
            return Err(invalid(format!("{} must be positive, got {}", field, id)));
        }
    }

    if job.placeholders.keys().any(|k| k.trim().is_empty()) {
        return Err(invalid("placeholder names must not be empty"));
    }

    if let Some(strategy) = job.category_strategy {
        if strategy.uses_job_categories() && job.category_ids.is_empty() {
            return Err(invalid(format!(
                "category strategy '{}' needs at least one category",
                strategy.as_str()
            )));
        }
    }
    if job.category_strategy == Some(CategoryStrategy::RoundRobin) {
        let mut ids = job.category_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != job.category_ids.len() {
            return Err(invalid("round-robin categories must be distinct"));
        }
    }

    if job.jitter_enabled && job.jitter_minutes > MAX_JITTER_MINUTES {
        return Err(invalid(format!(
            "jitter of {} minutes exceeds the {} minute limit",
            job.jitter_minutes, MAX_JITTER_MINUTES
        )));
    }

    validate_schedule(&job.schedule)
}

/// Range checks for every schedule kind
pub fn validate_schedule(schedule: &Schedule) -> Result<()> {
    match schedule {
        Schedule::Manual => Ok(()),
        Schedule::Once { execute_at } => {
            if *execute_at < 0 {
                return Err(invalid("execute_at must be a valid timestamp"));
            }
            Ok(())
        }
        Schedule::Interval {
            value, start_at, ..
        } => {
            if *value == 0 {
                return Err(invalid("interval value must be at least 1"));
            }
            if start_at.is_some_and(|s| s < 0) {
                return Err(invalid("start_at must be a valid timestamp"));
            }
            Ok(())
        }
        Schedule::Daily {
            hour,
            minute,
            weekdays,
        } => {
            check_time(*hour, *minute)?;
            for day in weekdays {
                check_weekday(*day)?;
            }
            let mut unique = weekdays.clone();
            unique.sort_unstable();
            unique.dedup();
            if unique.len() != weekdays.len() {
                return Err(invalid("weekdays must not repeat"));
            }
            Ok(())
        }
        Schedule::Weekly {
            weekday,
            hour,
            minute,
        } => {
            check_time(*hour, *minute)?;
            check_weekday(*weekday)
        }
        Schedule::Monthly { day, hour, minute } => {
            check_time(*hour, *minute)?;
            if !(1..=31).contains(day) {
                return Err(invalid(format!("day of month must be 1-31, got {}", day)));
            }
            Ok(())
        }
    }
}

fn check_time(hour: u32, minute: u32) -> Result<()> {
    if hour > 23 {
        return Err(invalid(format!("hour must be 0-23, got {}", hour)));
    }
    if minute > 59 {
        return Err(invalid(format!("minute must be 0-59, got {}", minute)));
    }
    Ok(())
}

fn check_weekday(day: u32) -> Result<()> {
    if day > 6 {
        return Err(invalid(format!(
            "weekday must be 0 (Sunday) to 6 (Saturday), got {}",
            day
        )));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IntervalUnit;

    #[test]
    fn test_valid_job_passes() {
        let job = Job::new_test(
            1,
            Schedule::Daily {
                hour: 9,
                minute: 0,
                weekdays: vec![1, 3, 5],
            },
        );
        assert!(validate_job(&job).is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_schedules() {
        let bad = [
            Schedule::Interval {
                value: 0,
                unit: IntervalUnit::Hours,
                start_at: None,
            },
            Schedule::Daily {
                hour: 24,
                minute: 0,
                weekdays: vec![],
            },
            Schedule::Daily {
                hour: 9,
                minute: 0,
                weekdays: vec![7],
            },
            Schedule::Daily {
                hour: 9,
                minute: 0,
                weekdays: vec![1, 1],
            },
            Schedule::Weekly {
                weekday: 2,
                hour: 9,
                minute: 60,
            },
            Schedule::Monthly {
                day: 0,
                hour: 9,
                minute: 0,
            },
        ];
        for schedule in bad {
            assert!(
                matches!(validate_schedule(&schedule), Err(AppError::Validation(_))),
                "{} should be rejected",
                schedule
            );
        }
    }

    #[test]
    fn test_round_robin_needs_categories() {
        let mut job = Job::new_test(1, Schedule::Manual);
        job.category_strategy = Some(CategoryStrategy::RoundRobin);
        assert!(validate_job(&job).is_err());

        job.category_ids = vec![3, 4];
        assert!(validate_job(&job).is_ok());

        // random-all picks from the site's own list
        job.category_strategy = Some(CategoryStrategy::RandomAll);
        job.category_ids.clear();
        assert!(validate_job(&job).is_ok());
    }

    #[test]
    fn test_rejects_blank_name_and_excess_jitter() {
        let mut job = Job::new_test(1, Schedule::Manual);
        job.name = "   ".into();
        assert!(validate_job(&job).is_err());

        let mut job = Job::new_test(1, Schedule::Manual);
        job.jitter_enabled = true;
        job.jitter_minutes = MAX_JITTER_MINUTES + 1;
        assert!(validate_job(&job).is_err());
    }
}
