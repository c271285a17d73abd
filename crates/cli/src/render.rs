//! Table rows built from engine JSON

use chrono::{Local, TimeZone};
use serde_json::Value;
use tabled::Tabled;

const MAX_CELL: usize = 48;

#[derive(Tabled)]
pub struct JobRow {
    id: i64,
    name: String,
    site: i64,
    schedule: String,
    status: String,
    next_run: String,
    last_run: String,
    runs: String,
}

impl JobRow {
    pub fn from_json(job: &Value) -> Self {
        let run = &job["run"];
        Self {
            id: job["id"].as_i64().unwrap_or_default(),
            name: cell(text(&job["name"])),
            site: job["site_id"].as_i64().unwrap_or_default(),
            schedule: describe_schedule(&job["schedule"]),
            status: text(&job["status"]),
            next_run: timestamp(&run["next_run_at"]),
            last_run: timestamp(&run["last_run_at"]),
            runs: format!(
                "{} ({} failed)",
                run["total_executions"].as_i64().unwrap_or_default(),
                run["failed_executions"].as_i64().unwrap_or_default()
            ),
        }
    }
}

#[derive(Tabled)]
pub struct ExecutionRow {
    id: String,
    status: String,
    trigger: String,
    created: String,
    title: String,
    result: String,
}

impl ExecutionRow {
    pub fn from_json(execution: &Value) -> Self {
        let result = execution["published_url"]
            .as_str()
            .or_else(|| execution["error"].as_str())
            .unwrap_or("-");
        Self {
            id: text(&execution["id"]),
            status: text(&execution["status"]),
            trigger: text(&execution["trigger"]),
            created: timestamp(&execution["created_at"]),
            title: cell(execution["title"].as_str().unwrap_or("-").to_string()),
            result: cell(result.to_string()),
        }
    }
}

#[derive(Tabled)]
pub struct TopicRow {
    id: i64,
    title: String,
    used: i64,
    last_used: String,
}

impl TopicRow {
    pub fn from_json(topic: &Value) -> Self {
        Self {
            id: topic["id"].as_i64().unwrap_or_default(),
            title: cell(text(&topic["title"])),
            used: topic["used_count"].as_i64().unwrap_or_default(),
            last_used: timestamp(&topic["last_used_at"]),
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn cell(mut s: String) -> String {
    if s.chars().count() > MAX_CELL {
        s = s.chars().take(MAX_CELL - 1).collect();
        s.push('…');
    }
    s
}

/// Epoch milliseconds in local time, `-` when absent
pub fn timestamp(value: &Value) -> String {
    value
        .as_i64()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// One-line summary of a schedule object
pub fn describe_schedule(schedule: &Value) -> String {
    let num = |key: &str| schedule[key].as_u64().unwrap_or_default();
    let at = || format!("{:02}:{:02}", num("hour"), num("minute"));
    match schedule["type"].as_str() {
        Some("manual") => "manual".to_string(),
        Some("once") => format!("once at {}", timestamp(&schedule["execute_at"])),
        Some("interval") => format!("every {} {}", num("value"), text(&schedule["unit"])),
        Some("daily") => match schedule["weekdays"].as_array() {
            Some(days) if !days.is_empty() => {
                let names: Vec<&str> = days
                    .iter()
                    .filter_map(|d| d.as_u64())
                    .map(weekday_name)
                    .collect();
                format!("{} {}", names.join(","), at())
            }
            _ => format!("daily {}", at()),
        },
        Some("weekly") => format!("{} {}", weekday_name(num("weekday")), at()),
        Some("monthly") => format!("day {} {}", num("day"), at()),
        _ => text(schedule),
    }
}

fn weekday_name(day: u64) -> &'static str {
    match day {
        0 => "Sun",
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        6 => "Sat",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_describe_schedules() {
        assert_eq!(describe_schedule(&json!({"type": "manual"})), "manual");
        assert_eq!(
            describe_schedule(&json!({"type": "interval", "value": 3, "unit": "hours"})),
            "every 3 hours"
        );
        assert_eq!(
            describe_schedule(&json!({"type": "daily", "hour": 9, "minute": 5, "weekdays": [2, 4]})),
            "Tue,Thu 09:05"
        );
        assert_eq!(
            describe_schedule(&json!({"type": "daily", "hour": 18, "minute": 0, "weekdays": []})),
            "daily 18:00"
        );
        assert_eq!(
            describe_schedule(&json!({"type": "weekly", "weekday": 0, "hour": 7, "minute": 30})),
            "Sun 07:30"
        );
    }

    #[test]
    fn test_missing_values_render_as_dash() {
        assert_eq!(timestamp(&Value::Null), "-");
        let row = ExecutionRow::from_json(&json!({"id": "e1", "status": "FAILED", "error": "boom"}));
        assert_eq!(row.title, "-");
        assert_eq!(row.result, "boom");
    }

    #[test]
    fn test_long_cells_are_truncated() {
        let long = "x".repeat(100);
        assert_eq!(cell(long).chars().count(), MAX_CELL);
    }
}
