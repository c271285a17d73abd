// SQLite JobRepository Implementation

use crate::error::{decode_json, decode_label, map_sqlx_error};
use async_trait::async_trait;
use autopost_core::domain::{Job, JobId, JobStatus, RunState};
use autopost_core::error::{AppError, Result};
use autopost_core::port::{JobRepository, RunRecord, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteJobRepository {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<JobId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (
                name, site_id, prompt_id, provider_id,
                schedule, placeholders, topic_strategy, category_strategy, category_ids,
                requires_validation, jitter_enabled, jitter_minutes,
                status, last_run_at, last_success_at, next_run_at,
                total_executions, failed_executions, consecutive_failures, last_category_index,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&job.name)
        .bind(job.site_id)
        .bind(job.prompt_id)
        .bind(job.provider_id)
        .bind(serde_json::to_string(&job.schedule)?)
        .bind(serde_json::to_string(&job.placeholders)?)
        .bind(job.topic_strategy.map(|s| s.as_str()))
        .bind(job.category_strategy.map(|s| s.as_str()))
        .bind(serde_json::to_string(&job.category_ids)?)
        .bind(job.requires_validation)
        .bind(job.jitter_enabled)
        .bind(i64::from(job.jitter_minutes))
        .bind(job.status.to_string())
        .bind(job.run.last_run_at)
        .bind(job.run.last_success_at)
        .bind(job.run.next_run_at)
        .bind(job.run.total_executions)
        .bind(job.run.failed_executions)
        .bind(job.run.consecutive_failures)
        .bind(job.run.last_category_index)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT * FROM jobs ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE status = ? ORDER BY id ASC")
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn update_definition(&self, job: &Job) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET name = ?, site_id = ?, prompt_id = ?, provider_id = ?,
                schedule = ?, placeholders = ?, topic_strategy = ?, category_strategy = ?,
                category_ids = ?, requires_validation = ?, jitter_enabled = ?, jitter_minutes = ?,
                last_category_index = ?, next_run_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.name)
        .bind(job.site_id)
        .bind(job.prompt_id)
        .bind(job.provider_id)
        .bind(serde_json::to_string(&job.schedule)?)
        .bind(serde_json::to_string(&job.placeholders)?)
        .bind(job.topic_strategy.map(|s| s.as_str()))
        .bind(job.category_strategy.map(|s| s.as_str()))
        .bind(serde_json::to_string(&job.category_ids)?)
        .bind(job.requires_validation)
        .bind(job.jitter_enabled)
        .bind(i64::from(job.jitter_minutes))
        .bind(job.run.last_category_index)
        .bind(job.run.next_run_at)
        .bind(self.time_provider.now_millis())
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: JobId) -> Result<bool> {
        // Executions go with the job (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        next_run_at: Option<i64>,
        reset_failures: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, next_run_at = ?,
                consecutive_failures = CASE WHEN ? THEN 0 ELSE consecutive_failures END,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(next_run_at)
        .bind(reset_failures)
        .bind(self.time_provider.now_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_next_run_at(&self, id: JobId, next_run_at: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE jobs SET next_run_at = ? WHERE id = ?")
            .bind(next_run_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn advance_category_index(&self, id: JobId, modulus: i64) -> Result<Option<usize>> {
        if modulus <= 0 {
            return Err(AppError::Validation(format!(
                "round-robin over {} categories",
                modulus
            )));
        }
        // Old values are visible on the right-hand side, so RETURNING yields the advanced cursor
        let advanced: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET last_category_index = (((last_category_index % ?1) + ?1) % ?1 + 1) % ?1
            WHERE id = ?2
            RETURNING last_category_index
            "#,
        )
        .bind(modulus)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(advanced.map(|next| (next - 1).rem_euclid(modulus) as usize))
    }

    async fn record_run(&self, id: JobId, record: &RunRecord) -> Result<Option<Job>> {
        // One statement so a concurrent edit never interleaves with the bookkeeping.
        // Every right-hand side sees the row as it was before the update.
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET last_run_at = ?1,
                total_executions = total_executions + 1,
                last_success_at = CASE WHEN ?2 THEN ?1 ELSE last_success_at END,
                failed_executions = failed_executions + CASE WHEN ?2 THEN 0 ELSE 1 END,
                consecutive_failures = CASE WHEN ?2 THEN 0 ELSE consecutive_failures + 1 END,
                status = CASE
                    WHEN status <> 'ACTIVE' THEN status
                    WHEN NOT ?2 AND ?3 > 0 AND consecutive_failures + 1 >= ?3 THEN 'ERROR'
                    WHEN ?4 THEN 'COMPLETED'
                    ELSE status
                END,
                next_run_at = CASE
                    WHEN status <> 'ACTIVE' THEN NULL
                    WHEN NOT ?2 AND ?3 > 0 AND consecutive_failures + 1 >= ?3 THEN NULL
                    WHEN ?4 THEN NULL
                    ELSE ?5
                END,
                updated_at = ?6
            WHERE id = ?7
            RETURNING *
            "#,
        )
        .bind(record.run_at)
        .bind(record.succeeded)
        .bind(i64::from(record.failure_threshold))
        .bind(record.complete_once)
        .bind(record.next_run_at)
        .bind(self.time_provider.now_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    name: String,
    site_id: i64,
    prompt_id: i64,
    provider_id: i64,

    schedule: String,
    placeholders: String,
    topic_strategy: Option<String>,
    category_strategy: Option<String>,
    category_ids: String,
    requires_validation: bool,
    jitter_enabled: bool,
    jitter_minutes: i64,

    status: String,
    last_run_at: Option<i64>,
    last_success_at: Option<i64>,
    next_run_at: Option<i64>,
    total_executions: i64,
    failed_executions: i64,
    consecutive_failures: i64,
    last_category_index: i64,

    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            id: self.id,
            name: self.name,
            site_id: self.site_id,
            prompt_id: self.prompt_id,
            provider_id: self.provider_id,
            placeholders: decode_json("placeholders", &self.placeholders)?,
            topic_strategy: self
                .topic_strategy
                .as_deref()
                .map(|s| decode_label("topic_strategy", s))
                .transpose()?,
            category_strategy: self
                .category_strategy
                .as_deref()
                .map(|s| decode_label("category_strategy", s))
                .transpose()?,
            category_ids: decode_json("category_ids", &self.category_ids)?,
            requires_validation: self.requires_validation,
            jitter_enabled: self.jitter_enabled,
            jitter_minutes: u32::try_from(self.jitter_minutes).unwrap_or(0),
            schedule: decode_json("schedule", &self.schedule)?,
            status: decode_label("status", &self.status)?,
            run: RunState {
                last_run_at: self.last_run_at,
                last_success_at: self.last_success_at,
                next_run_at: self.next_run_at,
                total_executions: self.total_executions,
                failed_executions: self.failed_executions,
                consecutive_failures: self.consecutive_failures,
                last_category_index: self.last_category_index,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use autopost_core::domain::{CategoryStrategy, IntervalUnit, Schedule, TopicStrategy};
    use autopost_core::port::SimulatedTimeProvider;

    async fn setup() -> SqliteJobRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobRepository::new(pool, Arc::new(SimulatedTimeProvider::new(50_000)))
    }

    fn record(succeeded: bool, threshold: u32) -> RunRecord {
        RunRecord {
            run_at: 10_000,
            succeeded,
            next_run_at: Some(20_000),
            complete_once: false,
            failure_threshold: threshold,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trips_config() {
        let repo = setup().await;
        let mut job = Job::new_test(
            3,
            Schedule::Daily {
                hour: 9,
                minute: 30,
                weekdays: vec![1, 2],
            },
        );
        job.placeholders.insert("tone".into(), "casual".into());
        job.topic_strategy = Some(TopicStrategy::ReuseWithVariation);
        job.category_strategy = Some(CategoryStrategy::RandomAll);
        job.category_ids = vec![4, 5];
        job.jitter_enabled = true;
        job.jitter_minutes = 15;

        let id = repo.insert(&job).await.unwrap();
        let found = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.schedule, job.schedule);
        assert_eq!(found.placeholders, job.placeholders);
        assert_eq!(found.topic_strategy, job.topic_strategy);
        assert_eq!(found.category_strategy, job.category_strategy);
        assert_eq!(found.category_ids, vec![4, 5]);
        assert_eq!(found.jitter_minutes, 15);
        assert_eq!(found.status, JobStatus::Active);
    }

    #[tokio::test]
    async fn test_record_run_flips_to_error_at_threshold() {
        let repo = setup().await;
        let id = repo.insert(&Job::new_test(1, Schedule::Manual)).await.unwrap();

        for _ in 0..2 {
            let job = repo.record_run(id, &record(false, 3)).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Active);
            assert_eq!(job.run.next_run_at, Some(20_000));
        }
        let job = repo.record_run(id, &record(false, 3)).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.run.consecutive_failures, 3);
        assert_eq!(job.run.failed_executions, 3);
        assert_eq!(job.run.next_run_at, None);
    }

    #[tokio::test]
    async fn test_record_run_success_resets_streak() {
        let repo = setup().await;
        let id = repo.insert(&Job::new_test(1, Schedule::Manual)).await.unwrap();
        repo.record_run(id, &record(false, 5)).await.unwrap();

        let job = repo.record_run(id, &record(true, 5)).await.unwrap().unwrap();
        assert_eq!(job.run.consecutive_failures, 0);
        assert_eq!(job.run.total_executions, 2);
        assert_eq!(job.run.last_success_at, Some(10_000));
        assert_eq!(job.run.last_run_at, Some(10_000));
    }

    #[tokio::test]
    async fn test_record_run_completes_once_and_keeps_paused() {
        let repo = setup().await;
        let once = repo
            .insert(&Job::new_test(1, Schedule::Once { execute_at: 5_000 }))
            .await
            .unwrap();
        let job = repo
            .record_run(
                once,
                &RunRecord {
                    complete_once: true,
                    ..record(true, 5)
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.run.next_run_at, None);

        let paused = repo.insert(&Job::new_test(2, Schedule::Manual)).await.unwrap();
        repo.set_status(paused, JobStatus::Paused, None, false)
            .await
            .unwrap();
        let job = repo.record_run(paused, &record(true, 5)).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Paused);
        assert_eq!(job.run.next_run_at, None);
        assert_eq!(job.run.total_executions, 1);
    }

    #[tokio::test]
    async fn test_record_run_on_deleted_job() {
        let repo = setup().await;
        let id = repo.insert(&Job::new_test(1, Schedule::Manual)).await.unwrap();
        assert!(repo.delete(id).await.unwrap());
        assert!(repo.record_run(id, &record(true, 5)).await.unwrap().is_none());
        assert!(!repo.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_round_robin_cursor_cycles() {
        let repo = setup().await;
        let id = repo.insert(&Job::new_test(1, Schedule::Manual)).await.unwrap();
        let mut used = Vec::new();
        for _ in 0..4 {
            used.push(repo.advance_category_index(id, 3).await.unwrap().unwrap());
        }
        assert_eq!(used, vec![0, 1, 2, 0]);
        let job = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.run.last_category_index, 1);
    }

    #[tokio::test]
    async fn test_update_definition_keeps_counters() {
        let repo = setup().await;
        let id = repo.insert(&Job::new_test(1, Schedule::Manual)).await.unwrap();
        repo.record_run(id, &record(false, 5)).await.unwrap();

        let mut job = repo.find_by_id(id).await.unwrap().unwrap();
        job.name = "Renamed".into();
        job.schedule = Schedule::Interval {
            value: 2,
            unit: IntervalUnit::Hours,
            start_at: None,
        };
        job.run.total_executions = 99;
        job.run.next_run_at = Some(77_000);
        assert!(repo.update_definition(&job).await.unwrap());

        let stored = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.schedule, job.schedule);
        assert_eq!(stored.run.total_executions, 1);
        assert_eq!(stored.run.consecutive_failures, 1);
        assert_eq!(stored.run.next_run_at, Some(77_000));
        assert_eq!(stored.updated_at, 50_000);
    }

    #[tokio::test]
    async fn test_set_status_resets_failures_on_request() {
        let repo = setup().await;
        let id = repo.insert(&Job::new_test(1, Schedule::Manual)).await.unwrap();
        for _ in 0..3 {
            repo.record_run(id, &record(false, 3)).await.unwrap();
        }
        assert!(repo
            .set_status(id, JobStatus::Active, Some(60_000), true)
            .await
            .unwrap());
        let job = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.run.consecutive_failures, 0);
        assert_eq!(job.run.failed_executions, 3);
        assert_eq!(repo.find_by_status(JobStatus::Active).await.unwrap().len(), 1);
    }
}
