// SQLite ExecutionRepository Implementation

use crate::error::{decode_label, map_sqlx_error};
use async_trait::async_trait;
use autopost_core::domain::{Execution, ExecutionId, ExecutionStatus, JobId};
use autopost_core::error::Result;
use autopost_core::port::ExecutionRepository;
use sqlx::SqlitePool;

pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn insert(&self, execution: &Execution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, job_id, site_id, provider_id, trigger, status,
                created_at, started_at, finished_at,
                topic_id, topic_title, category_id, category_name,
                title, content, tokens_used, published_url,
                generation_attempts, publish_attempts, error, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(execution.job_id)
        .bind(execution.site_id)
        .bind(execution.provider_id)
        .bind(execution.trigger.to_string())
        .bind(execution.status.to_string())
        .bind(execution.created_at)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.topic_id)
        .bind(&execution.topic_title)
        .bind(execution.category_id)
        .bind(&execution.category_name)
        .bind(&execution.title)
        .bind(&execution.content)
        .bind(execution.tokens_used)
        .bind(&execution.published_url)
        .bind(execution.generation_attempts)
        .bind(execution.publish_attempts)
        .bind(&execution.error)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, execution: &Execution) -> Result<bool> {
        // Conditional so a reclaimed (already terminal) row is never overwritten
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, started_at = ?, finished_at = ?,
                topic_id = ?, topic_title = ?, category_id = ?, category_name = ?,
                title = ?, content = ?, tokens_used = ?, published_url = ?,
                generation_attempts = ?, publish_attempts = ?, error = ?, updated_at = ?
            WHERE id = ?
              AND status NOT IN ('PUBLISHED', 'FAILED')
            "#,
        )
        .bind(execution.status.to_string())
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.topic_id)
        .bind(&execution.topic_title)
        .bind(execution.category_id)
        .bind(&execution.category_name)
        .bind(&execution.title)
        .bind(&execution.content)
        .bind(execution.tokens_used)
        .bind(&execution.published_url)
        .bind(execution.generation_attempts)
        .bind(execution.publish_attempts)
        .bind(&execution.error)
        .bind(execution.updated_at)
        .bind(&execution.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>> {
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ExecutionRow::into_execution).transpose()
    }

    async fn find_active_for_job(&self, job_id: JobId) -> Result<Option<Execution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT * FROM executions
            WHERE job_id = ? AND status NOT IN ('PUBLISHED', 'FAILED')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(ExecutionRow::into_execution).transpose()
    }

    async fn find_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT * FROM executions WHERE status = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ExecutionRow::into_execution).collect()
    }

    async fn list_for_job(&self, job_id: JobId, limit: i64) -> Result<Vec<Execution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT * FROM executions
            WHERE job_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ExecutionRow::into_execution).collect()
    }

    async fn delete_finished_before(&self, cutoff_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM executions
            WHERE status IN ('PUBLISHED', 'FAILED')
              AND finished_at IS NOT NULL
              AND finished_at < ?
            "#,
        )
        .bind(cutoff_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    job_id: i64,
    site_id: i64,
    provider_id: i64,
    trigger: String,
    status: String,
    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    topic_id: Option<i64>,
    topic_title: Option<String>,
    category_id: Option<i64>,
    category_name: Option<String>,
    title: Option<String>,
    content: Option<String>,
    tokens_used: Option<i64>,
    published_url: Option<String>,
    generation_attempts: i32,
    publish_attempts: i32,
    error: Option<String>,
    updated_at: i64,
}

impl ExecutionRow {
    fn into_execution(self) -> Result<Execution> {
        Ok(Execution {
            id: self.id,
            job_id: self.job_id,
            site_id: self.site_id,
            provider_id: self.provider_id,
            trigger: decode_label("trigger", &self.trigger)?,
            status: decode_label("status", &self.status)?,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            topic_id: self.topic_id,
            topic_title: self.topic_title,
            category_id: self.category_id,
            category_name: self.category_name,
            title: self.title,
            content: self.content,
            tokens_used: self.tokens_used,
            published_url: self.published_url,
            generation_attempts: self.generation_attempts,
            publish_attempts: self.publish_attempts,
            error: self.error,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteJobRepository};
    use autopost_core::domain::{Job, Schedule, Trigger};
    use autopost_core::port::{JobRepository, SimulatedTimeProvider};
    use std::sync::Arc;

    async fn setup() -> (SqliteJobRepository, SqliteExecutionRepository, Job) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let jobs = SqliteJobRepository::new(pool.clone(), Arc::new(SimulatedTimeProvider::new(0)));
        let mut job = Job::new_test(1, Schedule::Manual);
        job.id = jobs.insert(&job).await.unwrap();
        (jobs, SqliteExecutionRepository::new(pool), job)
    }

    #[tokio::test]
    async fn test_terminal_rows_reject_late_writes() {
        let (_, repo, job) = setup().await;
        let mut execution = Execution::new("e1", &job, Trigger::Scheduled, 1_000);
        repo.insert(&execution).await.unwrap();

        execution.transition(ExecutionStatus::Generating, 2_000).unwrap();
        assert!(repo.update(&execution).await.unwrap());

        let mut reclaimed = execution.clone();
        reclaimed.fail("lease expired", 3_000).unwrap();
        assert!(repo.update(&reclaimed).await.unwrap());

        execution.transition(ExecutionStatus::Validated, 4_000).unwrap();
        assert!(!repo.update(&execution).await.unwrap());

        let stored = repo.find_by_id(&"e1".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(stored.started_at, Some(2_000));
        assert_eq!(stored.error.as_deref(), Some("lease expired"));
    }

    #[tokio::test]
    async fn test_active_lookup_and_history_order() {
        let (_, repo, job) = setup().await;
        let mut first = Execution::new("e1", &job, Trigger::Scheduled, 1_000);
        repo.insert(&first).await.unwrap();
        first.fail("boom", 1_500).unwrap();
        repo.update(&first).await.unwrap();

        let second = Execution::new("e2", &job, Trigger::Manual, 2_000);
        repo.insert(&second).await.unwrap();

        let active = repo.find_active_for_job(job.id).await.unwrap().unwrap();
        assert_eq!(active.id, "e2");
        assert_eq!(active.trigger, Trigger::Manual);

        let history = repo.list_for_job(job.id, 10).await.unwrap();
        let ids: Vec<_> = history.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
        assert_eq!(repo.list_for_job(job.id, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_job_cascades_history() {
        let (jobs, repo, job) = setup().await;
        repo.insert(&Execution::new("e1", &job, Trigger::Scheduled, 1_000))
            .await
            .unwrap();
        jobs.delete(job.id).await.unwrap();
        assert!(repo.find_by_id(&"e1".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_deletes_only_old_terminal_rows() {
        let (_, repo, job) = setup().await;
        let mut old = Execution::new("old", &job, Trigger::Scheduled, 1_000);
        repo.insert(&old).await.unwrap();
        old.fail("boom", 1_000).unwrap();
        repo.update(&old).await.unwrap();
        repo.insert(&Execution::new("open", &job, Trigger::Scheduled, 1_000))
            .await
            .unwrap();

        assert_eq!(repo.delete_finished_before(5_000).await.unwrap(), 1);
        assert!(repo.find_by_id(&"open".to_string()).await.unwrap().is_some());
        assert_eq!(
            repo.find_by_status(ExecutionStatus::Pending).await.unwrap().len(),
            1
        );
    }
}
