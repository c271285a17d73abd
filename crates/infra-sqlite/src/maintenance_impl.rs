// SQLite HistoryMaintenance Implementation
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use autopost_core::error::Result;
use autopost_core::port::{HistoryMaintenance, HistoryStats};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;

pub struct SqliteMaintenance {
    pool: SqlitePool,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn db_size_bytes(&self) -> Result<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(page_count * page_size)
    }

    async fn count_by_status(&self, table: &str) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl HistoryMaintenance for SqliteMaintenance {
    async fn prune_executions(&self, cutoff_millis: i64) -> Result<u64> {
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

        info!(
            deleted = result.rows_affected(),
            cutoff_millis, "Pruned execution history"
        );
        Ok(result.rows_affected())
    }

    async fn compact(&self) -> Result<i64> {
        let before = self.db_size_bytes().await?;
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let after = self.db_size_bytes().await?;

        let reclaimed = (before - after).max(0);
        info!(before, after, reclaimed, "VACUUM completed");
        Ok(reclaimed)
    }

    async fn stats(&self) -> Result<HistoryStats> {
        let jobs_by_status = self.count_by_status("jobs").await?;
        let executions_by_status = self.count_by_status("executions").await?;
        let oldest_execution_at: Option<i64> =
            sqlx::query_scalar("SELECT MIN(created_at) FROM executions")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(HistoryStats {
            job_count: jobs_by_status.values().sum(),
            execution_count: executions_by_status.values().sum(),
            jobs_by_status,
            executions_by_status,
            oldest_execution_at,
        })
    }
}
