// SQLite ExecutionLock Implementation
// Leases live in the database next to the executions they guard

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use autopost_core::domain::{JobId, SiteId};
use autopost_core::error::Result;
use autopost_core::port::{BusyReason, ExecutionLock, IdProvider, LeaseToken, LockOutcome, TimeProvider};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tracing::debug;

pub struct SqliteExecutionLock {
    pool: SqlitePool,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteExecutionLock {
    pub fn new(
        pool: SqlitePool,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            id_provider,
            time_provider,
        }
    }
}

fn job_key(job_id: JobId) -> String {
    format!("job:{}", job_id)
}

fn site_key(site_id: SiteId) -> String {
    format!("site:{}", site_id)
}

/// Insert the lease, or take over an expired one; false when a live lease holds the key
async fn claim(
    tx: &mut Transaction<'_, Sqlite>,
    key: &str,
    token: &str,
    job_id: JobId,
    expires_at: i64,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO execution_leases (lock_key, token, job_id, expires_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (lock_key) DO UPDATE
            SET token = excluded.token,
                job_id = excluded.job_id,
                expires_at = excluded.expires_at
            WHERE execution_leases.expires_at <= ?
        "#,
    )
    .bind(key)
    .bind(token)
    .bind(job_id)
    .bind(expires_at)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl ExecutionLock for SqliteExecutionLock {
    async fn try_acquire(
        &self,
        job_id: JobId,
        site_id: Option<SiteId>,
        ttl_millis: i64,
    ) -> Result<LockOutcome> {
        let now = self.time_provider.now_millis();
        let token = self.id_provider.generate_id();
        let expires_at = now + ttl_millis;

        // Dropping the transaction without commit rolls back a half-taken pair
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        if !claim(&mut tx, &job_key(job_id), &token, job_id, expires_at, now).await? {
            return Ok(LockOutcome::Busy(BusyReason::JobLocked));
        }
        if let Some(site_id) = site_id {
            if !claim(&mut tx, &site_key(site_id), &token, job_id, expires_at, now).await? {
                return Ok(LockOutcome::Busy(BusyReason::SiteLocked { site_id }));
            }
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(job_id, site_id = ?site_id, expires_at, "Lease acquired");
        Ok(LockOutcome::Acquired(LeaseToken {
            token,
            job_id,
            site_id,
            expires_at,
        }))
    }

    async fn release(&self, lease: &LeaseToken) -> Result<()> {
        let site = lease.site_id.map(site_key);
        sqlx::query("DELETE FROM execution_leases WHERE token = ? AND lock_key IN (?, ?)")
            .bind(&lease.token)
            .bind(job_key(lease.job_id))
            .bind(site)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM execution_leases WHERE expires_at <= ?")
            .bind(self.time_provider.now_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn reset(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM execution_leases")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
