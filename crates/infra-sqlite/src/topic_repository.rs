// SQLite TopicRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use autopost_core::domain::{SiteId, Topic, TopicId};
use autopost_core::error::Result;
use autopost_core::port::{TimeProvider, TopicRepository};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteTopicRepository {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteTopicRepository {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl TopicRepository for SqliteTopicRepository {
    async fn add(&self, site_id: SiteId, titles: &[String]) -> Result<Vec<Topic>> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut added = Vec::with_capacity(titles.len());

        for title in titles {
            // Titles already in the pool are skipped
            let topic: Option<Topic> = sqlx::query_as(
                r#"
                INSERT INTO topics (site_id, title, used_count, created_at)
                VALUES (?, ?, 0, ?)
                ON CONFLICT (site_id, title) DO NOTHING
                RETURNING id, site_id, title, used_count, last_used_at, created_at
                "#,
            )
            .bind(site_id)
            .bind(title)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .map(TopicRow::into_topic);

            added.extend(topic);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(added)
    }

    async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<Topic>> {
        let rows: Vec<TopicRow> =
            sqlx::query_as("SELECT * FROM topics WHERE site_id = ? ORDER BY id ASC")
                .bind(site_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TopicRow::into_topic).collect())
    }

    async fn claim_unused(&self, site_id: SiteId) -> Result<Option<Topic>> {
        // Select and mark in one statement so two runs never draw the same topic
        let row: Option<TopicRow> = sqlx::query_as(
            r#"
            UPDATE topics
            SET used_count = used_count + 1, last_used_at = ?
            WHERE id = (
                SELECT id FROM topics
                WHERE site_id = ? AND used_count = 0
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(self.time_provider.now_millis())
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(TopicRow::into_topic))
    }

    async fn mark_used(&self, id: TopicId) -> Result<()> {
        sqlx::query("UPDATE topics SET used_count = used_count + 1, last_used_at = ? WHERE id = ?")
            .bind(self.time_provider.now_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TopicRow {
    id: i64,
    site_id: i64,
    title: String,
    used_count: i64,
    last_used_at: Option<i64>,
    created_at: i64,
}

impl TopicRow {
    fn into_topic(self) -> Topic {
        Topic {
            id: self.id,
            site_id: self.site_id,
            title: self.title,
            used_count: self.used_count,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
        }
    }
}
