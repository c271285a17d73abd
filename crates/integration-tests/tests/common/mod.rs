//! Engine over a real SQLite store with simulated time and scripted collaborators
#![allow(dead_code)]

use autopost_core::application::{Engine, EngineConfig, EnginePorts, JobCreateInput};
use autopost_core::domain::Schedule;
use autopost_core::port::content_generator::mocks::MockContentGenerator;
use autopost_core::port::site_publisher::mocks::MockSitePublisher;
use autopost_core::port::{FixedRandom, SequentialIdProvider, SimulatedTimeProvider};
use autopost_infra_sqlite::{
    create_pool, run_migrations, SqliteExecutionLock, SqliteExecutionRepository,
    SqliteJobRepository, SqliteMaintenance, SqliteTopicRepository,
};
use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const MINUTE: i64 = 60_000;
pub const HOUR: i64 = 60 * MINUTE;

/// Epoch ms of a UTC wall-clock time
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
        .timestamp_millis()
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry_base_delay: Duration::from_millis(1),
        generation_timeout: Duration::from_secs(5),
        publish_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub struct Stack {
    pub pool: SqlitePool,
    pub engine: Engine,
    pub clock: Arc<SimulatedTimeProvider>,
    pub generator: Arc<MockContentGenerator>,
    pub publisher: Arc<MockSitePublisher>,
    pub maintenance: Arc<SqliteMaintenance>,
}

impl Stack {
    pub async fn new(start: i64) -> Self {
        Self::with(
            start,
            MockContentGenerator::new_success(),
            MockSitePublisher::new(),
            fast_config(),
        )
        .await
    }

    pub async fn with(
        start: i64,
        generator: MockContentGenerator,
        publisher: MockSitePublisher,
        config: EngineConfig,
    ) -> Self {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let clock = Arc::new(SimulatedTimeProvider::new(start));
        Self::on_pool(pool, clock, "exec", generator, publisher, config)
    }

    /// A second engine over the same database, as after a restart
    pub fn restart(&self) -> Self {
        Self::on_pool(
            self.pool.clone(),
            self.clock.clone(),
            "restarted",
            MockContentGenerator::new_success(),
            MockSitePublisher::new(),
            fast_config(),
        )
    }

    fn on_pool(
        pool: SqlitePool,
        clock: Arc<SimulatedTimeProvider>,
        id_prefix: &str,
        generator: MockContentGenerator,
        publisher: MockSitePublisher,
        config: EngineConfig,
    ) -> Self {
        let generator = Arc::new(generator);
        let publisher = Arc::new(publisher);
        let ports = EnginePorts {
            jobs: Arc::new(SqliteJobRepository::new(pool.clone(), clock.clone())),
            executions: Arc::new(SqliteExecutionRepository::new(pool.clone())),
            topics: Arc::new(SqliteTopicRepository::new(pool.clone(), clock.clone())),
            lock: Arc::new(SqliteExecutionLock::new(
                pool.clone(),
                Arc::new(SequentialIdProvider::new("lease")),
                clock.clone(),
            )),
            generator: generator.clone(),
            publisher: publisher.clone(),
            time: clock.clone(),
            ids: Arc::new(SequentialIdProvider::new(id_prefix)),
            random: Arc::new(FixedRandom::new(0)),
        };
        let engine = Engine::new(ports, config).unwrap();

        Self {
            maintenance: Arc::new(SqliteMaintenance::new(pool.clone())),
            pool,
            engine,
            clock,
            generator,
            publisher,
        }
    }

    /// One scheduler tick followed by waiting for the workers it started
    pub async fn tick(&self) -> autopost_core::application::TickReport {
        let report = self.engine.scheduler.tick().await.unwrap();
        self.engine.dispatcher.drain().await;
        report
    }
}

pub fn job_input(name: &str, site_id: i64, schedule: Schedule) -> JobCreateInput {
    JobCreateInput {
        name: name.to_string(),
        site_id,
        prompt_id: 1,
        provider_id: 1,
        schedule,
        placeholders: BTreeMap::new(),
        topic_strategy: None,
        category_strategy: None,
        category_ids: vec![],
        requires_validation: false,
        jitter_enabled: false,
        jitter_minutes: 0,
    }
}
