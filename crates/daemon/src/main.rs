//! Autopost Engine - Main Entry Point
//! Wires SQLite storage, HTTP collaborators and the JSON-RPC surface around the core engine.

mod config;
mod logging;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use autopost_api_rpc::rate_limiter::RateLimiter;
use autopost_api_rpc::{RpcHandler, RpcServer};
use autopost_core::application::{
    shutdown_channel, Engine, EnginePorts, RetentionScheduler, ShutdownToken,
};
use autopost_core::port::{ExecutionLock, SystemTimeProvider, ThreadRandom, UuidProvider};
use autopost_infra_http::{GatewayClient, HttpContentGenerator, HttpSitePublisher};
use autopost_infra_sqlite::{
    create_pool, run_migrations, SqliteExecutionLock, SqliteExecutionRepository,
    SqliteJobRepository, SqliteMaintenance, SqliteTopicRepository,
};
use config::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env().context("configuration")?;
    let _log_guard = logging::init(config.log_format, config.log_dir.as_deref())?;

    info!("Autopost Engine v{} starting...", VERSION);

    // 2. Database
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    info!(db_path = %config.db_path.display(), "Initializing database...");
    let pool = create_pool(&config.database_url())
        .await
        .map_err(|e| anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow!("Migration failed: {}", e))?;

    // 3. Adapters (DI wiring)
    let time = Arc::new(SystemTimeProvider);
    let ids = Arc::new(UuidProvider);
    let lock = Arc::new(SqliteExecutionLock::new(pool.clone(), ids.clone(), time.clone()));

    let generator_client = GatewayClient::new(&config.generator_url, config.gateway_token.clone())
        .map_err(|e| anyhow!("generator client: {}", e))?;
    let publisher_client = GatewayClient::new(&config.publisher_url, config.gateway_token.clone())
        .map_err(|e| anyhow!("publisher client: {}", e))?;

    let ports = EnginePorts {
        jobs: Arc::new(SqliteJobRepository::new(pool.clone(), time.clone())),
        executions: Arc::new(SqliteExecutionRepository::new(pool.clone())),
        topics: Arc::new(SqliteTopicRepository::new(pool.clone(), time.clone())),
        lock: lock.clone(),
        generator: Arc::new(HttpContentGenerator::new(generator_client)),
        publisher: Arc::new(HttpSitePublisher::new(publisher_client)),
        time: time.clone(),
        ids,
        random: Arc::new(ThreadRandom),
    };
    let engine = Engine::new(ports, config.engine.clone())
        .map_err(|e| anyhow!("Engine setup failed: {}", e))?;

    // 4. Crash recovery, before anything can admit work
    info!("Running crash recovery...");
    match engine.recovery.recover().await {
        Ok(report) => info!(
            leases_cleared = report.leases_cleared,
            failed_executions = report.failed_executions,
            "Crash recovery completed"
        ),
        Err(e) => error!(error = ?e, "Crash recovery failed"),
    }

    // 5. JSON-RPC server
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone()));
    let handler = RpcHandler::new(
        Arc::clone(&engine.jobs),
        Arc::clone(&engine.dispatcher),
        maintenance.clone(),
        RateLimiter::new(config.rate_limit_burst, config.rate_limit_per_sec),
    );
    let (rpc_addr, rpc_handle) = RpcServer::new(config.rpc.clone(), handler)
        .start()
        .await
        .map_err(|e| anyhow!("RPC server start failed: {}", e))?;
    info!(addr = %rpc_addr, "JSON-RPC server ready");

    // 6. Background loops
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let scheduler = Arc::clone(&engine.scheduler);
    let scheduler_token = shutdown_rx.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_token).await });

    let retention = RetentionScheduler::new(maintenance, time, config.retention.clone());
    let retention_handle = tokio::spawn(retention.run(shutdown_rx.clone()));

    let purge_handle = spawn_lease_purge(lock, config.lease_purge_interval, shutdown_rx);

    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }

    // Scheduler drains in-flight workers before returning
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler_handle).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Workers still running at shutdown; their leases will expire"
        );
    }
    let _ = retention_handle.await;
    let _ = purge_handle.await;
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}

/// Periodically drop leases whose holders are gone
fn spawn_lease_purge(
    lock: Arc<dyn ExecutionLock>,
    every: Duration,
    mut shutdown: ShutdownToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => match lock.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "Expired leases purged"),
                    Err(e) => error!(error = ?e, "Lease purge failed"),
                },
                _ = shutdown.wait() => break,
            }
        }
    })
}
