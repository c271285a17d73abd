//! JSON-RPC Server
//!
//! Serves the versioned methods over TCP. Binds to localhost unless told otherwise.

use crate::handler::RpcHandler;
use autopost_core::error::{AppError, Result};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// Method names served by [`RpcServer`]
pub const METHODS: &[&str] = &[
    "jobs.list.v1",
    "jobs.get.v1",
    "jobs.create.v1",
    "jobs.update.v1",
    "jobs.delete.v1",
    "jobs.pause.v1",
    "jobs.resume.v1",
    "jobs.execute.v1",
    "executions.list.v1",
    "executions.validate.v1",
    "topics.add.v1",
    "topics.list.v1",
    "admin.stats.v1",
];

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: RpcHandler,
}

/// Register a method taking one params object
macro_rules! register {
    ($module:expr, $name:literal, $method:ident) => {
        $module
            .register_async_method($name, |params, handler, _| async move {
                let req = params.parse()?;
                handler.$method(req).await
            })
            .map_err(|e| AppError::Internal(e.to_string()))?;
    };
}

/// Register a method that ignores its params
macro_rules! register_no_params {
    ($module:expr, $name:literal, $method:ident) => {
        $module
            .register_async_method($name, |_, handler, _| async move {
                handler.$method().await
            })
            .map_err(|e| AppError::Internal(e.to_string()))?;
    };
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self { config, handler }
    }

    fn module(handler: RpcHandler) -> Result<RpcModule<RpcHandler>> {
        let mut module = RpcModule::new(handler);

        register_no_params!(module, "jobs.list.v1", list_jobs);
        register!(module, "jobs.get.v1", get_job);
        register!(module, "jobs.create.v1", create_job);
        register!(module, "jobs.update.v1", update_job);
        register!(module, "jobs.delete.v1", delete_job);
        register!(module, "jobs.pause.v1", pause_job);
        register!(module, "jobs.resume.v1", resume_job);
        register!(module, "jobs.execute.v1", execute_job);
        register!(module, "executions.list.v1", list_executions);
        register!(module, "executions.validate.v1", validate_execution);
        register!(module, "topics.add.v1", add_topics);
        register!(module, "topics.list.v1", list_topics);
        register_no_params!(module, "admin.stats.v1", stats);

        Ok(module)
    }

    /// Bind and start serving; returns the bound address and the stop handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let module = Self::module(self.handler)?;

        let server = Server::builder().build(&addr).await?;
        let local_addr = server.local_addr()?;

        info!(addr = %local_addr, methods = METHODS.len(), "JSON-RPC server listening");
        Ok((local_addr, server.start(module)))
    }
}
