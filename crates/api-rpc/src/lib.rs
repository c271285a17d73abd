//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 server over localhost TCP exposing the job service.
//! Method names are versioned (`jobs.list.v1`); a breaking change gets a
//! new suffix instead of changing an existing method.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
