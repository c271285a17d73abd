//! JSON-RPC surface over a real socket, backed by SQLite

mod common;

use autopost_api_rpc::error::code;
use autopost_api_rpc::rate_limiter::RateLimiter;
use autopost_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use common::{utc, Stack};
use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::server::ServerHandle;
use serde_json::{json, Value};
use std::sync::Arc;

async fn serve(stack: &Stack, limiter: RateLimiter) -> (HttpClient, ServerHandle) {
    let handler = RpcHandler::new(
        Arc::clone(&stack.engine.jobs),
        Arc::clone(&stack.engine.dispatcher),
        stack.maintenance.clone(),
        limiter,
    );
    let config = RpcServerConfig {
        port: 0,
        ..Default::default()
    };
    let (addr, handle) = RpcServer::new(config, handler).start().await.unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://{}", addr))
        .unwrap();
    (client, handle)
}

fn error_code(err: ClientError) -> i32 {
    match err {
        ClientError::Call(object) => object.code(),
        other => panic!("expected a call error, got {:?}", other),
    }
}

/// Params are a single object; wrap it so it is sent by name
fn object(value: Value) -> jsonrpsee::core::params::ObjectParams {
    let mut params = jsonrpsee::core::params::ObjectParams::new();
    if let Value::Object(map) = value {
        for (key, value) in map {
            params.insert(&key, value).unwrap();
        }
    }
    params
}

#[tokio::test]
async fn test_job_lifecycle_over_rpc() {
    let stack = Stack::new(utc(2024, 1, 1, 0, 0)).await;
    let (client, handle) = serve(&stack, RateLimiter::new(100, 10)).await;

    let created: Value = client
        .request(
            "jobs.create.v1",
            object(json!({
                "name": "Tuesday digest",
                "site_id": 3,
                "prompt_id": 1,
                "provider_id": 1,
                "schedule": {"type": "daily", "hour": 9, "minute": 0, "weekdays": [2]},
                "requires_validation": true
            })),
        )
        .await
        .unwrap();
    let job_id = created["id"].as_i64().unwrap();
    assert_eq!(created["status"], "ACTIVE");
    assert!(created["run"]["next_run_at"].is_i64());

    let listed: Value = client.request("jobs.list.v1", rpc_params![]).await.unwrap();
    assert_eq!(listed["jobs"].as_array().unwrap().len(), 1);

    let outcome: Value = client
        .request("jobs.execute.v1", object(json!({ "job_id": job_id })))
        .await
        .unwrap();
    assert_eq!(outcome["outcome"], "started");
    let execution_id = outcome["execution_id"].as_str().unwrap().to_string();
    stack.engine.dispatcher.drain().await;

    // Suspended for review: a second run is refused with the outcome attached
    let refused = client
        .request::<Value, _>("jobs.execute.v1", object(json!({ "job_id": job_id })))
        .await
        .unwrap_err();
    assert_eq!(error_code(refused), code::BUSY);

    let executions: Value = client
        .request(
            "executions.list.v1",
            object(json!({ "job_id": job_id, "limit": 10 })),
        )
        .await
        .unwrap();
    assert_eq!(executions["executions"][0]["status"], "PENDING_VALIDATION");

    client
        .request::<Value, _>(
            "executions.validate.v1",
            object(json!({
                "execution_id": execution_id,
                "decision": "approve",
                "title": "Reviewed title"
            })),
        )
        .await
        .unwrap();
    stack.engine.dispatcher.drain().await;
    assert_eq!(stack.publisher.published()[0].1.title, "Reviewed title");

    let paused: Value = client
        .request("jobs.pause.v1", object(json!({ "job_id": job_id })))
        .await
        .unwrap();
    assert_eq!(paused["status"], "PAUSED");

    let stats: Value = client.request("admin.stats.v1", rpc_params![]).await.unwrap();
    assert_eq!(stats["job_count"], 1);
    assert_eq!(stats["executions_by_status"]["PUBLISHED"], 1);

    let deleted: Value = client
        .request("jobs.delete.v1", object(json!({ "job_id": job_id })))
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], true);
    let missing = client
        .request::<Value, _>("jobs.get.v1", object(json!({ "job_id": job_id })))
        .await
        .unwrap_err();
    assert_eq!(error_code(missing), code::NOT_FOUND);

    handle.stop().unwrap();
}

#[tokio::test]
async fn test_invalid_input_and_topics() {
    let stack = Stack::new(utc(2024, 1, 1, 0, 0)).await;
    let (client, handle) = serve(&stack, RateLimiter::new(100, 10)).await;

    let invalid = client
        .request::<Value, _>(
            "jobs.create.v1",
            object(json!({
                "name": "Bad hour",
                "site_id": 1,
                "prompt_id": 1,
                "provider_id": 1,
                "schedule": {"type": "daily", "hour": 25, "minute": 0}
            })),
        )
        .await
        .unwrap_err();
    assert_eq!(error_code(invalid), code::VALIDATION_ERROR);

    let added: Value = client
        .request(
            "topics.add.v1",
            object(json!({ "site_id": 4, "titles": ["Rust", "Tokio", "Rust"] })),
        )
        .await
        .unwrap();
    assert_eq!(added["topics"].as_array().unwrap().len(), 2);

    let listed: Value = client
        .request("topics.list.v1", object(json!({ "site_id": 4 })))
        .await
        .unwrap();
    assert_eq!(listed["topics"][0]["title"], "Rust");

    handle.stop().unwrap();
}

#[tokio::test]
async fn test_mutations_are_rate_limited() {
    let stack = Stack::new(utc(2024, 1, 1, 0, 0)).await;
    let (client, handle) = serve(&stack, RateLimiter::new(1, 0)).await;

    client
        .request::<Value, _>(
            "topics.add.v1",
            object(json!({ "site_id": 1, "titles": ["first"] })),
        )
        .await
        .unwrap();
    let throttled = client
        .request::<Value, _>(
            "topics.add.v1",
            object(json!({ "site_id": 1, "titles": ["second"] })),
        )
        .await
        .unwrap_err();
    assert_eq!(error_code(throttled), code::THROTTLED);

    // Reads are not throttled
    client
        .request::<Value, _>("topics.list.v1", object(json!({ "site_id": 1 })))
        .await
        .unwrap();

    handle.stop().unwrap();
}
