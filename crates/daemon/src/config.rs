//! Daemon configuration from `AUTOPOST_*` environment variables

use anyhow::{anyhow, Context, Result};
use autopost_api_rpc::RpcServerConfig;
use autopost_core::application::EngineConfig;
use autopost_core::port::RetentionConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.autopost/autopost.db";
const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8080/";
const DEFAULT_RATE_LIMIT_BURST: u32 = 20;
const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 5;
const DEFAULT_LEASE_PURGE_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub rpc: RpcServerConfig,
    pub generator_url: String,
    pub publisher_url: String,
    pub gateway_token: Option<String>,
    pub engine: EngineConfig,
    pub retention: RetentionConfig,
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: u32,
    pub lease_purge_interval: Duration,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = get("AUTOPOST_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = PathBuf::from(shellexpand::tilde(&db_path).into_owned());

        let mut rpc = RpcServerConfig::default();
        if let Some(host) = get("AUTOPOST_RPC_HOST") {
            rpc.host = host;
        }
        if let Some(port) = parse(&get, "AUTOPOST_RPC_PORT")? {
            rpc.port = port;
        }

        let mut engine = EngineConfig::default();
        if let Some(secs) = parse::<u64>(&get, "AUTOPOST_TICK_SECS")? {
            engine.tick_interval = Duration::from_secs(secs);
        }
        if let Some(n) = parse(&get, "AUTOPOST_MAX_CONCURRENT")? {
            engine.max_concurrent_executions = n;
        }
        if let Some(secs) = parse::<u64>(&get, "AUTOPOST_LEASE_SECS")? {
            engine.lease_duration = Duration::from_secs(secs);
        }
        if let Some(n) = parse(&get, "AUTOPOST_FAILURE_THRESHOLD")? {
            engine.consecutive_failure_threshold = n;
        }
        if let Some(minutes) = parse(&get, "AUTOPOST_UTC_OFFSET_MINUTES")? {
            engine.utc_offset_minutes = minutes;
        }
        if let Some(serialize) = parse(&get, "AUTOPOST_SERIALIZE_SITES")? {
            engine.serialize_site_executions = serialize;
        }
        if let Some(check) = parse(&get, "AUTOPOST_CHECK_SITE_HEALTH")? {
            engine.check_site_health = check;
        }
        engine.validate().map_err(|e| anyhow!("{}", e))?;

        let mut retention = RetentionConfig::default();
        if let Some(days) = parse(&get, "AUTOPOST_RETENTION_DAYS")? {
            retention.history_retention_days = days;
        }

        let gateway = get("AUTOPOST_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

        let log_format = match get("AUTOPOST_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(anyhow!("AUTOPOST_LOG_FORMAT must be pretty or json, got {}", other)),
        };

        Ok(Self {
            db_path,
            rpc,
            generator_url: get("AUTOPOST_GENERATOR_URL").unwrap_or_else(|| gateway.clone()),
            publisher_url: get("AUTOPOST_PUBLISHER_URL").unwrap_or(gateway),
            gateway_token: get("AUTOPOST_GATEWAY_TOKEN"),
            engine,
            retention,
            rate_limit_burst: parse(&get, "AUTOPOST_RATE_LIMIT_BURST")?
                .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
            rate_limit_per_sec: parse(&get, "AUTOPOST_RATE_LIMIT_PER_SEC")?
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_SEC),
            lease_purge_interval: Duration::from_secs(DEFAULT_LEASE_PURGE_SECS),
            log_format,
            log_dir: get("AUTOPOST_LOG_DIR").map(|dir| PathBuf::from(shellexpand::tilde(&dir).into_owned())),
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path.display())
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid value for {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<DaemonConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.generator_url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.publisher_url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.db_path.ends_with(".autopost/autopost.db"));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("AUTOPOST_DB_PATH", "/tmp/a.db"),
            ("AUTOPOST_RPC_PORT", "7000"),
            ("AUTOPOST_TICK_SECS", "30"),
            ("AUTOPOST_MAX_CONCURRENT", "8"),
            ("AUTOPOST_UTC_OFFSET_MINUTES", "-300"),
            ("AUTOPOST_PUBLISHER_URL", "http://sites.local/"),
            ("AUTOPOST_LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.database_url(), "sqlite:///tmp/a.db");
        assert_eq!(config.rpc.port, 7000);
        assert_eq!(config.engine.tick_interval, Duration::from_secs(30));
        assert_eq!(config.engine.max_concurrent_executions, 8);
        assert_eq!(config.engine.utc_offset_minutes, -300);
        assert_eq!(config.publisher_url, "http://sites.local/");
        assert_eq!(config.generator_url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = config(&[("AUTOPOST_RPC_PORT", "port")]).unwrap_err();
        assert!(err.to_string().contains("AUTOPOST_RPC_PORT"));
        assert!(config(&[("AUTOPOST_MAX_CONCURRENT", "0")]).is_err());
        assert!(config(&[("AUTOPOST_LOG_FORMAT", "xml")]).is_err());
    }
}
