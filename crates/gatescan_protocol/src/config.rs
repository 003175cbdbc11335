//! Environment-driven configuration for the two daemons.
//!
//! Both binaries read the same `REDIS_*` pair; `STATE_STORE_URL` overrides it
//! (e.g. `memory://` for local development).

use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::defaults;
use crate::keys;

/// How the producer answers the terminal body chunk when a scan is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Hold the final CONTINUE until the result is known; 403 on infection.
    #[default]
    Blocking,
    /// CONTINUE immediately; infections land on the block list.
    FireAndForget,
}

impl FromStr for ResponseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(ResponseMode::Blocking),
            "fire-and-forget" | "fire_and_forget" => Ok(ResponseMode::FireAndForget),
            other => Err(ConfigError::BadValue {
                var: "SCAN_RESPONSE_MODE",
                value: other.to_string(),
            }),
        }
    }
}

/// Which feature-flag backend resolves tenant priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureFlagEngine {
    Flagsmith,
    #[default]
    EnvVar,
}

impl FromStr for FeatureFlagEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flagsmith" => Ok(FeatureFlagEngine::Flagsmith),
            "envvar" => Ok(FeatureFlagEngine::EnvVar),
            other => Err(ConfigError::BadValue {
                var: "FEATURE_FLAG_ENGINE",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported value for {var}: {value:?}")]
    BadValue { var: &'static str, value: String },
}

/// Configuration for the producer daemon.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub state_store_url: String,
    pub grpc_port: u16,
    pub tenant_id: String,
    pub response_mode: ResponseMode,
    pub flag_engine: FeatureFlagEngine,
    /// Bodies above this (MB) are always streamed; informational threshold.
    pub scan_file_threshold_mb: u64,
    pub ca_cert_path: Option<String>,
    pub ca_key_path: Option<String>,
    pub sds_cache_max_size: usize,
    pub sds_cache_ttl_secs: u64,
    pub flagsmith_api_url: Option<String>,
    pub flagsmith_env_key: Option<String>,
}

impl ProducerConfig {
    pub fn from_env() -> Self {
        Self {
            state_store_url: state_store_url_from_env(),
            grpc_port: env_parse("GRPC_PORT", defaults::DEFAULT_GRPC_PORT),
            tenant_id: env_or("TENANT_ID", defaults::DEFAULT_TENANT_ID),
            response_mode: env_from_str("SCAN_RESPONSE_MODE"),
            flag_engine: env_from_str("FEATURE_FLAG_ENGINE"),
            scan_file_threshold_mb: env_parse("SCAN_FILE_THRESHOLD_MB", 10),
            ca_cert_path: env::var("CA_CERT_PATH").ok(),
            ca_key_path: env::var("CA_KEY_PATH").ok(),
            sds_cache_max_size: env_parse("SDS_CACHE_MAX_SIZE", defaults::SDS_CACHE_MAX_SIZE),
            sds_cache_ttl_secs: env_parse("SDS_CACHE_TTL_SECONDS", defaults::SDS_CACHE_TTL_SECS),
            flagsmith_api_url: env::var("FLAGSMITH_API_URL").ok(),
            flagsmith_env_key: env::var("FLAGSMITH_ENV_KEY").ok(),
        }
    }
}

/// Configuration for the worker daemon.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub state_store_url: String,
    pub clamd_url: String,
    pub queues: Vec<String>,
    /// Node identifier in the cluster registry (pod name in k8s).
    pub node_id: String,
    /// Deployment the autoscaler can surge; unset disables surge requests.
    pub deployment_name: Option<String>,
    pub console_api_url: String,
    pub pool_size: usize,
    pub scan_mount: String,
    pub enable_memory_check: bool,
    pub min_free_memory_mb: u64,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            state_store_url: state_store_url_from_env(),
            clamd_url: env_or("CLAMD_URL", defaults::DEFAULT_CLAMD_URL),
            queues: parse_queues(env::var("QUEUES").ok().as_deref()),
            node_id: env_or("HOSTNAME", "unknown-node"),
            deployment_name: env::var("DEPLOYMENT_NAME").ok().filter(|v| !v.is_empty()),
            console_api_url: env_or("CONSOLE_API_URL", defaults::DEFAULT_CONSOLE_API_URL),
            pool_size: env_parse("WORKER_POOL_SIZE", defaults::WORKER_POOL_SIZE),
            scan_mount: env_or("SCAN_MOUNT", "/tmp/gatescan"),
            enable_memory_check: parse_bool(env::var("ENABLE_MEMORY_CHECK").ok().as_deref()),
            min_free_memory_mb: env_parse("MIN_FREE_MEMORY_MB", 500),
        }
    }
}

/// `STATE_STORE_URL` wins; otherwise assemble `redis://host:port` from the
/// `REDIS_*` pair.
pub fn state_store_url_from_env() -> String {
    if let Ok(url) = env::var("STATE_STORE_URL") {
        if !url.is_empty() {
            return url;
        }
    }
    let host = env_or("REDIS_HOST", defaults::DEFAULT_REDIS_HOST);
    let port: u16 = env_parse("REDIS_PORT", defaults::DEFAULT_REDIS_PORT);
    format!("redis://{host}:{port}")
}

/// Comma-separated queue list; empty/missing falls back to the two scan queues.
pub fn parse_queues(raw: Option<&str>) -> Vec<String> {
    let parsed: Vec<String> = raw
        .unwrap_or("")
        .split(',')
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if parsed.is_empty() {
        vec![keys::QUEUE_PRIORITY.to_string(), keys::QUEUE_NORMAL.to_string()]
    } else {
        parsed
    }
}

pub fn parse_bool(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr + Copy>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_from_str<T: FromStr + Default>(var: &str) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_default_to_the_two_scan_queues() {
        assert_eq!(parse_queues(None), vec!["scan_priority", "scan_normal"]);
        assert_eq!(parse_queues(Some("")), vec!["scan_priority", "scan_normal"]);
    }

    #[test]
    fn queues_parse_comma_separated_with_whitespace() {
        assert_eq!(
            parse_queues(Some("scan_priority, scan_normal ,extra")),
            vec!["scan_priority", "scan_normal", "extra"]
        );
    }

    #[test]
    fn response_mode_parses_both_spellings() {
        assert_eq!(
            "fire-and-forget".parse::<ResponseMode>().unwrap(),
            ResponseMode::FireAndForget
        );
        assert_eq!(
            "fire_and_forget".parse::<ResponseMode>().unwrap(),
            ResponseMode::FireAndForget
        );
        assert_eq!("Blocking".parse::<ResponseMode>().unwrap(), ResponseMode::Blocking);
        assert!("neither".parse::<ResponseMode>().is_err());
    }

    #[test]
    fn flag_engine_parses() {
        assert_eq!(
            "flagsmith".parse::<FeatureFlagEngine>().unwrap(),
            FeatureFlagEngine::Flagsmith
        );
        assert_eq!(
            "envvar".parse::<FeatureFlagEngine>().unwrap(),
            FeatureFlagEngine::EnvVar
        );
    }

    #[test]
    fn bools_accept_common_truthy_values() {
        assert!(parse_bool(Some("true")));
        assert!(parse_bool(Some("1")));
        assert!(!parse_bool(Some("false")));
        assert!(!parse_bool(None));
    }
}
