//! Tenant-priority feature flags.
//!
//! The identity-flags service owns the `scan_plan` value; lookups that fail
//! for any reason default to normal priority and never block a session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use gatescan_protocol::config::{FeatureFlagEngine, ProducerConfig};
use gatescan_protocol::Priority;

use crate::cache::IntelligentCache;

#[async_trait]
pub trait FeatureFlags: Send + Sync {
    /// Whether the tenant scans on the high-priority queue.
    async fn get_priority(&self, tenant_id: &str) -> bool;
}

/// Static provider driven by `SCAN_PRIORITY`.
pub struct EnvVarFlags;

#[async_trait]
impl FeatureFlags for EnvVarFlags {
    async fn get_priority(&self, _tenant_id: &str) -> bool {
        std::env::var("SCAN_PRIORITY")
            .map(|v| v.eq_ignore_ascii_case("high"))
            .unwrap_or(false)
    }
}

/// Identity-flags lookup against a Flagsmith-style API. The `scan_plan`
/// value maps onto a tier through the cache service's plan mapping.
pub struct FlagsmithFlags {
    http: reqwest::Client,
    api_url: String,
    env_key: Option<String>,
    cache: Arc<IntelligentCache>,
}

#[derive(Deserialize)]
struct IdentityFlagsResponse {
    #[serde(default)]
    flags: Vec<FlagEntry>,
}

#[derive(Deserialize)]
struct FlagEntry {
    feature: FeatureRef,
    #[serde(default)]
    feature_state_value: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct FeatureRef {
    name: String,
}

impl FlagsmithFlags {
    pub fn new(api_url: String, env_key: Option<String>, cache: Arc<IntelligentCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("flags client builds");
        Self {
            http,
            api_url,
            env_key,
            cache,
        }
    }

    async fn lookup_plan(&self, tenant_id: &str) -> Result<Option<String>, reqwest::Error> {
        let url = format!(
            "{}/identities/?identifier={tenant_id}",
            self.api_url.trim_end_matches('/')
        );
        let mut request = self.http.get(&url);
        if let Some(key) = &self.env_key {
            request = request.header("X-Environment-Key", key);
        }
        let response: IdentityFlagsResponse =
            request.send().await?.error_for_status()?.json().await?;
        Ok(response
            .flags
            .into_iter()
            .find(|entry| entry.feature.name == "scan_plan")
            .and_then(|entry| entry.feature_state_value)
            .and_then(|value| value.as_str().map(str::to_string)))
    }
}

#[async_trait]
impl FeatureFlags for FlagsmithFlags {
    async fn get_priority(&self, tenant_id: &str) -> bool {
        match self.lookup_plan(tenant_id).await {
            Ok(Some(plan)) => {
                let priority = self.cache.check_priority(&plan) == Priority::High;
                info!("flags result for {tenant_id}: plan={plan}, priority={priority}");
                priority
            }
            Ok(None) => false,
            Err(err) => {
                warn!("flags query failed for {tenant_id}, defaulting to normal: {err}");
                false
            }
        }
    }
}

/// Build the configured provider.
pub fn build_flags(
    config: &ProducerConfig,
    cache: &Arc<IntelligentCache>,
) -> Arc<dyn FeatureFlags> {
    match config.flag_engine {
        FeatureFlagEngine::Flagsmith => match &config.flagsmith_api_url {
            Some(api_url) => Arc::new(FlagsmithFlags::new(
                api_url.clone(),
                config.flagsmith_env_key.clone(),
                Arc::clone(cache),
            )),
            None => {
                warn!("FEATURE_FLAG_ENGINE=flagsmith without FLAGSMITH_API_URL; using envvar");
                Arc::new(EnvVarFlags)
            }
        },
        FeatureFlagEngine::EnvVar => Arc::new(EnvVarFlags),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BypassPolicy;
    use gatescan_protocol::config::ResponseMode;
    use gatescan_state::MemoryStore;

    fn test_cache() -> Arc<IntelligentCache> {
        Arc::new(IntelligentCache::new(
            Arc::new(MemoryStore::new()),
            BypassPolicy::default(),
        ))
    }

    fn config_with(engine: FeatureFlagEngine, api_url: Option<&str>) -> ProducerConfig {
        ProducerConfig {
            state_store_url: "memory://".to_string(),
            grpc_port: 50051,
            tenant_id: "tenant-test".to_string(),
            response_mode: ResponseMode::Blocking,
            flag_engine: engine,
            scan_file_threshold_mb: 10,
            ca_cert_path: None,
            ca_key_path: None,
            sds_cache_max_size: 16,
            sds_cache_ttl_secs: 3600,
            flagsmith_api_url: api_url.map(str::to_string),
            flagsmith_env_key: None,
        }
    }

    #[test]
    fn build_flags_constructs_every_engine() {
        let cache = test_cache();
        build_flags(&config_with(FeatureFlagEngine::EnvVar, None), &cache);
        build_flags(
            &config_with(FeatureFlagEngine::Flagsmith, Some("http://flags.internal")),
            &cache,
        );
        // Flagsmith without an API URL degrades to the env-var provider.
        build_flags(&config_with(FeatureFlagEngine::Flagsmith, None), &cache);
    }

    /// One-shot identity-flags endpoint answering with a fixed plan.
    async fn spawn_flags_stub(plan: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = format!(
            r#"{{"flags":[{{"feature":{{"name":"scan_plan"}},"feature_state_value":"{plan}"}}]}}"#
        );
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn flagsmith_maps_plans_through_the_cache_service() {
        let api_url = spawn_flags_stub("enterprise").await;
        let flags = FlagsmithFlags::new(api_url, None, test_cache());
        assert!(flags.get_priority("tenant-x").await);

        let api_url = spawn_flags_stub("free").await;
        let flags = FlagsmithFlags::new(api_url, None, test_cache());
        assert!(!flags.get_priority("tenant-x").await);
    }

    #[tokio::test]
    async fn flagsmith_lookup_failure_defaults_to_normal() {
        // Nothing listens on the discard port; the session must not block.
        let flags = FlagsmithFlags::new("http://127.0.0.1:9".to_string(), None, test_cache());
        assert!(!flags.get_priority("tenant-x").await);
    }
}
