//! Clean-URL cache, infection block list and domain policy.

use std::time::Duration;

use tracing::debug;

use gatescan_protocol::{defaults, keys, Priority};
use gatescan_state::{SharedStore, StoreError};

/// Domain policy: notable-registry classification and plan mapping.
///
/// Automatic bypass is disabled; the classifier only labels metrics, it never
/// makes a security decision.
pub struct BypassPolicy {
    notable_domains: Vec<(&'static str, &'static str)>,
}

const NOTABLE_DOMAIN_MAP: &[(&str, &str)] = &[
    ("pypi.org", "python"),
    ("files.pythonhosted.org", "python"),
    ("registry.npmjs.org", "node"),
    ("repo.maven.apache.org", "java"),
    ("github.com", "github"),
    ("objects.githubusercontent.com", "github"),
    ("get.docker.com", "docker"),
    ("registry-1.docker.io", "docker"),
    ("quay.io", "docker"),
    ("gcr.io", "docker"),
    ("ghcr.io", "docker"),
    ("registry.k8s.io", "docker"),
];

impl Default for BypassPolicy {
    fn default() -> Self {
        Self {
            notable_domains: NOTABLE_DOMAIN_MAP.to_vec(),
        }
    }
}

impl BypassPolicy {
    /// Category of the URI when it matches a known registry.
    pub fn get_notable_type(&self, uri: &str) -> Option<&'static str> {
        self.notable_domains
            .iter()
            .find(|(domain, _)| uri.contains(domain))
            .map(|(_, category)| *category)
    }

    /// Policy-level bypass is disabled; only cache hits skip scanning.
    pub fn should_bypass(&self, _uri: &str) -> bool {
        false
    }
}

/// Cache lookups and plan→priority mapping over the shared store.
pub struct IntelligentCache {
    store: SharedStore,
    policy: BypassPolicy,
}

impl IntelligentCache {
    pub fn new(store: SharedStore, policy: BypassPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &BypassPolicy {
        &self.policy
    }

    /// Scan tier for a tenant's plan value.
    pub fn check_priority(&self, plan: &str) -> Priority {
        match plan {
            "premium" | "enterprise" | "business" => Priority::High,
            _ => Priority::Low,
        }
    }

    /// Whether scanning can be skipped for this URI.
    pub async fn check_cache(&self, uri: &str) -> Result<bool, StoreError> {
        if self.policy.should_bypass(uri) {
            debug!("policy bypass for {uri}");
            return Ok(true);
        }
        self.store.exists(&keys::clean_cache(uri)).await
    }

    /// Persist a clean verdict. Callers gate this on cacheable methods.
    pub async fn store_cache(&self, uri: &str) -> Result<(), StoreError> {
        self.store
            .set(
                &keys::clean_cache(uri),
                b"1",
                Some(Duration::from_secs(defaults::CLEAN_CACHE_TTL_SECS)),
                false,
            )
            .await?;
        Ok(())
    }

    /// Whether a previous scan flagged this URI as infected.
    pub async fn check_block(&self, uri: &str) -> Result<bool, StoreError> {
        self.store.exists(&keys::block_cache(uri)).await
    }

    /// Record an infected verdict for subsequent requests
    /// (fire-and-forget response mode).
    pub async fn store_block(&self, uri: &str) -> Result<(), StoreError> {
        self.store
            .set(
                &keys::block_cache(uri),
                b"1",
                Some(Duration::from_secs(defaults::CLEAN_CACHE_TTL_SECS)),
                false,
            )
            .await?;
        Ok(())
    }
}
