//! Gatescan producer.
//!
//! Terminates the Envoy external-processor stream: decides per session
//! whether traffic is clean, infected, cache-hit or bypassed, while body
//! bytes stream through the shared byte pipe to a scan worker. Also serves
//! on-demand SDS certificates so the proxy can terminate TLS per SNI.

pub mod adapter;
pub mod cache;
pub mod extproc;
pub mod flags;
pub mod metrics;
pub mod orchestrator;
pub mod sds;

pub use adapter::ScanAdapter;
pub use cache::{BypassPolicy, IntelligentCache};
pub use extproc::{ExtProcService, ProducerCore};
pub use flags::{build_flags, FeatureFlags};
pub use orchestrator::ScanOrchestrator;
pub use sds::{CertAuthority, SdsService};

/// Nanoseconds since the Unix epoch.
pub(crate) fn epoch_nanos() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
