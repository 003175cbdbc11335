//! Gatescan scan worker.
//!
//! Drains the scan queues in a 4:1 priority shape, ACKs job pickup back to
//! the producer, streams session bytes through the INSTREAM engine and
//! publishes results, all through the shared state store. A coordinator
//! tick keeps the cluster registry fresh and performs zero-downtime
//! signature reloads.

pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod metrics;
pub mod service;

pub use coordinator::ClusterCoordinator;
pub use dispatcher::WorkerPool;
pub use engine::{EngineClient, EngineError, ScanVerdict};
pub use service::ScannerTaskService;

use gatescan_protocol::keys;
use gatescan_state::SharedStore;

/// Bump `target_epoch` (and its updated-at marker) to trigger a coordinated
/// signature reload across the fleet. With `epoch = None` the current target
/// is incremented; pinning the same epoch twice is a no-op for the fleet.
pub async fn set_target_epoch(
    store: &SharedStore,
    epoch: Option<u64>,
) -> anyhow::Result<u64> {
    let new_epoch = match epoch {
        Some(value) => value,
        None => {
            let current = store
                .get(keys::TARGET_EPOCH)
                .await?
                .and_then(|raw| String::from_utf8(raw).ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(0);
            current + 1
        }
    };
    store
        .set(keys::TARGET_EPOCH, new_epoch.to_string().as_bytes(), None, false)
        .await?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    store
        .set(
            keys::TARGET_EPOCH_UPDATED_AT,
            now.to_string().as_bytes(),
            None,
            false,
        )
        .await?;
    Ok(new_epoch)
}

/// Seconds since the Unix epoch as a float, the timestamp format every
/// queue record uses.
pub(crate) fn epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
