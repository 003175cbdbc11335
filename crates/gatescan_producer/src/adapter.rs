//! Anti-corruption layer between the orchestrator and the raw store.
//!
//! The orchestrator thinks in sessions and handshakes; this adapter owns the
//! queue names, key formats and blocking-pop plumbing.

use std::time::Duration;

use tracing::warn;

use gatescan_protocol::{defaults, keys, JobMetadata, Priority, ScanMode, StreamId};
use gatescan_state::{SharedStore, StoreError};

pub struct ScanAdapter {
    store: SharedStore,
}

impl ScanAdapter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Compose a job record and push it onto the tier's queue.
    pub async fn enqueue_task(
        &self,
        stream_id: StreamId,
        mode: ScanMode,
        start_ns: u64,
        tenant_id: &str,
        priority: Priority,
        client_ip: &str,
    ) -> Result<(), StoreError> {
        let job = JobMetadata {
            stream_id,
            priority,
            enqueued_at: start_ns as f64 / 1e9,
            mode,
            tenant_id: tenant_id.to_string(),
            client_ip: client_ip.to_string(),
        };
        self.store.push(priority.queue(), &job.encode()).await
    }

    /// Block until a worker signals pickup, or the handshake window lapses.
    pub async fn wait_for_ack(
        &self,
        stream_id: StreamId,
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        let popped = self.store.pop(&[keys::ack(stream_id)], timeout).await?;
        Ok(popped.is_some())
    }

    /// Block until the worker publishes the session's result record.
    pub async fn wait_for_result(
        &self,
        stream_id: StreamId,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let popped = self.store.pop(&[keys::result(stream_id)], timeout).await?;
        Ok(popped.map(|(_, payload)| payload))
    }

    /// Last fully-observed TAT for the tier, in seconds. Missing or garbled
    /// values read as zero (no congestion signal).
    pub async fn get_last_tat(&self, priority: Priority) -> f64 {
        let raw = match self.store.get(priority.tat_key()).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!("failed to read {}: {err}", priority.tat_key());
                return 0.0;
            }
        };
        raw.and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map(|ms| ms / 1000.0)
            .unwrap_or(0.0)
    }

    /// Record the ingest duration for operator diagnostics.
    pub async fn record_ingest_metrics(&self, stream_id: StreamId, duration_ms: f64) {
        let outcome = self
            .store
            .set(
                &keys::ingest_metric(stream_id),
                duration_ms.to_string().as_bytes(),
                Some(Duration::from_secs(defaults::INGEST_METRIC_TTL_SECS)),
                false,
            )
            .await;
        if let Err(err) = outcome {
            warn!("failed to record ingest metrics for {stream_id}: {err}");
        }
    }
}
