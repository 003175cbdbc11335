//! Per-session scan workflow: prepare, dispatch, handshake, result.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{error, info, warn};

use gatescan_protocol::{defaults, Priority, ScanMode, ScanOutcome, StreamId};
use gatescan_state::{SharedStore, StoreError, StreamProvider};

use crate::adapter::ScanAdapter;

#[derive(Debug, Clone)]
struct SessionData {
    start_ns: u64,
    tenant_id: String,
    client_ip: String,
}

/// Orchestrates the lifecycle of individual scan sessions. The session map is
/// the only mutable producer-side state; entries leave it on result or
/// cancellation.
pub struct ScanOrchestrator {
    adapter: ScanAdapter,
    store: SharedStore,
    sessions: Mutex<HashMap<StreamId, SessionData>>,
}

impl ScanOrchestrator {
    pub fn new(adapter: ScanAdapter, store: SharedStore) -> Self {
        Self {
            adapter,
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<StreamId, SessionData>> {
        self.sessions.lock().expect("session map lock poisoned")
    }

    /// Mint a new session and its byte-pipe writer.
    pub fn prepare_session(
        &self,
        tenant_id: &str,
        client_ip: &str,
    ) -> (StreamId, StreamProvider) {
        let stream_id = StreamId::mint();
        self.lock_sessions().insert(
            stream_id,
            SessionData {
                start_ns: crate::epoch_nanos(),
                tenant_id: tenant_id.to_string(),
                client_ip: client_ip.to_string(),
            },
        );
        let provider = StreamProvider::new(self.store.clone(), stream_id);
        (stream_id, provider)
    }

    /// Enqueue the job unless the predictive bypass trips. Returns whether a
    /// scan was dispatched; on `false` the caller proceeds unscanned.
    pub async fn dispatch_scan(
        &self,
        stream_id: StreamId,
        priority: Priority,
        tenant_id: &str,
    ) -> Result<bool, StoreError> {
        let last_tat = self.adapter.get_last_tat(priority).await;
        if last_tat > defaults::PREDICTIVE_BYPASS_TAT_SECS {
            warn!(
                "congestion bypass (predictive): {stream_id} skipped, last TAT {last_tat:.1}s"
            );
            return Ok(false);
        }

        let (start_ns, client_ip) = {
            let sessions = self.lock_sessions();
            match sessions.get(&stream_id) {
                Some(data) => (data.start_ns, data.client_ip.clone()),
                None => (crate::epoch_nanos(), "unknown".to_string()),
            }
        };
        self.adapter
            .enqueue_task(
                stream_id,
                ScanMode::Stream,
                start_ns,
                tenant_id,
                priority,
                &client_ip,
            )
            .await?;
        Ok(true)
    }

    /// Block until a worker picks the job up. `false` means bypass.
    pub async fn await_handshake(&self, stream_id: StreamId) -> bool {
        let timeout = Duration::from_secs(defaults::HANDSHAKE_TIMEOUT_SECS);
        match self.adapter.wait_for_ack(stream_id, timeout).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("handshake failed (timeout): {stream_id} was not picked up");
                false
            }
            Err(err) => {
                error!("handshake failed (store): {stream_id}: {err}");
                false
            }
        }
    }

    /// Record how long ingestion took, for operator diagnostics.
    pub async fn finalize_ingest(&self, stream_id: StreamId) {
        let start_ns = {
            let sessions = self.lock_sessions();
            sessions.get(&stream_id).map(|data| data.start_ns)
        };
        if let Some(start_ns) = start_ns {
            let duration_ms = (crate::epoch_nanos().saturating_sub(start_ns)) as f64 / 1e6;
            self.adapter
                .record_ingest_metrics(stream_id, duration_ms)
                .await;
        }
    }

    /// Wait for the published result; timeouts and decode failures surface as
    /// an ERROR outcome, never as a hang.
    pub async fn get_result(&self, stream_id: StreamId) -> ScanOutcome {
        let timeout = Duration::from_secs(defaults::RESULT_TIMEOUT_SECS);
        let raw = self.adapter.wait_for_result(stream_id, timeout).await;
        let session = self.lock_sessions().remove(&stream_id);

        let (tenant_id, total_tat_ms) = match &session {
            Some(data) => (
                data.tenant_id.clone(),
                (crate::epoch_nanos().saturating_sub(data.start_ns)) as f64 / 1e6,
            ),
            None => ("unknown".to_string(), 0.0),
        };

        match raw {
            Ok(Some(payload)) => match ScanOutcome::decode(&payload) {
                Ok(outcome) => {
                    info!(
                        "scan completed: {stream_id} (tenant {tenant_id}, status {}, tat {total_tat_ms:.1}ms)",
                        outcome.status.as_str()
                    );
                    outcome
                }
                Err(err) => {
                    error!("result decode failed for {stream_id}: {err}");
                    ScanOutcome::error(stream_id, "result decode failed")
                }
            },
            Ok(None) => {
                error!(
                    "scan timeout: {stream_id} (tenant {tenant_id}, tat {total_tat_ms:.1}ms)"
                );
                ScanOutcome::error(stream_id, "timeout")
            }
            Err(err) => {
                error!("result wait failed for {stream_id}: {err}");
                ScanOutcome::error(stream_id, err.to_string())
            }
        }
    }

    /// Drop a session that will never produce a result (disconnect, bypass).
    pub fn cancel_session(&self, stream_id: StreamId) {
        self.lock_sessions().remove(&stream_id);
    }

    pub fn active_sessions(&self) -> usize {
        self.lock_sessions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatescan_protocol::{keys, ScanStatus};
    use gatescan_state::MemoryStore;
    use std::sync::Arc;

    fn orchestrator() -> (Arc<ScanOrchestrator>, SharedStore) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        (
            Arc::new(ScanOrchestrator::new(
                ScanAdapter::new(store.clone()),
                store.clone(),
            )),
            store,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn predictive_bypass_skips_enqueue() {
        let (orchestrator, store) = orchestrator();
        store
            .set(keys::TAT_HIGH_LAST, b"301000", None, false)
            .await
            .unwrap();

        let (id, _provider) = orchestrator.prepare_session("tenant", "ip");
        let dispatched = orchestrator
            .dispatch_scan(id, Priority::High, "tenant")
            .await
            .unwrap();
        assert!(!dispatched);

        // No job reached either queue.
        let popped = store
            .pop(
                &[keys::QUEUE_PRIORITY.to_string(), keys::QUEUE_NORMAL.to_string()],
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_tier_dispatches_and_handshakes() {
        let (orchestrator, store) = orchestrator();
        let (id, _provider) = orchestrator.prepare_session("tenant", "ip");
        assert!(orchestrator
            .dispatch_scan(id, Priority::Low, "tenant")
            .await
            .unwrap());

        // A worker picks the job up and ACKs.
        let worker_store = store.clone();
        tokio::spawn(async move {
            let (_, raw) = worker_store
                .pop(&[keys::QUEUE_NORMAL.to_string()], Duration::from_secs(5))
                .await
                .unwrap()
                .unwrap();
            let job = gatescan_protocol::JobMetadata::decode(&raw).unwrap();
            worker_store.push(&keys::ack(job.stream_id), b"1").await.unwrap();
        });

        assert!(orchestrator.await_handshake(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeout_reports_bypass() {
        let (orchestrator, _store) = orchestrator();
        let (id, _provider) = orchestrator.prepare_session("tenant", "ip");
        // No worker exists; the full handshake window lapses.
        assert!(!orchestrator.await_handshake(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn result_timeout_yields_error_and_clears_the_session() {
        let (orchestrator, _store) = orchestrator();
        let (id, _provider) = orchestrator.prepare_session("tenant", "ip");
        let outcome = orchestrator.get_result(id).await;
        assert_eq!(outcome.status, ScanStatus::Error);
        assert_eq!(orchestrator.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn published_results_decode() {
        let (orchestrator, store) = orchestrator();
        let (id, _provider) = orchestrator.prepare_session("tenant", "ip");
        let published = ScanOutcome {
            status: ScanStatus::Clean,
            virus: None,
            stream_id: id,
            detail: None,
            data_key: None,
            metrics: None,
        };
        store.push(&keys::result(id), &published.encode()).await.unwrap();

        let outcome = orchestrator.get_result(id).await;
        assert_eq!(outcome.status, ScanStatus::Clean);
        assert_eq!(outcome.stream_id, id);
    }
}
