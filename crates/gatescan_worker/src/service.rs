//! Scanner task service: the lifecycle of one drained job.
//!
//! ACK first (the producer is blocking on it), then stream the session's
//! bytes through the engine, publish the outcome, and record metrics. The
//! infection webhook is fire-and-forget; its failure never touches the scan
//! result.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use gatescan_protocol::config::WorkerConfig;
use gatescan_protocol::{
    defaults, keys, size_class, JobMetadata, OutcomeMetrics, Priority, ScanOutcome, ScanStatus,
    StreamId,
};
use gatescan_state::{make_provider, SharedStore};

use crate::engine::EngineClient;
use crate::metrics;

pub struct ScannerTaskService {
    store: SharedStore,
    engine: Arc<EngineClient>,
    config: Arc<WorkerConfig>,
    http: reqwest::Client,
}

impl ScannerTaskService {
    pub fn new(store: SharedStore, engine: Arc<EngineClient>, config: Arc<WorkerConfig>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::WEBHOOK_TIMEOUT_SECS))
            .build()
            .expect("webhook client builds");
        Self {
            store,
            engine,
            config,
            http,
        }
    }

    /// Process one raw queue payload drained from `queue`.
    pub async fn process(self: &Arc<Self>, queue: &str, raw: &[u8]) {
        let job = match JobMetadata::decode(raw) {
            Ok(job) => job,
            Err(err) => {
                error!("dropping malformed job from {queue}: {err}");
                return;
            }
        };
        let picked_up_at = crate::epoch_seconds();
        if let Err(err) = self.send_ack(job.stream_id).await {
            // The producer will bypass on handshake timeout; nothing to scan
            // for without it ever learning our pickup.
            error!("ack push failed for {}: {err}", job.stream_id);
            return;
        }

        let mem_before = self.free_memory_mb();
        let scan_started = std::time::Instant::now();
        let mut provider = make_provider(job.mode, self.store.clone(), job.stream_id);
        let scanned = self.engine.scan(provider.as_mut()).await;
        let scan_ms = scan_started.elapsed().as_secs_f64() * 1000.0;
        let finished_at = crate::epoch_seconds();

        let wait_tat_s = (picked_up_at - job.enqueued_at).max(0.0);
        let process_tat_s = finished_at - picked_up_at;
        let total_tat_s = (finished_at - job.enqueued_at).max(0.0);

        let outcome = match scanned {
            Ok(verdict) => {
                let class = size_class(verdict.bytes_scanned);
                if let Some(before) = mem_before {
                    if let Some(after) = self.free_memory_mb() {
                        info!(
                            "scan done {}: {scan_ms:.1}ms, virus={}, mem_delta={:.0}MB, tenant={}",
                            job.stream_id,
                            verdict.is_virus,
                            before - after,
                            job.tenant_id
                        );
                    }
                } else {
                    info!(
                        "scan done {}: {scan_ms:.1}ms, virus={}, tenant={}",
                        job.stream_id, verdict.is_virus, job.tenant_id
                    );
                }
                ScanOutcome {
                    status: if verdict.is_virus {
                        ScanStatus::Infected
                    } else {
                        ScanStatus::Clean
                    },
                    virus: verdict.is_virus.then(|| verdict.report.clone()),
                    stream_id: job.stream_id,
                    detail: None,
                    data_key: (!verdict.is_virus)
                        .then(|| keys::verified(job.stream_id)),
                    metrics: Some(OutcomeMetrics {
                        scan_ms,
                        wait_tat_s,
                        process_tat_s,
                        total_tat_s,
                        bytes_scanned: verdict.bytes_scanned,
                        size_class: class.to_string(),
                    }),
                }
            }
            Err(err) => {
                error!("engine scan failed for {}: {err}", job.stream_id);
                ScanOutcome::error(job.stream_id, err.to_string())
            }
        };

        self.publish_outcome(&outcome).await;
        self.record_metrics(&outcome, wait_tat_s, process_tat_s, total_tat_s, scan_ms);

        if let Some(virus) = outcome.virus.clone() {
            let service = Arc::clone(self);
            let job = job.clone();
            tokio::spawn(async move {
                service.notify_console(&job, &virus).await;
            });
        }

        // Feed the predictive bypass with the freshest end-to-end TAT.
        let tat_key = Priority::from_queue(queue).tat_key();
        let total_tat_ms = total_tat_s * 1000.0;
        if let Err(err) = self
            .store
            .set(tat_key, total_tat_ms.to_string().as_bytes(), None, false)
            .await
        {
            warn!("failed to record {tat_key}: {err}");
        }
    }

    /// Handshake: the producer observes this before any byte is read.
    async fn send_ack(&self, stream_id: StreamId) -> Result<(), gatescan_state::StoreError> {
        let ack_key = keys::ack(stream_id);
        self.store.push(&ack_key, b"1").await?;
        self.store
            .expire(&ack_key, Duration::from_secs(defaults::ACK_TTL_SECS))
            .await
    }

    async fn publish_outcome(&self, outcome: &ScanOutcome) {
        let result_key = keys::result(outcome.stream_id);
        if let Err(err) = self.store.push(&result_key, &outcome.encode()).await {
            error!("failed to publish result for {}: {err}", outcome.stream_id);
            return;
        }
        if let Err(err) = self
            .store
            .expire(&result_key, Duration::from_secs(defaults::RESULT_TTL_SECS))
            .await
        {
            warn!("failed to bound result ttl for {}: {err}", outcome.stream_id);
        }
    }

    fn record_metrics(
        &self,
        outcome: &ScanOutcome,
        wait_tat_s: f64,
        process_tat_s: f64,
        total_tat_s: f64,
        scan_ms: f64,
    ) {
        metrics::SCAN_RESULTS
            .with_label_values(&[match outcome.status {
                ScanStatus::Clean => "clean",
                ScanStatus::Infected => "infected",
                ScanStatus::Error => "error",
            }])
            .inc();
        metrics::WAIT_TAT_SECONDS.observe(wait_tat_s);
        metrics::PROCESS_TAT_SECONDS.observe(process_tat_s);
        metrics::TOTAL_TAT_SECONDS.observe(total_tat_s);
        metrics::SCAN_DURATION_SECONDS.observe(scan_ms / 1000.0);
        if let Some(observed) = &outcome.metrics {
            metrics::BYTES_SCANNED
                .with_label_values(&[observed.size_class.as_str()])
                .observe(observed.bytes_scanned as f64);
        }
    }

    async fn notify_console(&self, job: &JobMetadata, virus: &str) {
        let url = format!("{}/api/webhooks/virus-scan", self.config.console_api_url);
        let payload = json!({
            "tenant_id": job.tenant_id,
            "client_ip": job.client_ip,
            "virus_name": virus,
            "task_id": job.stream_id.to_string(),
            "status": "INFECTED",
        });
        match self.http.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("infection webhook delivered for {}", job.stream_id);
            }
            Ok(response) => {
                warn!(
                    "infection webhook for {} answered {}",
                    job.stream_id,
                    response.status()
                );
            }
            Err(err) => error!("infection webhook for {} failed: {err}", job.stream_id),
        }
    }

    /// Free memory in MB, when the memory check is enabled.
    fn free_memory_mb(&self) -> Option<f64> {
        if !self.config.enable_memory_check {
            return None;
        }
        read_mem_available_mb()
    }
}

/// MemAvailable from /proc/meminfo.
#[cfg(target_os = "linux")]
fn read_mem_available_mb() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: f64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb / 1024.0);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn read_mem_available_mb() -> Option<f64> {
    None
}
