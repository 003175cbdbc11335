//! End-to-end worker pipeline tests against the in-memory store and the
//! INSTREAM daemon stub.

mod support;

use std::sync::Arc;
use std::time::Duration;

use gatescan_protocol::config::WorkerConfig;
use gatescan_protocol::{keys, JobMetadata, Priority, ScanMode, ScanOutcome, ScanStatus, StreamId};
use gatescan_state::provider::DataProvider;
use gatescan_state::{MemoryStore, SharedStore, StreamProvider};
use gatescan_worker::{EngineClient, ScannerTaskService};

fn test_config(store_url: &str, clamd_url: &str) -> Arc<WorkerConfig> {
    Arc::new(WorkerConfig {
        state_store_url: store_url.to_string(),
        clamd_url: clamd_url.to_string(),
        queues: vec![keys::QUEUE_PRIORITY.into(), keys::QUEUE_NORMAL.into()],
        node_id: "test-node".into(),
        deployment_name: None,
        // Nothing listens here; webhook failures must stay non-fatal.
        console_api_url: "http://127.0.0.1:9".into(),
        pool_size: 5,
        scan_mount: "/tmp/gatescan".into(),
        enable_memory_check: false,
        min_free_memory_mb: 500,
    })
}

fn service_over(store: &SharedStore, clamd_url: &str) -> Arc<ScannerTaskService> {
    let engine = Arc::new(EngineClient::new(clamd_url).unwrap());
    Arc::new(ScannerTaskService::new(
        store.clone(),
        engine,
        test_config("memory://", clamd_url),
    ))
}

fn now_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

fn job_for(id: StreamId, priority: Priority) -> JobMetadata {
    JobMetadata {
        stream_id: id,
        priority,
        enqueued_at: now_epoch(),
        mode: ScanMode::Stream,
        tenant_id: "tenant-a".into(),
        client_ip: "10.1.2.3".into(),
    }
}

async fn upload(store: &SharedStore, id: StreamId, body: &[u8]) {
    let mut writer = StreamProvider::new(store.clone(), id);
    writer.push_chunk(body.to_vec()).await.unwrap();
    writer.finalize_push().await.unwrap();
}

async fn pop_outcome(store: &SharedStore, id: StreamId) -> ScanOutcome {
    let (_, raw) = store
        .pop(&[keys::result(id)], Duration::from_secs(5))
        .await
        .unwrap()
        .expect("result published");
    ScanOutcome::decode(&raw).unwrap()
}

#[tokio::test]
async fn clean_scan_publishes_result_ack_and_tat() {
    let stub = support::spawn_stub_engine().await;
    let store: SharedStore = Arc::new(MemoryStore::new());
    let service = service_over(&store, &stub.url);

    let id = StreamId::mint();
    upload(&store, id, b"hello").await;
    service
        .process(keys::QUEUE_PRIORITY, &job_for(id, Priority::High).encode())
        .await;

    // Handshake was published before any byte was read.
    let ack = store
        .pop(&[keys::ack(id)], Duration::from_millis(100))
        .await
        .unwrap();
    assert!(ack.is_some(), "ack must be pushed on pickup");

    let outcome = pop_outcome(&store, id).await;
    assert_eq!(outcome.status, ScanStatus::Clean);
    assert_eq!(outcome.virus, None);
    let metrics = outcome.metrics.expect("metrics attached");
    assert_eq!(metrics.bytes_scanned, 5);
    assert_eq!(metrics.size_class, "tiny");
    assert!(metrics.total_tat_s >= metrics.process_tat_s);

    // Verified replay survives a clean scan and is advertised.
    assert_eq!(outcome.data_key.as_deref(), Some(keys::verified(id).as_str()));
    assert!(store.exists(&keys::verified(id)).await.unwrap());

    // The predictive bypass feed was refreshed for the drained tier.
    let tat = store.get(keys::TAT_HIGH_LAST).await.unwrap().unwrap();
    let tat_ms: f64 = String::from_utf8(tat).unwrap().parse().unwrap();
    assert!(tat_ms >= 0.0);
}

#[tokio::test]
async fn eicar_body_publishes_infected_and_drops_the_replay() {
    let stub = support::spawn_stub_engine().await;
    let store: SharedStore = Arc::new(MemoryStore::new());
    let service = service_over(&store, &stub.url);

    let id = StreamId::mint();
    upload(&store, id, support::EICAR_BODY).await;
    service
        .process(keys::QUEUE_NORMAL, &job_for(id, Priority::Low).encode())
        .await;

    let outcome = pop_outcome(&store, id).await;
    assert_eq!(outcome.status, ScanStatus::Infected);
    assert!(outcome.virus.as_deref().unwrap().contains("FOUND"));
    assert!(outcome.data_key.is_none());
    assert!(!store.exists(&keys::verified(id)).await.unwrap());

    let tat = store.get(keys::TAT_NORMAL_LAST).await.unwrap();
    assert!(tat.is_some());
}

#[tokio::test]
async fn malformed_job_is_dropped_without_output() {
    let stub = support::spawn_stub_engine().await;
    let store: SharedStore = Arc::new(MemoryStore::new());
    let service = service_over(&store, &stub.url);

    service.process(keys::QUEUE_NORMAL, b"not json at all").await;
    service
        .process(keys::QUEUE_NORMAL, br#"{"priority":"low"}"#)
        .await;
    // Nothing to scan, nothing published; the loop just moves on.
    assert!(store
        .pop(&[keys::TAT_NORMAL_LAST.to_string()], Duration::from_millis(50))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn unreachable_engine_publishes_an_error_outcome() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    // Port 9 (discard) is almost certainly closed.
    let service = service_over(&store, "tcp://127.0.0.1:9");

    let id = StreamId::mint();
    upload(&store, id, b"payload").await;
    service
        .process(keys::QUEUE_PRIORITY, &job_for(id, Priority::High).encode())
        .await;

    let outcome = pop_outcome(&store, id).await;
    assert_eq!(outcome.status, ScanStatus::Error);
    assert!(outcome.detail.is_some());
}

#[tokio::test]
async fn whole_body_streams_through_in_chunks() {
    let stub = support::spawn_stub_engine().await;
    let store: SharedStore = Arc::new(MemoryStore::new());
    let service = service_over(&store, &stub.url);

    let id = StreamId::mint();
    let mut writer = StreamProvider::new(store.clone(), id);
    let mut expected = 0u64;
    for i in 0..10u8 {
        let chunk = vec![i; 1000];
        expected += chunk.len() as u64;
        writer.push_chunk(chunk).await.unwrap();
    }
    writer.finalize_push().await.unwrap();

    service
        .process(keys::QUEUE_PRIORITY, &job_for(id, Priority::High).encode())
        .await;

    let outcome = pop_outcome(&store, id).await;
    assert_eq!(outcome.status, ScanStatus::Clean);
    assert_eq!(outcome.metrics.unwrap().bytes_scanned, expected);
}
