//! INSTREAM wire-protocol tests against the daemon stub.

mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use gatescan_state::provider::DataProvider;
use gatescan_state::InlineProvider;
use gatescan_worker::EngineClient;

#[tokio::test]
async fn clean_body_streams_and_counts_bytes() {
    let stub = support::spawn_stub_engine().await;
    let client = EngineClient::new(&stub.url).unwrap();

    // Large enough to span multiple 4096-byte frames.
    let mut provider = InlineProvider::with_data(vec![0x42; 9_000]);
    let verdict = client.scan(&mut provider).await.unwrap();
    assert!(!verdict.is_virus);
    assert!(verdict.report.is_empty());
    assert_eq!(verdict.bytes_scanned, 9_000);
}

#[tokio::test]
async fn eicar_body_reports_found() {
    let stub = support::spawn_stub_engine().await;
    let client = EngineClient::new(&stub.url).unwrap();

    let mut provider = InlineProvider::with_data(support::EICAR_BODY.to_vec());
    let verdict = client.scan(&mut provider).await.unwrap();
    assert!(verdict.is_virus);
    assert!(verdict.report.contains("FOUND"));
    assert_eq!(verdict.bytes_scanned, support::EICAR_BODY.len() as u64);
}

#[tokio::test]
async fn empty_body_scans_clean() {
    let stub = support::spawn_stub_engine().await;
    let client = EngineClient::new(&stub.url).unwrap();

    let mut provider = InlineProvider::default();
    let verdict = client.scan(&mut provider).await.unwrap();
    assert!(!verdict.is_virus);
    assert_eq!(verdict.bytes_scanned, 0);
}

#[tokio::test]
async fn ping_answers_pong() {
    let stub = support::spawn_stub_engine().await;
    let client = EngineClient::new(&stub.url).unwrap();
    assert!(client.ping().await.unwrap());
}

#[tokio::test]
async fn reload_then_ready() {
    let stub = support::spawn_stub_engine().await;
    let client = EngineClient::new(&stub.url).unwrap();

    client.reload().await.unwrap();
    assert_eq!(stub.reloads.load(Ordering::SeqCst), 1);
    assert!(client.wait_ready(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    let client = EngineClient::new("tcp://127.0.0.1:9").unwrap();
    let mut provider = InlineProvider::with_data(b"data".to_vec());
    assert!(client.scan(&mut provider).await.is_err());
}
