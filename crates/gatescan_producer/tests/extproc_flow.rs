//! Session state-machine tests: the boundary scenarios of the front filter,
//! driven against the in-memory store with an inline fake worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use gatescan_producer::extproc::{ProcessorSession, ProducerCore};
use gatescan_producer::{BypassPolicy, FeatureFlags, IntelligentCache, ScanAdapter, ScanOrchestrator};
use gatescan_protocol::config::{FeatureFlagEngine, ProducerConfig, ResponseMode};
use gatescan_protocol::{keys, JobMetadata, ScanOutcome, ScanStatus};
use gatescan_state::provider::DataProvider;
use gatescan_state::{MemoryStore, SharedStore, StreamProvider};
use gatescan_xds::core::{HeaderMap, HeaderValue};
use gatescan_xds::ext_proc::{
    processing_request, processing_response, HttpBody, HttpHeaders, ProcessingRequest,
};

struct StaticFlags(bool);

#[async_trait]
impl FeatureFlags for StaticFlags {
    async fn get_priority(&self, _tenant_id: &str) -> bool {
        self.0
    }
}

fn core_with(store: &SharedStore, mode: ResponseMode, priority: bool) -> Arc<ProducerCore> {
    let config = ProducerConfig {
        state_store_url: "memory://".to_string(),
        grpc_port: 50051,
        tenant_id: "tenant-test".to_string(),
        response_mode: mode,
        flag_engine: FeatureFlagEngine::EnvVar,
        scan_file_threshold_mb: 10,
        ca_cert_path: None,
        ca_key_path: None,
        sds_cache_max_size: 16,
        sds_cache_ttl_secs: 3600,
        flagsmith_api_url: None,
        flagsmith_env_key: None,
    };
    Arc::new(ProducerCore {
        orchestrator: Arc::new(ScanOrchestrator::new(
            ScanAdapter::new(store.clone()),
            store.clone(),
        )),
        cache: Arc::new(IntelligentCache::new(store.clone(), BypassPolicy::default())),
        flags: Arc::new(StaticFlags(priority)),
        config: Arc::new(config),
    })
}

#[derive(Clone, Copy)]
enum FakeVerdict {
    Clean,
    Infected,
}

/// A stand-in worker: pops one job, ACKs, drains the pipe, publishes.
fn spawn_fake_worker(store: SharedStore, verdict: FakeVerdict) {
    tokio::spawn(async move {
        let queues = vec![
            keys::QUEUE_PRIORITY.to_string(),
            keys::QUEUE_NORMAL.to_string(),
        ];
        let Ok(Some((_, raw))) = store.pop(&queues, Duration::from_secs(600)).await else {
            return;
        };
        let job = JobMetadata::decode(&raw).unwrap();
        store.push(&keys::ack(job.stream_id), b"1").await.unwrap();

        let mut provider = StreamProvider::new(store.clone(), job.stream_id);
        let mut bytes_scanned = 0u64;
        while let Some(chunk) = provider.next_chunk().await.unwrap() {
            bytes_scanned += chunk.len() as u64;
        }
        let infected = matches!(verdict, FakeVerdict::Infected);
        provider.finalize(true, infected).await.unwrap();

        let outcome = ScanOutcome {
            status: if infected {
                ScanStatus::Infected
            } else {
                ScanStatus::Clean
            },
            virus: infected.then(|| "stream: Eicar-Test-Signature FOUND".to_string()),
            stream_id: job.stream_id,
            detail: None,
            data_key: (!infected).then(|| keys::verified(job.stream_id)),
            metrics: Some(gatescan_protocol::OutcomeMetrics {
                scan_ms: 3.0,
                wait_tat_s: 0.1,
                process_tat_s: 0.1,
                total_tat_s: 0.2,
                bytes_scanned,
                size_class: gatescan_protocol::size_class(bytes_scanned).to_string(),
            }),
        };
        store
            .push(&keys::result(job.stream_id), &outcome.encode())
            .await
            .unwrap();
    });
}

fn header(key: &str, value: &str) -> HeaderValue {
    HeaderValue {
        key: key.to_string(),
        value: String::new(),
        raw_value: value.as_bytes().to_vec(),
    }
}

fn request_headers(method: &str, path: &str) -> ProcessingRequest {
    ProcessingRequest {
        request: Some(processing_request::Request::RequestHeaders(HttpHeaders {
            headers: Some(HeaderMap {
                headers: vec![header(":method", method), header(":path", path)],
            }),
            end_of_stream: false,
        })),
    }
}

fn response_headers() -> ProcessingRequest {
    ProcessingRequest {
        request: Some(processing_request::Request::ResponseHeaders(HttpHeaders {
            headers: Some(HeaderMap { headers: vec![] }),
            end_of_stream: false,
        })),
    }
}

fn request_body(data: &[u8], end_of_stream: bool) -> ProcessingRequest {
    ProcessingRequest {
        request: Some(processing_request::Request::RequestBody(HttpBody {
            body: data.to_vec(),
            end_of_stream,
        })),
    }
}

fn response_body(data: &[u8], end_of_stream: bool) -> ProcessingRequest {
    ProcessingRequest {
        request: Some(processing_request::Request::ResponseBody(HttpBody {
            body: data.to_vec(),
            end_of_stream,
        })),
    }
}

const EICAR_BODY: &[u8] =
    br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

#[tokio::test(start_paused = true)]
async fn clean_get_continues_and_populates_the_cache() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let core = core_with(&store, ResponseMode::Blocking, false);
    spawn_fake_worker(store.clone(), FakeVerdict::Clean);

    let mut session = ProcessorSession::new(core);
    let step = session.on_message(request_headers("GET", "/a")).await;
    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::RequestHeaders(_))
    ));
    assert!(!step.close);

    let step = session.on_message(response_headers()).await;
    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::ResponseHeaders(_))
    ));

    let step = session.on_message(response_body(b"hello", true)).await;
    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::ResponseBody(_))
    ));
    assert!(!step.close, "clean traffic is never refused");
    session.close().await;

    assert!(
        store.exists(&keys::clean_cache("/a")).await.unwrap(),
        "clean GET must land in the URL cache"
    );
}

#[tokio::test(start_paused = true)]
async fn infected_post_gets_an_immediate_403() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let core = core_with(&store, ResponseMode::Blocking, false);
    spawn_fake_worker(store.clone(), FakeVerdict::Infected);

    let mut session = ProcessorSession::new(core);
    session.on_message(request_headers("POST", "/u")).await;
    let step = session.on_message(request_body(EICAR_BODY, true)).await;

    let Some(processing_response::Response::ImmediateResponse(immediate)) =
        &step.responses[0].response
    else {
        panic!("expected an immediate response, got {:?}", step.responses[0]);
    };
    assert_eq!(immediate.status.as_ref().unwrap().code, 403);
    assert!(immediate.details.contains("EICAR") || immediate.details.contains("Virus"));
    assert!(step.close, "the stream ends after a 403");
    session.close().await;

    assert!(
        !store.exists(&keys::clean_cache("/u")).await.unwrap(),
        "infected results must never populate the cache"
    );
}

#[tokio::test(start_paused = true)]
async fn clean_post_does_not_populate_the_cache() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let core = core_with(&store, ResponseMode::Blocking, false);
    spawn_fake_worker(store.clone(), FakeVerdict::Clean);

    let mut session = ProcessorSession::new(core);
    session.on_message(request_headers("POST", "/p")).await;
    let step = session.on_message(request_body(b"payload", true)).await;
    assert!(!step.close);
    session.close().await;

    assert!(!store.exists(&keys::clean_cache("/p")).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn congestion_bypasses_before_enqueue() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    store
        .set(keys::TAT_HIGH_LAST, b"301000", None, false)
        .await
        .unwrap();
    let core = core_with(&store, ResponseMode::Blocking, true);

    let mut session = ProcessorSession::new(core);
    let step = session.on_message(request_headers("GET", "/big")).await;
    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::RequestHeaders(_))
    ));

    // No job was enqueued on either queue.
    let popped = store
        .pop(
            &[
                keys::QUEUE_PRIORITY.to_string(),
                keys::QUEUE_NORMAL.to_string(),
            ],
            Duration::from_millis(50),
        )
        .await
        .unwrap();
    assert!(popped.is_none());

    // Bypassed sessions stream straight through.
    let step = session.on_message(response_body(b"chunk", false)).await;
    assert!(!step.close);
    let step = session.on_message(response_body(b"tail", true)).await;
    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::ResponseBody(_))
    ));
    assert!(!step.close);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_falls_back_to_continue() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let core = core_with(&store, ResponseMode::Blocking, false);
    // No worker exists anywhere.

    let mut session = ProcessorSession::new(core);
    session.on_message(request_headers("POST", "/slow")).await;
    let step = session.on_message(request_body(b"data", true)).await;

    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::RequestBody(_))
    ));
    assert!(!step.close, "handshake timeout must not 403");
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn cache_hit_short_circuits_scanning() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let core = core_with(&store, ResponseMode::Blocking, false);
    core.cache.store_cache("/cached").await.unwrap();

    let mut session = ProcessorSession::new(Arc::clone(&core));
    session.on_message(request_headers("GET", "/cached")).await;

    let popped = store
        .pop(
            &[
                keys::QUEUE_PRIORITY.to_string(),
                keys::QUEUE_NORMAL.to_string(),
            ],
            Duration::from_millis(50),
        )
        .await
        .unwrap();
    assert!(popped.is_none(), "cache hits never dispatch a scan");

    let step = session.on_message(response_body(b"cached bytes", true)).await;
    assert!(!step.close);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn fire_and_forget_blocks_the_next_request() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let core = core_with(&store, ResponseMode::FireAndForget, false);
    spawn_fake_worker(store.clone(), FakeVerdict::Infected);

    let mut session = ProcessorSession::new(Arc::clone(&core));
    session.on_message(request_headers("GET", "/mal")).await;
    let step = session.on_message(response_body(EICAR_BODY, true)).await;
    // The terminal CONTINUE is not held back in this mode.
    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::ResponseBody(_))
    ));
    assert!(!step.close);
    session.close().await;

    // Let the detached follow-up settle.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(store.exists(&keys::block_cache("/mal")).await.unwrap());
    assert!(!store.exists(&keys::clean_cache("/mal")).await.unwrap());

    // The same resource is refused outright next time.
    let mut session = ProcessorSession::new(core);
    let step = session.on_message(request_headers("GET", "/mal")).await;
    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::ImmediateResponse(_))
    ));
    assert!(step.close);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn notable_registry_requests_are_counted() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let core = core_with(&store, ResponseMode::Blocking, false);
    let path = "https://files.pythonhosted.org/packages/requests.tar.gz";
    // Cache hit so the header phase settles without a worker; classification
    // happens regardless of the scan decision.
    core.cache.store_cache(path).await.unwrap();

    let before = gatescan_producer::metrics::NOTABLE_DOMAINS
        .with_label_values(&["python"])
        .get();
    let mut session = ProcessorSession::new(core);
    session.on_message(request_headers("GET", path)).await;
    session.close().await;

    let after = gatescan_producer::metrics::NOTABLE_DOMAINS
        .with_label_values(&["python"])
        .get();
    assert_eq!(after, before + 1);
}

#[tokio::test(start_paused = true)]
async fn trailers_pass_through() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let core = core_with(&store, ResponseMode::Blocking, false);
    let mut session = ProcessorSession::new(core);

    let step = session
        .on_message(ProcessingRequest {
            request: Some(processing_request::Request::RequestTrailers(
                gatescan_xds::ext_proc::HttpTrailers { trailers: None },
            )),
        })
        .await;
    assert!(matches!(
        step.responses[0].response,
        Some(processing_response::Response::RequestTrailers(_))
    ));
    session.close().await;
}
