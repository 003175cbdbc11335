//! External-processor stream handling.
//!
//! Each proxy stream gets a [`ProcessorSession`] state machine. Body chunks
//! are acknowledged immediately (the proxy must keep forwarding) while the
//! bytes are queued onto a per-session pump task that serializes
//! `push_chunk` calls onto the byte pipe. The terminal chunk either holds the
//! final CONTINUE until the verdict is known (blocking mode) or detaches the
//! follow-up entirely (fire-and-forget mode).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

use gatescan_protocol::config::{ProducerConfig, ResponseMode};
use gatescan_protocol::{Priority, ScanStatus, StreamId};
use gatescan_state::provider::DataProvider;
use gatescan_state::StreamProvider;
use gatescan_xds::core::HttpStatus;
use gatescan_xds::ext_proc::external_processor_server::ExternalProcessor;
use gatescan_xds::ext_proc::{
    common_response, processing_request, processing_response, BodyResponse, CommonResponse,
    HeadersResponse, HttpBody, HttpHeaders, ImmediateResponse, ProcessingRequest,
    ProcessingResponse, TrailersResponse,
};

use crate::cache::IntelligentCache;
use crate::flags::FeatureFlags;
use crate::metrics;
use crate::orchestrator::ScanOrchestrator;

/// Only body-less methods may consult or populate the clean-URL cache.
const CACHEABLE_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS"];

/// Shared handles every session needs.
pub struct ProducerCore {
    pub orchestrator: Arc<ScanOrchestrator>,
    pub cache: Arc<IntelligentCache>,
    pub flags: Arc<dyn FeatureFlags>,
    pub config: Arc<ProducerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Init,
    HeadersSeen,
    Streaming,
    Terminal,
}

enum IngestEvent {
    Chunk(Vec<u8>),
    End,
}

/// What one inbound message produced.
pub struct Step {
    pub responses: Vec<ProcessingResponse>,
    /// Close the stream after sending (immediate 403).
    pub close: bool,
}

impl Step {
    fn reply(response: ProcessingResponse) -> Self {
        Self {
            responses: vec![response],
            close: false,
        }
    }

    fn close_with(response: ProcessingResponse) -> Self {
        Self {
            responses: vec![response],
            close: true,
        }
    }
}

enum Verdict {
    Clean,
    Infected(String),
    Bypassed,
    Error,
}

/// Deferred half of a dispatched scan: pump completion, handshake, result.
struct ScanFollowUp {
    orchestrator: Arc<ScanOrchestrator>,
    stream_id: StreamId,
    pump: Option<JoinHandle<()>>,
    handshake: Option<JoinHandle<bool>>,
}

impl ScanFollowUp {
    async fn finish(self) -> Verdict {
        // The pump drains before anything else: `finalize_push` must be
        // ordered after every chunk.
        if let Some(pump) = self.pump {
            if let Err(err) = pump.await {
                error!("chunk pump panicked for {}: {err}", self.stream_id);
                self.orchestrator.cancel_session(self.stream_id);
                return Verdict::Error;
            }
        }
        self.orchestrator.finalize_ingest(self.stream_id).await;

        let accepted = match self.handshake {
            Some(handle) => handle.await.unwrap_or(false),
            None => false,
        };
        if !accepted {
            self.orchestrator.cancel_session(self.stream_id);
            return Verdict::Bypassed;
        }

        let outcome = self.orchestrator.get_result(self.stream_id).await;
        match outcome.status {
            ScanStatus::Infected => Verdict::Infected(outcome.virus.unwrap_or_default()),
            ScanStatus::Clean => Verdict::Clean,
            ScanStatus::Error => Verdict::Error,
        }
    }
}

/// Per-stream state machine: `Init → HeadersSeen → Streaming → Terminal`.
pub struct ProcessorSession {
    core: Arc<ProducerCore>,
    state: SessionState,
    method: String,
    path: String,
    client_ip: String,
    bypassed: bool,
    stream_id: Option<StreamId>,
    chunk_tx: Option<mpsc::Sender<IngestEvent>>,
    pump: Option<JoinHandle<()>>,
    handshake: Option<JoinHandle<bool>>,
    body_bytes: u64,
    started: std::time::Instant,
    closed: bool,
}

impl ProcessorSession {
    pub fn new(core: Arc<ProducerCore>) -> Self {
        metrics::ACTIVE_SESSIONS.inc();
        Self {
            core,
            state: SessionState::Init,
            method: "GET".to_string(),
            path: "unknown".to_string(),
            client_ip: "unknown".to_string(),
            bypassed: false,
            stream_id: None,
            chunk_tx: None,
            pump: None,
            handshake: None,
            body_bytes: 0,
            started: std::time::Instant::now(),
            closed: false,
        }
    }

    pub async fn on_message(&mut self, message: ProcessingRequest) -> Step {
        match message.request {
            Some(processing_request::Request::RequestHeaders(headers)) => {
                self.on_request_headers(headers).await
            }
            Some(processing_request::Request::ResponseHeaders(_)) => {
                debug!("[header] response");
                Step::reply(continue_headers(false))
            }
            Some(processing_request::Request::RequestBody(body)) => {
                self.on_body(body, true).await
            }
            Some(processing_request::Request::ResponseBody(body)) => {
                self.on_body(body, false).await
            }
            Some(processing_request::Request::RequestTrailers(_)) => {
                Step::reply(trailers_response(true))
            }
            Some(processing_request::Request::ResponseTrailers(_)) => {
                Step::reply(trailers_response(false))
            }
            None => {
                debug!("empty processing request");
                Step::reply(ProcessingResponse::default())
            }
        }
    }

    async fn on_request_headers(&mut self, headers: HttpHeaders) -> Step {
        self.state = SessionState::HeadersSeen;
        let parsed = parse_headers(&headers);
        self.path = parsed
            .get(":path")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        self.method = parsed
            .get(":method")
            .cloned()
            .unwrap_or_else(|| "GET".to_string())
            .to_uppercase();
        if let Some(forwarded) = parsed.get("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next() {
                self.client_ip = first.trim().to_string();
            }
        }
        info!("[header] request: {} {}", self.method, self.path);

        // Metrics label only; the registry map never makes a security decision.
        if let Some(category) = self.core.cache.policy().get_notable_type(&self.path) {
            metrics::NOTABLE_DOMAINS
                .with_label_values(&[category])
                .inc();
        }

        // A resource that previously scanned infected is refused outright in
        // fire-and-forget mode; the 403 it never got the first time.
        if self.core.config.response_mode == ResponseMode::FireAndForget {
            match self.core.cache.check_block(&self.path).await {
                Ok(true) => {
                    warn!("blocked resource: {} {}", self.method, self.path);
                    metrics::REQUESTS_TOTAL
                        .with_label_values(&[&self.method, "blocked"])
                        .inc();
                    self.state = SessionState::Terminal;
                    return Step::close_with(forbidden("previously flagged resource"));
                }
                Ok(false) => {}
                Err(err) => warn!("block-list lookup failed: {err}"),
            }
        }

        if CACHEABLE_METHODS.contains(&self.method.as_str()) {
            match self.core.cache.check_cache(&self.path).await {
                Ok(true) => {
                    info!("cache hit: {} {}", self.method, self.path);
                    metrics::CACHE_OPS.with_label_values(&["hit"]).inc();
                    metrics::SCAN_SESSIONS
                        .with_label_values(&["cache_hit"])
                        .inc();
                    metrics::REQUESTS_TOTAL
                        .with_label_values(&[&self.method, "cache_hit"])
                        .inc();
                    self.bypassed = true;
                    return Step::reply(continue_headers(true));
                }
                Ok(false) => {
                    metrics::CACHE_OPS.with_label_values(&["miss"]).inc();
                }
                Err(err) => warn!("cache lookup failed, treating as miss: {err}"),
            }
        }

        let tenant_id = self.core.config.tenant_id.clone();
        let priority = Priority::from_flag(self.core.flags.get_priority(&tenant_id).await);

        let (stream_id, provider) = self
            .core
            .orchestrator
            .prepare_session(&tenant_id, &self.client_ip);
        debug!("session prepared: {stream_id}");

        match self
            .core
            .orchestrator
            .dispatch_scan(stream_id, priority, &tenant_id)
            .await
        {
            Ok(true) => {
                metrics::SCAN_SESSIONS.with_label_values(&["accepted"]).inc();
                self.stream_id = Some(stream_id);
                let (tx, rx) = mpsc::channel(64);
                self.chunk_tx = Some(tx);
                self.pump = Some(spawn_pump(stream_id, provider, rx));
                // Handshake runs concurrently; the header response never
                // waits on worker pickup.
                let orchestrator = Arc::clone(&self.core.orchestrator);
                self.handshake = Some(tokio::spawn(async move {
                    orchestrator.await_handshake(stream_id).await
                }));
            }
            Ok(false) => {
                metrics::SCAN_SESSIONS
                    .with_label_values(&["bypassed_congestion"])
                    .inc();
                self.bypassed = true;
                self.core.orchestrator.cancel_session(stream_id);
            }
            Err(err) => {
                error!("dispatch failed for {stream_id}: {err}");
                metrics::SCAN_SESSIONS.with_label_values(&["error"]).inc();
                self.bypassed = true;
                self.core.orchestrator.cancel_session(stream_id);
            }
        }
        Step::reply(continue_headers(true))
    }

    async fn on_body(&mut self, body: HttpBody, is_request: bool) -> Step {
        if self.bypassed || self.state == SessionState::Terminal || self.chunk_tx.is_none() {
            return Step::reply(continue_body(is_request));
        }
        self.state = SessionState::Streaming;
        self.body_bytes += body.body.len() as u64;

        if !body.body.is_empty() {
            let sent = match &self.chunk_tx {
                Some(tx) => tx.send(IngestEvent::Chunk(body.body)).await.is_ok(),
                None => false,
            };
            if !sent {
                error!("chunk pump gone for {:?}; passing traffic through", self.stream_id);
                self.bypassed = true;
                self.chunk_tx = None;
                return Step::reply(continue_body(is_request));
            }
        }

        if body.end_of_stream {
            return self.on_end_of_stream(is_request).await;
        }
        Step::reply(continue_body(is_request))
    }

    async fn on_end_of_stream(&mut self, is_request: bool) -> Step {
        self.state = SessionState::Terminal;
        let Some(stream_id) = self.stream_id else {
            return Step::reply(continue_body(is_request));
        };
        info!("finalizing stream: {stream_id}");
        if let Some(tx) = self.chunk_tx.take() {
            let _ = tx.send(IngestEvent::End).await;
        }

        let follow_up = ScanFollowUp {
            orchestrator: Arc::clone(&self.core.orchestrator),
            stream_id,
            pump: self.pump.take(),
            handshake: self.handshake.take(),
        };
        self.stream_id = None;
        self.observe_request();

        match self.core.config.response_mode {
            ResponseMode::Blocking => {
                let verdict = follow_up.finish().await;
                self.settle(verdict, is_request).await
            }
            ResponseMode::FireAndForget => {
                let core = Arc::clone(&self.core);
                let method = self.method.clone();
                let path = self.path.clone();
                tokio::spawn(async move {
                    let verdict = follow_up.finish().await;
                    settle_detached(core, verdict, &method, &path).await;
                });
                Step::reply(continue_body(is_request))
            }
        }
    }

    /// Blocking-mode settlement: the reply to the terminal chunk carries the
    /// verdict.
    async fn settle(&mut self, verdict: Verdict, is_request: bool) -> Step {
        match verdict {
            Verdict::Infected(virus) => {
                error!(
                    "INFECTED: {virus} [{} {}]: refusing stream",
                    self.method, self.path
                );
                metrics::SCAN_SESSIONS.with_label_values(&["infected"]).inc();
                metrics::REQUESTS_TOTAL
                    .with_label_values(&[&self.method, "infected"])
                    .inc();
                Step::close_with(forbidden(&format!("Virus detected: {virus}")))
            }
            Verdict::Clean => {
                metrics::SCAN_SESSIONS.with_label_values(&["clean"]).inc();
                metrics::REQUESTS_TOTAL
                    .with_label_values(&[&self.method, "clean"])
                    .inc();
                if CACHEABLE_METHODS.contains(&self.method.as_str()) {
                    if let Err(err) = self.core.cache.store_cache(&self.path).await {
                        warn!("cache store failed for {}: {err}", self.path);
                    } else {
                        metrics::CACHE_OPS.with_label_values(&["store"]).inc();
                    }
                }
                Step::reply(continue_body(is_request))
            }
            Verdict::Bypassed => {
                metrics::SCAN_SESSIONS
                    .with_label_values(&["bypassed_handshake"])
                    .inc();
                self.bypassed = true;
                Step::reply(continue_body(is_request))
            }
            Verdict::Error => {
                // The proxy still gets a definitive answer; the error is an
                // operator problem, not a client one.
                metrics::SCAN_SESSIONS.with_label_values(&["error"]).inc();
                metrics::REQUESTS_TOTAL
                    .with_label_values(&[&self.method, "error"])
                    .inc();
                Step::reply(continue_body(is_request))
            }
        }
    }

    fn observe_request(&self) {
        metrics::BODY_SIZE_BYTES
            .with_label_values(&[&self.method])
            .observe(self.body_bytes as f64);
        metrics::REQUEST_DURATION
            .with_label_values(&[&self.method])
            .observe(self.started.elapsed().as_secs_f64());
    }

    /// Tear the session down on stream end or proxy disconnect.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(handshake) = self.handshake.take() {
            handshake.abort();
        }
        if let Some(tx) = self.chunk_tx.take() {
            // Mark the pipe complete so a worker mid-scan drains out instead
            // of following a stream that will never finish.
            let _ = tx.send(IngestEvent::End).await;
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        if let Some(stream_id) = self.stream_id.take() {
            self.core.orchestrator.cancel_session(stream_id);
        }
        metrics::ACTIVE_SESSIONS.dec();
    }
}

/// Fire-and-forget settlement: log, block-list, cache.
async fn settle_detached(core: Arc<ProducerCore>, verdict: Verdict, method: &str, path: &str) {
    match verdict {
        Verdict::Infected(virus) => {
            error!("INFECTED (async): {virus} [{method} {path}]: block-listing");
            metrics::SCAN_SESSIONS.with_label_values(&["infected"]).inc();
            metrics::REQUESTS_TOTAL
                .with_label_values(&[method, "infected"])
                .inc();
            if let Err(err) = core.cache.store_block(path).await {
                warn!("block store failed for {path}: {err}");
            }
        }
        Verdict::Clean => {
            metrics::SCAN_SESSIONS.with_label_values(&["clean"]).inc();
            metrics::REQUESTS_TOTAL
                .with_label_values(&[method, "clean"])
                .inc();
            if CACHEABLE_METHODS.contains(&method) {
                if let Err(err) = core.cache.store_cache(path).await {
                    warn!("cache store failed for {path}: {err}");
                } else {
                    metrics::CACHE_OPS.with_label_values(&["store"]).inc();
                }
            }
        }
        Verdict::Bypassed => {
            metrics::SCAN_SESSIONS
                .with_label_values(&["bypassed_handshake"])
                .inc();
        }
        Verdict::Error => {
            metrics::SCAN_SESSIONS.with_label_values(&["error"]).inc();
        }
    }
}

/// Single writer per session: chunks hit the pipe in submission order even
/// though the gRPC loop never waits on the store.
fn spawn_pump(
    stream_id: StreamId,
    mut provider: StreamProvider,
    mut rx: mpsc::Receiver<IngestEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                IngestEvent::Chunk(bytes) => {
                    if let Err(err) = provider.push_chunk(bytes).await {
                        error!("chunk push failed for {stream_id}: {err}");
                        return;
                    }
                }
                IngestEvent::End => {
                    if let Err(err) = provider.finalize_push().await {
                        error!("finalize push failed for {stream_id}: {err}");
                    }
                    return;
                }
            }
        }
    })
}

fn parse_headers(headers: &HttpHeaders) -> HashMap<String, String> {
    let mut parsed = HashMap::new();
    if let Some(map) = &headers.headers {
        for header in &map.headers {
            // Current proxies populate raw_value; fall back to value.
            let value = if !header.raw_value.is_empty() {
                String::from_utf8_lossy(&header.raw_value).into_owned()
            } else {
                header.value.clone()
            };
            parsed.insert(header.key.to_lowercase(), value);
        }
    }
    parsed
}

fn continue_common() -> Option<CommonResponse> {
    Some(CommonResponse {
        status: common_response::ResponseStatus::Continue as i32,
    })
}

fn continue_headers(is_request: bool) -> ProcessingResponse {
    let inner = HeadersResponse {
        response: continue_common(),
    };
    ProcessingResponse {
        response: Some(if is_request {
            processing_response::Response::RequestHeaders(inner)
        } else {
            processing_response::Response::ResponseHeaders(inner)
        }),
    }
}

fn continue_body(is_request: bool) -> ProcessingResponse {
    let inner = BodyResponse {
        response: continue_common(),
    };
    ProcessingResponse {
        response: Some(if is_request {
            processing_response::Response::RequestBody(inner)
        } else {
            processing_response::Response::ResponseBody(inner)
        }),
    }
}

fn trailers_response(is_request: bool) -> ProcessingResponse {
    ProcessingResponse {
        response: Some(if is_request {
            processing_response::Response::RequestTrailers(TrailersResponse {})
        } else {
            processing_response::Response::ResponseTrailers(TrailersResponse {})
        }),
    }
}

fn forbidden(details: &str) -> ProcessingResponse {
    ProcessingResponse {
        response: Some(processing_response::Response::ImmediateResponse(
            ImmediateResponse {
                status: Some(HttpStatus { code: 403 }),
                body: "Access denied: malware detected.\n".to_string(),
                details: details.to_string(),
            },
        )),
    }
}

/// tonic service wrapper: pumps the bidi stream through a session.
pub struct ExtProcService {
    core: Arc<ProducerCore>,
}

impl ExtProcService {
    pub fn new(core: Arc<ProducerCore>) -> Self {
        Self { core }
    }
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcService {
    type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

    async fn process(
        &self,
        request: Request<Streaming<ProcessingRequest>>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(16);
        let core = Arc::clone(&self.core);

        tokio::spawn(async move {
            let mut session = ProcessorSession::new(core);
            loop {
                let message = match inbound.message().await {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(status) => {
                        debug!("processing stream error: {status}");
                        break;
                    }
                };
                let step = session.on_message(message).await;
                let mut peer_gone = false;
                for response in step.responses {
                    if tx.send(Ok(response)).await.is_err() {
                        peer_gone = true;
                        break;
                    }
                }
                if step.close || peer_gone {
                    break;
                }
            }
            session.close().await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
