//! Canonical default values shared across the producer and worker.

/// ext_proc / SDS gRPC listen port.
pub const DEFAULT_GRPC_PORT: u16 = 50051;
pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_CLAMD_URL: &str = "tcp://127.0.0.1:3310";
pub const DEFAULT_CONSOLE_API_URL: &str = "http://gatescan-console:3000";
pub const DEFAULT_TENANT_ID: &str = "default-tenant";

/// Handshake wait: producer blocks on `ack:{id}` this long before bypassing.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 300;
/// Predictive bypass trips when the last observed TAT exceeds this.
pub const PREDICTIVE_BYPASS_TAT_SECS: f64 = 300.0;
/// Result wait on the terminal body chunk.
pub const RESULT_TIMEOUT_SECS: u64 = 30;
/// Dispatcher queue poll.
pub const QUEUE_POLL_TIMEOUT_SECS: u64 = 2;
/// Follower blocking-move window before re-checking the done sentinel.
pub const FOLLOW_MOVE_TIMEOUT_SECS: u64 = 5;

pub const ACK_TTL_SECS: u64 = 300;
pub const RESULT_TTL_SECS: u64 = 3600;
/// Verified replay retention after a clean scan.
pub const VERIFIED_TTL_SECS: u64 = 3600;
pub const CLEAN_CACHE_TTL_SECS: u64 = 3600;
pub const INGEST_METRIC_TTL_SECS: u64 = 3600;

pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const HEARTBEAT_TTL_SECS: u64 = 60;
pub const UPDATE_LOCK_TTL_SECS: u64 = 600;
/// Engine readiness poll budget after a reload.
pub const ENGINE_READY_TIMEOUT_SECS: u64 = 60;
/// Per-call engine deadline.
pub const ENGINE_DEADLINE_SECS: u64 = 30;

pub const WEBHOOK_TIMEOUT_SECS: u64 = 5;

/// Worker pool size; 4 of 5 pollers prefer the priority queue.
pub const WORKER_POOL_SIZE: usize = 5;

/// Inline provider drain chunk size.
pub const INLINE_CHUNK_SIZE: usize = 4096;

pub const SDS_CACHE_MAX_SIZE: usize = 1000;
pub const SDS_CACHE_TTL_SECS: u64 = 3600;
