//! Canonical state-store key namespace.
//!
//! Every key the producer and worker touch is built here; nothing else in the
//! workspace formats a key by hand.

use sha2::{Digest, Sha256};

use crate::types::StreamId;

/// High-priority scan queue.
pub const QUEUE_PRIORITY: &str = "scan_priority";
/// Normal scan queue.
pub const QUEUE_NORMAL: &str = "scan_normal";

/// Set of node identifiers with a live heartbeat.
pub const ACTIVE_NODES: &str = "active_nodes";
/// Operator-written reload target epoch.
pub const TARGET_EPOCH: &str = "target_epoch";
/// Timestamp of the last target-epoch write.
pub const TARGET_EPOCH_UPDATED_AT: &str = "target_epoch_updated_at";
/// Acquire-once reload lock; value names the holding node.
pub const UPDATE_LOCK: &str = "update_lock";
/// Queue the coordinator uses to ask the autoscaler for surge capacity.
pub const SCALING_REQUEST: &str = "scaling_request";

/// Last fully-observed TAT (milliseconds, stringified) per tier.
pub const TAT_HIGH_LAST: &str = "tat_high_last";
pub const TAT_NORMAL_LAST: &str = "tat_normal_last";

/// Append-only chunk list the producer pushes body bytes onto.
pub fn data(stream_id: StreamId) -> String {
    format!("data:{stream_id}")
}

/// List of chunks the worker has already moved through the engine.
pub fn verified(stream_id: StreamId) -> String {
    format!("{stream_id}:verified")
}

/// End-of-stream sentinel written by the producer.
pub fn done(stream_id: StreamId) -> String {
    format!("{stream_id}:done")
}

/// Handshake list the worker pushes a single byte onto at pickup.
pub fn ack(stream_id: StreamId) -> String {
    format!("ack:{stream_id}")
}

/// Result list holding one JSON outcome record.
pub fn result(stream_id: StreamId) -> String {
    format!("result:{stream_id}")
}

/// Ingest-duration diagnostic written by the producer.
pub fn ingest_metric(stream_id: StreamId) -> String {
    format!("metrics:ingest:{stream_id}")
}

/// Per-node heartbeat key.
pub fn heartbeat(node: &str) -> String {
    format!("heartbeat:{node}")
}

/// Hex SHA-256 fingerprint of a request URI.
pub fn uri_fingerprint(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Clean-URL cache entry for a previously verified resource.
pub fn clean_cache(uri: &str) -> String {
    format!("cache:uri:{}", uri_fingerprint(uri))
}

/// Block-list entry for a resource that produced an infected result.
pub fn block_cache(uri: &str) -> String {
    format!("cache:block:{}", uri_fingerprint(uri))
}
