//! Canonical record types exchanged through the state store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque 128-bit scan-session identifier.
///
/// Minted by the producer on first header arrival; every key of the session's
/// byte pipe, handshake and result is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(Uuid);

impl StreamId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| RecordError::InvalidStreamId(s.to_string()))
    }
}

/// Scan queue tier. Maps 1:1 onto the two queues and the two last-TAT keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Low,
}

impl Priority {
    pub fn from_flag(is_priority: bool) -> Self {
        if is_priority {
            Priority::High
        } else {
            Priority::Low
        }
    }

    /// Queue this tier is enqueued onto.
    pub fn queue(self) -> &'static str {
        match self {
            Priority::High => crate::keys::QUEUE_PRIORITY,
            Priority::Low => crate::keys::QUEUE_NORMAL,
        }
    }

    /// Last-observed-TAT key consulted by the predictive bypass.
    pub fn tat_key(self) -> &'static str {
        match self {
            Priority::High => crate::keys::TAT_HIGH_LAST,
            Priority::Low => crate::keys::TAT_NORMAL_LAST,
        }
    }

    /// Tier a job drained from the given queue belongs to.
    pub fn from_queue(queue: &str) -> Self {
        if queue == crate::keys::QUEUE_PRIORITY {
            Priority::High
        } else {
            Priority::Low
        }
    }
}

/// Data transfer mode discriminant for provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanMode {
    /// Follower-style scanning over the byte pipe.
    #[default]
    Stream,
    /// Whole body buffered in memory (small bodies, tests).
    Body,
}

/// Job metadata pushed onto a scan queue.
///
/// Self-describing JSON so future fields do not break older workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub stream_id: StreamId,
    pub priority: Priority,
    /// Seconds since epoch at enqueue time.
    pub enqueued_at: f64,
    #[serde(default)]
    pub mode: ScanMode,
    pub tenant_id: String,
    pub client_ip: String,
}

impl JobMetadata {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("job metadata serializes")
    }

    pub fn decode(raw: &[u8]) -> Result<Self, RecordError> {
        serde_json::from_slice(raw).map_err(RecordError::Decode)
    }
}

/// Terminal status of one scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanStatus {
    Clean,
    Infected,
    Error,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Clean => "CLEAN",
            ScanStatus::Infected => "INFECTED",
            ScanStatus::Error => "ERROR",
        }
    }
}

/// Timing and volume figures attached to a published result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetrics {
    /// Engine round-trip in milliseconds.
    pub scan_ms: f64,
    /// Queue wait: job pickup minus enqueue, seconds.
    pub wait_tat_s: f64,
    /// Processing: publish minus pickup, seconds.
    pub process_tat_s: f64,
    /// End to end: publish minus enqueue, seconds.
    pub total_tat_s: f64,
    pub bytes_scanned: u64,
    pub size_class: String,
}

/// Result record published on `result:{stream_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virus: Option<String>,
    pub stream_id: StreamId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Key of the verified replay, present for clean scans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<OutcomeMetrics>,
}

impl ScanOutcome {
    pub fn error(stream_id: StreamId, detail: impl Into<String>) -> Self {
        Self {
            status: ScanStatus::Error,
            virus: None,
            stream_id,
            detail: Some(detail.into()),
            data_key: None,
            metrics: None,
        }
    }

    pub fn is_infected(&self) -> bool {
        self.status == ScanStatus::Infected
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("scan outcome serializes")
    }

    pub fn decode(raw: &[u8]) -> Result<Self, RecordError> {
        serde_json::from_slice(raw).map_err(RecordError::Decode)
    }
}

/// Decoded `heartbeat:{node}` value.
///
/// Encoded as `"{unix_time}|{epoch}"`; the coordinator mgets a fleet of these
/// per tick, so the format stays flat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heartbeat {
    /// Seconds since epoch when the heartbeat was written.
    pub time: f64,
    /// Signature-definition epoch the node is running.
    pub epoch: u64,
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.time, self.epoch)
    }
}

impl FromStr for Heartbeat {
    type Err = HeartbeatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (time, epoch) = s
            .split_once('|')
            .ok_or_else(|| HeartbeatParseError(s.to_string()))?;
        Ok(Heartbeat {
            time: time
                .parse()
                .map_err(|_| HeartbeatParseError(s.to_string()))?,
            epoch: epoch
                .parse()
                .map_err(|_| HeartbeatParseError(s.to_string()))?,
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed heartbeat value: {0:?}")]
pub struct HeartbeatParseError(pub String);

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid stream id: {0:?}")]
    InvalidStreamId(String),
    #[error("record decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_metadata_round_trips() {
        let job = JobMetadata {
            stream_id: StreamId::mint(),
            priority: Priority::High,
            enqueued_at: 1_722_500_000.25,
            mode: ScanMode::Stream,
            tenant_id: "tenant-a".into(),
            client_ip: "10.0.0.7".into(),
        };
        let decoded = JobMetadata::decode(&job.encode()).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn job_metadata_requires_stream_id() {
        let raw = br#"{"priority":"high","enqueued_at":1.0,"tenant_id":"t","client_ip":"i"}"#;
        assert!(matches!(
            JobMetadata::decode(raw),
            Err(RecordError::Decode(_))
        ));
    }

    #[test]
    fn scan_outcome_round_trips() {
        let outcome = ScanOutcome {
            status: ScanStatus::Infected,
            virus: Some("stream: Eicar-Test-Signature FOUND".into()),
            stream_id: StreamId::mint(),
            detail: None,
            data_key: None,
            metrics: Some(OutcomeMetrics {
                scan_ms: 12.5,
                wait_tat_s: 0.2,
                process_tat_s: 0.4,
                total_tat_s: 0.6,
                bytes_scanned: 68,
                size_class: "tiny".into(),
            }),
        };
        let decoded = ScanOutcome::decode(&outcome.encode()).unwrap();
        assert_eq!(decoded, outcome);
        assert!(decoded.is_infected());
    }

    #[test]
    fn scan_status_uses_uppercase_wire_names() {
        assert_eq!(serde_json::to_string(&ScanStatus::Clean).unwrap(), "\"CLEAN\"");
        assert_eq!(
            serde_json::from_str::<ScanStatus>("\"INFECTED\"").unwrap(),
            ScanStatus::Infected
        );
    }

    #[test]
    fn heartbeat_round_trips() {
        let hb = Heartbeat {
            time: 1_722_500_000.5,
            epoch: 7,
        };
        assert_eq!(hb.to_string().parse::<Heartbeat>().unwrap(), hb);
    }

    #[test]
    fn heartbeat_rejects_garbage() {
        assert!("not-a-heartbeat".parse::<Heartbeat>().is_err());
        assert!("1.0|x".parse::<Heartbeat>().is_err());
    }

    #[test]
    fn priority_maps_to_queues_and_tat_keys() {
        assert_eq!(Priority::High.queue(), "scan_priority");
        assert_eq!(Priority::Low.queue(), "scan_normal");
        assert_eq!(Priority::High.tat_key(), "tat_high_last");
        assert_eq!(Priority::from_queue("scan_priority"), Priority::High);
        assert_eq!(Priority::from_queue("scan_normal"), Priority::Low);
    }
}
