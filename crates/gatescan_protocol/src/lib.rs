//! Shared wire records for the Gatescan scan pipeline.
//!
//! Producer and worker never call each other directly; every record they
//! exchange travels through the shared state store. This crate is the single
//! source of truth for those records and for the key namespace, so the two
//! halves cannot drift.
//!
//! # Record formats
//!
//! - Job metadata and scan outcomes are self-describing JSON.
//! - Heartbeats are `"{unix_time}|{epoch}"` strings (cheap to mget and parse).
//! - Queue payloads and list values are raw bytes; chunk lists carry body
//!   bytes untouched.

pub mod config;
pub mod defaults;
pub mod keys;
pub mod size_class;
pub mod types;

// Re-export the canonical types for convenience
pub use types::{
    Heartbeat, HeartbeatParseError, JobMetadata, OutcomeMetrics, Priority, RecordError,
    ScanMode, ScanOutcome, ScanStatus, StreamId,
};

pub use size_class::size_class;
