//! Per-session byte pipe providers.
//!
//! The producer pushes body chunks as they arrive from the proxy; the worker
//! drains them as a lazy sequence while the upload is still in flight
//! (follower scanning). The pipe is write-once/read-once: exactly one
//! producer and exactly one worker ever touch a given session's keys.

use async_trait::async_trait;

use gatescan_protocol::{defaults, keys, ScanMode, StreamId};

use crate::store::{SharedStore, StoreError};

/// Capability set shared by both halves of the pipe.
#[async_trait]
pub trait DataProvider: Send {
    /// Append one body chunk (producer side).
    async fn push_chunk(&mut self, chunk: Vec<u8>) -> Result<(), StoreError>;

    /// Mark the stream complete; the worker observes this only after every
    /// preceding chunk (producer side).
    async fn finalize_push(&mut self) -> Result<(), StoreError>;

    /// Pull the next chunk, blocking while the producer is still uploading.
    /// `None` means end of stream (worker side).
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Settle the verified replay: kept with a TTL on a clean scan, deleted on
    /// virus or failure. Always clears the done sentinel (worker side).
    async fn finalize(&mut self, scan_success: bool, is_virus: bool) -> Result<(), StoreError>;

    /// Key of the verified replay, when one exists.
    fn data_key(&self) -> Option<String>;
}

/// Construct the provider variant for a job's transfer mode.
pub fn make_provider(
    mode: ScanMode,
    store: SharedStore,
    stream_id: StreamId,
) -> Box<dyn DataProvider> {
    match mode {
        ScanMode::Stream => Box::new(StreamProvider::new(store, stream_id)),
        ScanMode::Body => Box::new(InlineProvider::default()),
    }
}

/// Production provider backed by the byte pipe in the state store.
pub struct StreamProvider {
    store: SharedStore,
    chunks_key: String,
    verified_key: String,
    done_key: String,
    drain_started: bool,
}

impl StreamProvider {
    pub fn new(store: SharedStore, stream_id: StreamId) -> Self {
        Self {
            store,
            chunks_key: keys::data(stream_id),
            verified_key: keys::verified(stream_id),
            done_key: keys::done(stream_id),
            drain_started: false,
        }
    }
}

#[async_trait]
impl DataProvider for StreamProvider {
    async fn push_chunk(&mut self, chunk: Vec<u8>) -> Result<(), StoreError> {
        self.store.rpush(&self.chunks_key, &chunk).await
    }

    async fn finalize_push(&mut self) -> Result<(), StoreError> {
        self.store.set(&self.done_key, b"1", None, false).await?;
        Ok(())
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StoreError> {
        if !self.drain_started {
            // Stale replays from a crashed predecessor must not pollute ours.
            self.store.delete(&[self.verified_key.clone()]).await?;
            self.drain_started = true;
        }
        loop {
            let moved = self
                .store
                .blocking_move(
                    &self.chunks_key,
                    &self.verified_key,
                    std::time::Duration::from_secs(defaults::FOLLOW_MOVE_TIMEOUT_SECS),
                )
                .await?;
            if let Some(chunk) = moved {
                return Ok(Some(chunk));
            }
            if self.store.get(&self.done_key).await?.is_some() {
                return Ok(None);
            }
        }
    }

    async fn finalize(&mut self, scan_success: bool, is_virus: bool) -> Result<(), StoreError> {
        if !scan_success || is_virus {
            self.store.delete(&[self.verified_key.clone()]).await?;
        } else {
            self.store
                .expire(
                    &self.verified_key,
                    std::time::Duration::from_secs(defaults::VERIFIED_TTL_SECS),
                )
                .await?;
        }
        self.store.delete(&[self.done_key.clone()]).await?;
        Ok(())
    }

    fn data_key(&self) -> Option<String> {
        Some(self.verified_key.clone())
    }
}

/// Whole body buffered in memory; drained in fixed-size chunks.
/// Used for small bodies and as the test double.
#[derive(Default)]
pub struct InlineProvider {
    data: Vec<u8>,
    cursor: usize,
}

impl InlineProvider {
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }
}

#[async_trait]
impl DataProvider for InlineProvider {
    async fn push_chunk(&mut self, chunk: Vec<u8>) -> Result<(), StoreError> {
        self.data.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finalize_push(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StoreError> {
        if self.cursor >= self.data.len() {
            return Ok(None);
        }
        let end = (self.cursor + defaults::INLINE_CHUNK_SIZE).min(self.data.len());
        let chunk = self.data[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(Some(chunk))
    }

    async fn finalize(&mut self, _scan_success: bool, _is_virus: bool) -> Result<(), StoreError> {
        Ok(())
    }

    fn data_key(&self) -> Option<String> {
        None
    }
}
