//! State-store abstraction and the per-session byte pipe.
//!
//! The store is the only point of cross-process synchronization: queues, the
//! chunk pipe, handshake and result lists, the cluster registry and every
//! cache entry live behind the [`StateStore`] trait. Backends are selected by
//! URL scheme (`redis://…` in production, `memory://` for tests and local
//! development).

pub mod memory;
pub mod provider;
pub mod redis_store;
pub mod store;

pub use memory::MemoryStore;
pub use provider::{make_provider, DataProvider, InlineProvider, StreamProvider};
pub use redis_store::RedisStore;
pub use store::{open, SharedStore, StateStore, StoreError, StoreUrl};
