//! In-memory store backend.
//!
//! Single-process stand-in for Redis with the same observable semantics:
//! lazy TTL expiry, order-respecting blocking pop, atomic blocking-move.
//! Blocking operations park on a [`Notify`] that every mutation pokes, so
//! nothing polls individual keys.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::store::{StateStore, StoreError};

#[derive(Default)]
struct State {
    strings: HashMap<String, Vec<u8>>,
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    sets: HashMap<String, HashSet<String>>,
    expiries: HashMap<String, Instant>,
}

impl State {
    /// Drop the key everywhere if its TTL has lapsed.
    fn purge(&mut self, key: &str, now: Instant) {
        if matches!(self.expiries.get(key), Some(at) if *at <= now) {
            self.expiries.remove(key);
            self.strings.remove(key);
            self.lists.remove(key);
            self.sets.remove(key);
        }
    }

    fn key_exists(&mut self, key: &str, now: Instant) -> bool {
        self.purge(key, now);
        self.strings.contains_key(key)
            || self.lists.contains_key(key)
            || self.sets.contains_key(key)
    }

    fn try_pop(&mut self, queues: &[String], now: Instant) -> Option<(String, Vec<u8>)> {
        for queue in queues {
            self.purge(queue, now);
            if let Some(list) = self.lists.get_mut(queue.as_str()) {
                if let Some(payload) = list.pop_back() {
                    if list.is_empty() {
                        self.lists.remove(queue.as_str());
                    }
                    return Some((queue.clone(), payload));
                }
            }
        }
        None
    }

    fn try_move(&mut self, src: &str, dst: &str, now: Instant) -> Option<Vec<u8>> {
        self.purge(src, now);
        let list = self.lists.get_mut(src)?;
        let value = list.pop_front()?;
        if list.is_empty() {
            self.lists.remove(src);
        }
        self.lists
            .entry(dst.to_string())
            .or_default()
            .push_back(value.clone());
        Some(value)
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    notify: Notify,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("memory store lock poisoned")
    }

    /// Run `attempt` until it yields, a mutation wakes us, or the deadline
    /// passes. The notified future is enabled *before* the attempt so a
    /// concurrent mutation between check and park cannot be missed.
    async fn wait_until<T>(
        &self,
        timeout: Duration,
        mut attempt: impl FnMut(&mut State, Instant) -> Option<T>,
    ) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(found) = {
                let mut state = self.lock();
                attempt(&mut state, Instant::now())
            } {
                return Some(found);
            }

            if Instant::now() >= deadline {
                return None;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return None,
            }
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<(), StoreError> {
        {
            let mut state = self.lock();
            state.purge(queue, Instant::now());
            state
                .lists
                .entry(queue.to_string())
                .or_default()
                .push_front(payload.to_vec());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .wait_until(timeout, |state, now| state.try_pop(queues, now))
            .await)
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ex: Option<Duration>,
        nx: bool,
    ) -> Result<bool, StoreError> {
        {
            let mut state = self.lock();
            let now = Instant::now();
            if nx && state.key_exists(key, now) {
                return Ok(false);
            }
            state.strings.insert(key.to_string(), value.to_vec());
            match ex {
                Some(ttl) => {
                    state.expiries.insert(key.to_string(), now + ttl);
                }
                None => {
                    state.expiries.remove(key);
                }
            }
        }
        self.notify.notify_waiters();
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut state = self.lock();
        state.purge(key, Instant::now());
        Ok(state.strings.get(key).cloned())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let mut state = self.lock();
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|key| {
                state.purge(key, now);
                state.strings.get(key.as_str()).cloned()
            })
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        {
            let mut state = self.lock();
            for key in keys {
                state.strings.remove(key.as_str());
                state.lists.remove(key.as_str());
                state.sets.remove(key.as_str());
                state.expiries.remove(key.as_str());
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        Ok(state.key_exists(key, Instant::now()))
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.purge(set, Instant::now());
        state
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.purge(set, Instant::now());
        if let Some(members) = state.sets.get_mut(set) {
            members.remove(member);
            if members.is_empty() {
                state.sets.remove(set);
            }
        }
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let mut state = self.lock();
        state.purge(set, Instant::now());
        Ok(state
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.lock();
        let now = Instant::now();
        if state.key_exists(key, now) {
            state.expiries.insert(key.to_string(), now + ttl);
        }
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        {
            let mut state = self.lock();
            state.purge(key, Instant::now());
            state
                .lists
                .entry(key.to_string())
                .or_default()
                .push_back(value.to_vec());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let moved = self
            .wait_until(timeout, |state, now| state.try_move(src, dst, now))
            .await;
        if moved.is_some() {
            self.notify.notify_waiters();
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn q(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn pop_respects_queue_order() {
        let store = MemoryStore::new();
        store.push("normal", b"n1").await.unwrap();
        store.push("priority", b"p1").await.unwrap();

        let (queue, payload) = store
            .pop(&q(&["priority", "normal"]), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue, "priority");
        assert_eq!(payload, b"p1");

        let (queue, _) = store
            .pop(&q(&["priority", "normal"]), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue, "normal");
    }

    #[tokio::test(start_paused = true)]
    async fn pop_is_fifo_within_a_queue() {
        let store = MemoryStore::new();
        store.push("jobs", b"a").await.unwrap();
        store.push("jobs", b"b").await.unwrap();
        let (_, first) = store
            .pop(&q(&["jobs"]), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        let (_, second) = store
            .pop(&q(&["jobs"]), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, b"a");
        assert_eq!(second, b"b");
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out_on_empty_queues() {
        let store = MemoryStore::new();
        let popped = store
            .pop(&q(&["jobs"]), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pop_wakes_on_concurrent_push() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.pop(&q(&["jobs"]), Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.push("jobs", b"late").await.unwrap();
        let (_, payload) = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(payload, b"late");
    }

    #[tokio::test(start_paused = true)]
    async fn set_nx_only_writes_when_absent() {
        let store = MemoryStore::new();
        assert!(store.set("lock", b"me", None, true).await.unwrap());
        assert!(!store.set("lock", b"you", None, true).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().unwrap(), b"me");
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_keys_lazily() {
        let store = MemoryStore::new();
        store
            .set("ephemeral", b"1", Some(Duration::from_secs(60)), false)
            .await
            .unwrap();
        assert!(store.exists("ephemeral").await.unwrap());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!store.exists("ephemeral").await.unwrap());
        assert!(store.get("ephemeral").await.unwrap().is_none());
        // A lapsed key is fair game for NX again.
        assert!(store.set("ephemeral", b"2", None, true).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_move_transfers_in_order() {
        let store = MemoryStore::new();
        store.rpush("src", b"one").await.unwrap();
        store.rpush("src", b"two").await.unwrap();

        let first = store
            .blocking_move("src", "dst", Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        let second = store
            .blocking_move("src", "dst", Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, b"one");
        assert_eq!(second, b"two");

        // Destination preserved the order too.
        let a = store
            .blocking_move("dst", "sink", Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a, b"one");
    }

    #[tokio::test(start_paused = true)]
    async fn smembers_tracks_adds_and_removes() {
        let store = MemoryStore::new();
        store.sadd("nodes", "a").await.unwrap();
        store.sadd("nodes", "b").await.unwrap();
        store.srem("nodes", "a").await.unwrap();
        assert_eq!(store.smembers("nodes").await.unwrap(), vec!["b"]);
    }
}
