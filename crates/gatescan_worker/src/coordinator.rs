//! Cluster coordinator: heartbeats, distributed lock, sequential reloads.
//!
//! Every node ticks; at most one node reloads at a time (the `update_lock`
//! holder). A single-node cluster never reloads in place; it asks the
//! autoscaler for surge capacity and lets the next tick's winner do the work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use gatescan_protocol::{defaults, keys, Heartbeat};
use gatescan_state::{SharedStore, StoreError};

use crate::engine::EngineClient;

pub struct ClusterCoordinator {
    store: SharedStore,
    engine: Arc<EngineClient>,
    node_id: String,
    deployment_name: Option<String>,
    current_epoch: AtomicU64,
}

impl ClusterCoordinator {
    pub fn new(
        store: SharedStore,
        engine: Arc<EngineClient>,
        node_id: impl Into<String>,
        deployment_name: Option<String>,
    ) -> Self {
        Self {
            store,
            engine,
            node_id: node_id.into(),
            deployment_name,
            current_epoch: AtomicU64::new(0),
        }
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::SeqCst)
    }

    /// One coordination round: publish liveness, then check for a pending
    /// reload. Called every 30 s by the dispatcher's tick task.
    pub async fn tick(&self) {
        if let Err(err) = self.heartbeat().await {
            warn!("heartbeat failed: {err}");
        }
        if let Err(err) = self.handle_sequential_update().await {
            error!("coordinated reload round failed: {err}");
        }
    }

    async fn heartbeat(&self) -> Result<(), StoreError> {
        let beat = Heartbeat {
            time: crate::epoch_seconds(),
            epoch: self.current_epoch(),
        };
        self.store
            .set(
                &keys::heartbeat(&self.node_id),
                beat.to_string().as_bytes(),
                Some(Duration::from_secs(defaults::HEARTBEAT_TTL_SECS)),
                false,
            )
            .await?;
        self.store.sadd(keys::ACTIVE_NODES, &self.node_id).await?;
        debug!("heartbeat sent (epoch {})", beat.epoch);
        Ok(())
    }

    async fn handle_sequential_update(&self) -> Result<(), StoreError> {
        let Some(target_epoch) = self.read_target_epoch().await? else {
            return Ok(());
        };
        if target_epoch <= self.current_epoch() {
            return Ok(());
        }

        let acquired = self
            .store
            .set(
                keys::UPDATE_LOCK,
                self.node_id.as_bytes(),
                Some(Duration::from_secs(defaults::UPDATE_LOCK_TTL_SECS)),
                true,
            )
            .await?;
        if !acquired {
            debug!("update lock held elsewhere; waiting for our turn");
            return Ok(());
        }
        info!("acquired update lock; moving to epoch {target_epoch}");

        let round = self.reload_round(target_epoch).await;
        // The lock is released on every exit path; its TTL only covers crashes.
        let released = self.store.delete(&[keys::UPDATE_LOCK.to_string()]).await;
        round?;
        released
    }

    async fn reload_round(&self, target_epoch: u64) -> Result<(), StoreError> {
        let live_nodes = self.live_node_count().await?;

        if live_nodes <= 1 && self.deployment_name.is_some() {
            info!("single live node; requesting surge capacity instead of reloading");
            self.store
                .delete(&[keys::SCALING_REQUEST.to_string()])
                .await?;
            self.store.push(keys::SCALING_REQUEST, b"surge").await?;
            return Ok(());
        }

        if let Err(err) = self.engine.reload().await {
            // Leave the epoch untouched; the next tick retries the round.
            error!("engine reload failed: {err}");
            return Ok(());
        }
        self.engine
            .wait_ready(Duration::from_secs(defaults::ENGINE_READY_TIMEOUT_SECS))
            .await;
        self.current_epoch.store(target_epoch, Ordering::SeqCst);
        info!("node now at epoch {target_epoch}");

        // Publish the new epoch right away so peers (and the scale-down
        // check below) see it without waiting a full heartbeat interval.
        self.heartbeat().await?;
        self.handle_scale_down(target_epoch).await
    }

    async fn read_target_epoch(&self) -> Result<Option<u64>, StoreError> {
        let raw = self.store.get(keys::TARGET_EPOCH).await?;
        Ok(raw
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|s| s.trim().parse::<u64>().ok()))
    }

    /// Members of `active_nodes` with a live heartbeat; stale members are
    /// evicted as a side effect.
    async fn live_node_count(&self) -> Result<usize, StoreError> {
        let mut live = 0;
        for node in self.store.smembers(keys::ACTIVE_NODES).await? {
            if self.store.get(&keys::heartbeat(&node)).await?.is_some() {
                live += 1;
            } else {
                self.store.srem(keys::ACTIVE_NODES, &node).await?;
            }
        }
        Ok(live)
    }

    /// Once every live peer reports the target epoch, the surge capacity can
    /// be shed.
    async fn handle_scale_down(&self, target_epoch: u64) -> Result<(), StoreError> {
        for node in self.store.smembers(keys::ACTIVE_NODES).await? {
            let Some(raw) = self.store.get(&keys::heartbeat(&node)).await? else {
                continue;
            };
            let Ok(text) = String::from_utf8(raw) else {
                continue;
            };
            match text.parse::<Heartbeat>() {
                Ok(beat) if beat.epoch >= target_epoch => {}
                Ok(_) => return Ok(()),
                Err(_) => continue,
            }
        }
        info!("all nodes at epoch {target_epoch}; terminating surge request");
        self.store.delete(&[keys::SCALING_REQUEST.to_string()]).await
    }
}
