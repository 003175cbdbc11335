//! Worker pool with the 4:1 priority shape.
//!
//! Four of every five pollers list the priority queue first with the normal
//! queue as fallback; the fifth polls the normal queue exclusively. The
//! starvation guarantee is a pool-level property: a non-empty normal queue
//! always has a dedicated drain.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};

use gatescan_protocol::{defaults, keys};
use gatescan_state::SharedStore;

use crate::coordinator::ClusterCoordinator;
use crate::service::ScannerTaskService;

pub struct WorkerPool {
    store: SharedStore,
    service: Arc<ScannerTaskService>,
    coordinator: Arc<ClusterCoordinator>,
    pool_size: usize,
}

/// Queues one poller watches, in preference order.
fn poller_queues(index: usize) -> Vec<String> {
    if (index + 1) % 5 == 0 {
        vec![keys::QUEUE_NORMAL.to_string()]
    } else {
        vec![keys::QUEUE_PRIORITY.to_string(), keys::QUEUE_NORMAL.to_string()]
    }
}

impl WorkerPool {
    pub fn new(
        store: SharedStore,
        service: Arc<ScannerTaskService>,
        coordinator: Arc<ClusterCoordinator>,
        pool_size: usize,
    ) -> Self {
        Self {
            store,
            service,
            coordinator,
            pool_size: pool_size.max(1),
        }
    }

    /// Run the pool until the shutdown signal flips. In-flight tasks run to
    /// completion; idle pollers exit at their next wakeup.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("starting worker pool ({} pollers, 4:1 shape)", self.pool_size);

        let mut handles = Vec::with_capacity(self.pool_size + 1);
        for index in 0..self.pool_size {
            let store = self.store.clone();
            let service = Arc::clone(&self.service);
            let queues = poller_queues(index);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                poller_loop(index, store, service, queues, &mut shutdown).await;
            }));
        }

        {
            let coordinator = Arc::clone(&self.coordinator);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                coordinator_loop(coordinator, &mut shutdown).await;
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                error!("worker task panicked: {err}");
            }
        }
        info!("worker pool stopped");
        Ok(())
    }
}

async fn poller_loop(
    index: usize,
    store: SharedStore,
    service: Arc<ScannerTaskService>,
    queues: Vec<String>,
    shutdown: &mut watch::Receiver<bool>,
) {
    info!("poller {index} watching {queues:?}");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let popped = tokio::select! {
            _ = shutdown.changed() => break,
            popped = store.pop(
                &queues,
                Duration::from_secs(defaults::QUEUE_POLL_TIMEOUT_SECS),
            ) => popped,
        };
        match popped {
            Ok(Some((queue, payload))) => {
                service.process(&queue, &payload).await;
            }
            Ok(None) => {}
            Err(err) => {
                error!("poller {index} queue error: {err}");
                tokio::time::sleep(Duration::from_secs(
                    defaults::QUEUE_POLL_TIMEOUT_SECS,
                ))
                .await;
            }
        }
    }
    info!("poller {index} stopped");
}

async fn coordinator_loop(coordinator: Arc<ClusterCoordinator>, shutdown: &mut watch::Receiver<bool>) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(defaults::HEARTBEAT_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => coordinator.tick().await,
        }
    }
}
