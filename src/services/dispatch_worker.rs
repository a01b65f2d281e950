//! Dispatch worker - runs remote actions off the frame path
//!
//! The frame path acquires a zone's cooldown and enqueues a task via a bounded
//! mpsc channel; a single worker task drains the queue in FIFO order and
//! drives the login-then-act sequence. Any failure releases the zone's
//! cooldown so the next debounced trigger can retry. On success the cooldown
//! stays until it expires.
//!
//! A panic while processing one task is caught, counted and turned into a
//! failure for that task only; the worker keeps draining.

use crate::infra::config::Config;
use crate::infra::metrics::{DispatchFailure, Metrics};
use crate::io::remote_action::{CallError, RemoteAction};
use crate::services::cooldown::CooldownRegistry;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A remote action to run for one zone
#[derive(Debug, Clone)]
pub struct DispatchTask {
    pub zone_id: String,
    /// When the task was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

#[derive(Debug)]
pub enum DispatchMsg {
    Task(DispatchTask),
    /// Stop after every task queued before this marker
    Shutdown,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("dispatch queue is full")]
    QueueFull,
    #[error("dispatch worker has stopped")]
    Closed,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("authentication failed: {0}")]
    Auth(#[source] CallError),
    #[error("action failed: {0}")]
    Action(#[source] CallError),
    #[error("worker panicked: {0}")]
    WorkerFatal(String),
}

impl DispatchError {
    pub fn failure(&self) -> DispatchFailure {
        match self {
            DispatchError::Auth(_) => DispatchFailure::Auth,
            DispatchError::Action(_) => DispatchFailure::Action,
            DispatchError::WorkerFatal(_) => DispatchFailure::WorkerFault,
        }
    }
}

/// Producer side of the dispatch queue. Cheap to clone.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<DispatchMsg>,
    metrics: Arc<Metrics>,
}

impl DispatchQueue {
    /// Offer a task without waiting
    pub fn enqueue(&self, zone_id: &str) -> Result<(), EnqueueError> {
        let task = DispatchTask { zone_id: zone_id.to_string(), enqueued_at: Instant::now() };

        self.metrics.record_queue_push();
        match self.tx.try_send(DispatchMsg::Task(task)) {
            Ok(()) => {
                self.metrics.record_enqueued();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_rejected();
                Err(EnqueueError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_rejected();
                Err(EnqueueError::Closed)
            }
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Worker that processes dispatch tasks asynchronously
pub struct DispatchWorker {
    client: Box<dyn RemoteAction>,
    cooldowns: Arc<CooldownRegistry>,
    rx: mpsc::Receiver<DispatchMsg>,
    metrics: Arc<Metrics>,
}

impl DispatchWorker {
    pub fn new(
        client: Box<dyn RemoteAction>,
        cooldowns: Arc<CooldownRegistry>,
        rx: mpsc::Receiver<DispatchMsg>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { client, cooldowns, rx, metrics }
    }

    /// Run until a `Shutdown` marker arrives or every sender is dropped
    pub async fn run(mut self) {
        info!("dispatch_worker_started");

        while let Some(msg) = self.rx.recv().await {
            let task = match msg {
                DispatchMsg::Task(task) => task,
                DispatchMsg::Shutdown => break,
            };
            self.process(task).await;
        }

        self.client.reset();
        info!("dispatch_worker_stopped");
    }

    async fn process(&mut self, task: DispatchTask) {
        let queue_delay_us = task.enqueued_at.elapsed().as_micros() as u64;
        self.metrics.record_dequeued(queue_delay_us);

        let start = Instant::now();
        let result = AssertUnwindSafe(dispatch(&mut *self.client))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(DispatchError::WorkerFatal(panic_message(panic.as_ref()))));
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(
                    zone = %task.zone_id,
                    queue_delay_us = %queue_delay_us,
                    latency_ms = %latency_ms,
                    "dispatch_succeeded"
                );
                self.metrics.record_dispatch_success(latency_ms);
            }
            Err(e) => {
                let failure = e.failure();
                if failure == DispatchFailure::WorkerFault {
                    error!(zone = %task.zone_id, error = %e, "dispatch_worker_fault");
                    self.client.reset();
                } else {
                    warn!(
                        zone = %task.zone_id,
                        latency_ms = %latency_ms,
                        error = %e,
                        "dispatch_failed"
                    );
                }
                self.cooldowns.release(&task.zone_id);
                self.metrics.record_dispatch_failure(failure, latency_ms);
            }
        }
    }
}

async fn dispatch(client: &mut dyn RemoteAction) -> Result<(), DispatchError> {
    let token = client.authenticate().await.map_err(DispatchError::Auth)?;
    client.perform_action(&token).await.map_err(DispatchError::Action)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Create a dispatch channel and worker
///
/// Returns the queue (for the frame path) and the worker (to be spawned)
pub fn create_dispatch_worker(
    client: Box<dyn RemoteAction>,
    cooldowns: Arc<CooldownRegistry>,
    metrics: Arc<Metrics>,
    capacity: usize,
) -> (DispatchQueue, DispatchWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let worker = DispatchWorker::new(client, cooldowns, rx, metrics.clone());
    (DispatchQueue { tx, metrics }, worker)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every task queued before shutdown was processed
    Clean,
    /// The worker did not finish in time and was aborted mid-task
    Abandoned,
}

/// Owns the spawned worker and coordinates its shutdown
pub struct Dispatcher {
    queue: DispatchQueue,
    handle: JoinHandle<()>,
    cooldowns: Arc<CooldownRegistry>,
    shutdown_timeout: Duration,
}

impl Dispatcher {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(
        client: Box<dyn RemoteAction>,
        cooldowns: Arc<CooldownRegistry>,
        metrics: Arc<Metrics>,
        config: &Config,
    ) -> Self {
        let (queue, worker) =
            create_dispatch_worker(client, cooldowns.clone(), metrics, config.queue_capacity());
        let handle = tokio::spawn(worker.run());
        Self { queue, handle, cooldowns, shutdown_timeout: config.shutdown_timeout() }
    }

    pub fn queue(&self) -> DispatchQueue {
        self.queue.clone()
    }

    /// Stop the worker after the tasks already queued.
    ///
    /// Waits up to the configured shutdown timeout, then aborts the worker and
    /// abandons whatever it was doing. The cooldown registry is reset in both
    /// cases.
    pub async fn shutdown(self) -> ShutdownOutcome {
        let Self { queue, mut handle, cooldowns, shutdown_timeout } = self;

        let drain = async {
            // A closed channel means the worker is already gone
            let _ = queue.tx.send(DispatchMsg::Shutdown).await;
            (&mut handle).await
        };

        let joined = tokio::time::timeout(shutdown_timeout, drain).await;
        let outcome = match joined {
            Ok(Ok(())) => ShutdownOutcome::Clean,
            Ok(Err(e)) => {
                error!(error = %e, "dispatch_worker_join_failed");
                ShutdownOutcome::Clean
            }
            Err(_) => {
                handle.abort();
                ShutdownOutcome::Abandoned
            }
        };

        cooldowns.reset_all();
        info!(
            outcome = ?outcome,
            timeout_ms = %shutdown_timeout.as_millis(),
            "dispatch_shutdown"
        );
        outcome
    }
}
