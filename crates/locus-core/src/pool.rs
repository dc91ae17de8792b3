//! Partitioned worker pool.
//!
//! Each worker owns a bounded queue. Updates are routed by a stable hash
//! of the entity id to one worker, which runs them on per-entity lanes:
//! one entity's updates are processed strictly in submission order, while
//! other entities keep flowing even when that entity is stuck in backoff.
//! Oracle failures and undelivered events are retried inside the lane
//! with the configured [`RetryPolicy`]. Each worker parks at most
//! `queue_capacity` updates behind busy lanes before it stops reading its
//! queue, so `submit` still applies backpressure.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use locus_types::{EntityId, PositionUpdate, TransitionEvent};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::detector::TransitionDetector;
use crate::error::{DetectError, PoolError};
use crate::retry::RetryPolicy;

/// Fixed set of detection workers.
#[derive(Debug)]
pub struct WorkerPool {
    workers: usize,
    senders: RwLock<Vec<mpsc::Sender<PositionUpdate>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `workers` tasks, each with a queue of `queue_capacity` updates.
    ///
    /// Zero values are raised to one. Must be called inside a tokio runtime.
    pub fn spawn(
        detector: Arc<TransitionDetector>,
        workers: usize,
        queue_capacity: usize,
        retry: RetryPolicy,
    ) -> Self {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel(queue_capacity);
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                index,
                Arc::clone(&detector),
                rx,
                retry,
                queue_capacity,
            )));
        }
        info!(workers, queue_capacity, "worker pool started");
        Self {
            workers,
            senders: RwLock::new(senders),
            handles: Mutex::new(handles),
        }
    }

    /// Worker index responsible for `entity_id`.
    pub fn partition_for(entity_id: &EntityId, workers: usize) -> usize {
        if workers <= 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        entity_id.as_str().hash(&mut hasher);
        let total = u64::try_from(workers).unwrap_or(u64::MAX);
        usize::try_from(hasher.finish().wrapping_rem(total)).unwrap_or(0)
    }

    /// Number of workers.
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Queue an update on its entity's worker, waiting while that queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once [`WorkerPool::shutdown`] has begun.
    pub async fn submit(&self, update: PositionUpdate) -> Result<(), PoolError> {
        let senders = self.senders.read().await;
        let partition = Self::partition_for(&update.entity_id, self.workers);
        let sender = senders.get(partition).ok_or(PoolError::Closed)?;
        sender.send(update).await.map_err(|_| PoolError::Closed)
    }

    /// Stop accepting updates and wait for every queued and in-flight
    /// update to finish. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let closed = std::mem::take(&mut *self.senders.write().await);
        drop(closed);
        let handles = std::mem::take(&mut *self.handles.lock().await);
        if handles.is_empty() {
            return;
        }
        info!(workers = handles.len(), "draining worker pool");
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool drained");
    }
}

/// Entities with an update in flight on one worker, each with the updates
/// that arrived for it meanwhile.
///
/// A lane runs as its own task, so backoff sleeps and slow queries for one
/// entity never hold up the other entities routed to the same worker.
struct Lanes {
    detector: Arc<TransitionDetector>,
    retry: RetryPolicy,
    backlog: HashMap<EntityId, VecDeque<PositionUpdate>>,
    waiting: usize,
    tasks: JoinSet<EntityId>,
}

impl Lanes {
    fn new(detector: Arc<TransitionDetector>, retry: RetryPolicy) -> Self {
        Self {
            detector,
            retry,
            backlog: HashMap::new(),
            waiting: 0,
            tasks: JoinSet::new(),
        }
    }

    /// Start the update now, or park it behind its entity's running lane.
    fn admit(&mut self, update: PositionUpdate) {
        if let Some(queued) = self.backlog.get_mut(&update.entity_id) {
            queued.push_back(update);
            self.waiting = self.waiting.saturating_add(1);
            return;
        }
        self.backlog.insert(update.entity_id.clone(), VecDeque::new());
        self.start(update);
    }

    /// The lane for `entity_id` finished one update: start its next one or retire it.
    fn advance(&mut self, entity_id: &EntityId) {
        let next = self.backlog.get_mut(entity_id).and_then(VecDeque::pop_front);
        match next {
            Some(update) => {
                self.waiting = self.waiting.saturating_sub(1);
                self.start(update);
            }
            None => {
                self.backlog.remove(entity_id);
            }
        }
    }

    fn start(&mut self, update: PositionUpdate) {
        let detector = Arc::clone(&self.detector);
        let retry = self.retry;
        self.tasks.spawn(async move {
            handle_update(&detector, &retry, &update).await;
            update.entity_id
        });
    }
}

async fn run_worker(
    index: usize,
    detector: Arc<TransitionDetector>,
    mut rx: mpsc::Receiver<PositionUpdate>,
    retry: RetryPolicy,
    backlog_limit: usize,
) {
    debug!(worker = index, "worker started");
    let mut lanes = Lanes::new(detector, retry);
    let mut open = true;
    loop {
        tokio::select! {
            received = rx.recv(), if open && lanes.waiting < backlog_limit => match received {
                Some(update) => lanes.admit(update),
                None => open = false,
            },
            Some(joined) = lanes.tasks.join_next() => match joined {
                Ok(entity_id) => lanes.advance(&entity_id),
                Err(e) => error!(worker = index, error = %e, "lane task ended abnormally"),
            },
            else => break,
        }
    }
    debug!(worker = index, "worker stopped");
}

async fn handle_update(detector: &TransitionDetector, retry: &RetryPolicy, update: &PositionUpdate) {
    let mut backoff = retry.backoff();
    loop {
        match detector.process(update).await {
            Ok(_) => return,
            Err(DetectError::Validation(e)) => {
                warn!(entity_id = %update.entity_id, error = %e, "invalid update dropped");
                return;
            }
            Err(DetectError::OracleUnavailable { reason, .. }) => {
                let Some(delay) = backoff.next_delay() else {
                    detector.stats().record_dropped();
                    warn!(
                        entity_id = %update.entity_id,
                        attempts = backoff.failures(),
                        reason = %reason,
                        "containment unavailable, update dropped"
                    );
                    return;
                };
                tokio::time::sleep(delay).await;
            }
            Err(DetectError::Publish { pending, reason }) => {
                warn!(
                    entity_id = %update.entity_id,
                    pending = pending.len(),
                    reason = %reason,
                    "transition events not delivered, retrying"
                );
                redrive(detector, retry, pending).await;
                return;
            }
        }
    }
}

/// Re-publish undelivered events in order until they go through or the
/// retry budget runs out. State is already applied, so nothing is recomputed.
async fn redrive(detector: &TransitionDetector, retry: &RetryPolicy, mut pending: Vec<TransitionEvent>) {
    let mut backoff = retry.backoff();
    loop {
        let Some(delay) = backoff.next_delay() else {
            for event in &pending {
                error!(
                    entity_id = %event.entity_id,
                    region = %event.region.name,
                    kind = %event.kind,
                    at = %event.at,
                    event_id = %event.event_id,
                    "transition event lost after retries"
                );
            }
            return;
        };
        tokio::time::sleep(delay).await;
        match detector.redeliver(pending).await {
            Ok(()) => return,
            Err(DetectError::Publish { pending: rest, .. }) => pending = rest,
            Err(other) => {
                error!(error = %other, "unexpected error re-driving events");
                return;
            }
        }
    }
}
