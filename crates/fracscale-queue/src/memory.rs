//! In-process queue engine.
//!
//! Keeps one FIFO per registered worker behind a single async mutex.
//! Blocking pops wait on a per-queue `Notify`; the lock is never held
//! across an await point.
//!
//! Bookkeeping (abandoning stale queues, handing their items to live ones)
//! runs whenever the engine is touched by `enqueue`, `register`,
//! `heartbeat`, or `status`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use fracscale_core::clock::{epoch_nanos, epoch_secs_f64};
use fracscale_core::{CompletionRecord, QueueStatus, WorkItem, WorkerId};

use crate::engine::QueueEngine;
use crate::error::{QueueError, QueueResult};
use crate::params::{MemoryParams, ParamStore};

/// Whether a queue receives new items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routing {
    /// Registered and heartbeating.
    Active,
    /// Deregistered by its owner; draining.
    Dropped,
    /// Heartbeat lapsed; items were handed elsewhere.
    Abandoned,
}

struct QueueSlot {
    items: VecDeque<WorkItem>,
    routing: Routing,
    last_heartbeat: Instant,
    notify: Arc<Notify>,
}

impl QueueSlot {
    fn new(now: Instant) -> Self {
        Self {
            items: VecDeque::new(),
            routing: Routing::Active,
            last_heartbeat: now,
            notify: Arc::new(Notify::new()),
        }
    }
}

struct EngineState {
    queues: BTreeMap<WorkerId, QueueSlot>,
    /// Items taken from abandoned queues while no queue was routable.
    orphans: VecDeque<WorkItem>,
    arrivals_ns: Vec<i64>,
    completions: Vec<CompletionRecord>,
    rng: StdRng,
}

impl EngineState {
    /// Abandon queues whose heartbeat is older than `timeout` and
    /// redistribute every unowned item.
    fn sweep(&mut self, now: Instant, timeout: Duration) {
        for (id, slot) in self.queues.iter_mut() {
            if slot.routing == Routing::Abandoned {
                continue;
            }
            if now.saturating_duration_since(slot.last_heartbeat) > timeout {
                warn!(
                    queue = %id,
                    pending = slot.items.len(),
                    "heartbeat lapsed, abandoning queue"
                );
                slot.routing = Routing::Abandoned;
                self.orphans.extend(slot.items.drain(..));
            }
        }
        self.reassign_orphans();
    }

    fn reassign_orphans(&mut self) {
        while let Some(item) = self.orphans.pop_front() {
            match self.choose_queue() {
                Some(id) => self.push(&id, item),
                None => {
                    self.orphans.push_front(item);
                    break;
                }
            }
        }
    }

    /// Power-of-two-choices over routable queues.
    fn choose_queue(&mut self) -> Option<WorkerId> {
        let active: Vec<&WorkerId> = self
            .queues
            .iter()
            .filter(|(_, slot)| slot.routing == Routing::Active)
            .map(|(id, _)| id)
            .collect();

        match active.len() {
            0 => None,
            1 => Some(active[0].clone()),
            _ => {
                let picked: Vec<&WorkerId> = active
                    .choose_multiple(&mut self.rng, 2)
                    .copied()
                    .collect();
                let first_len = self.queues[picked[0]].items.len();
                let second_len = self.queues[picked[1]].items.len();
                let chosen = if first_len < second_len {
                    picked[0]
                } else {
                    picked[1]
                };
                Some(chosen.clone())
            }
        }
    }

    fn push(&mut self, id: &str, item: WorkItem) {
        if let Some(slot) = self.queues.get_mut(id) {
            slot.items.push_back(item);
            slot.notify.notify_one();
        }
    }
}

/// Shared, cloneable in-process queue engine.
#[derive(Clone)]
pub struct MemoryQueue {
    state: Arc<Mutex<EngineState>>,
    heartbeat_timeout: Duration,
    params: Option<MemoryParams>,
}

impl MemoryQueue {
    /// Create an engine that abandons queues after `heartbeat_timeout`
    /// without a heartbeat.
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self::with_rng(heartbeat_timeout, StdRng::from_entropy())
    }

    /// Create an engine with deterministic routing (for testing).
    pub fn with_seed(heartbeat_timeout: Duration, seed: u64) -> Self {
        Self::with_rng(heartbeat_timeout, StdRng::seed_from_u64(seed))
    }

    fn with_rng(heartbeat_timeout: Duration, rng: StdRng) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                queues: BTreeMap::new(),
                orphans: VecDeque::new(),
                arrivals_ns: Vec::new(),
                completions: Vec::new(),
                rng,
            })),
            heartbeat_timeout,
            params: None,
        }
    }

    /// Report the fractional value from `params` in `status()`.
    pub fn with_params(mut self, params: MemoryParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Items currently held by `id` (0 for unknown queues).
    pub async fn queue_len(&self, id: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(id).map(|s| s.items.len()).unwrap_or(0)
    }

    /// Whether `id` currently receives new items.
    pub async fn is_routable(&self, id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .queues
            .get(id)
            .is_some_and(|s| s.routing == Routing::Active)
    }

    /// Number of routable queues.
    pub async fn routable_count(&self) -> usize {
        let state = self.state.lock().await;
        state
            .queues
            .values()
            .filter(|s| s.routing == Routing::Active)
            .count()
    }

    /// Items held back because no queue was routable.
    pub async fn orphan_count(&self) -> usize {
        self.state.lock().await.orphans.len()
    }
}

#[async_trait]
impl QueueEngine for MemoryQueue {
    async fn register(&self, id: &str) -> QueueResult<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let slot = state
            .queues
            .entry(id.to_string())
            .or_insert_with(|| QueueSlot::new(now));
        let previous = slot.routing;
        slot.routing = Routing::Active;
        slot.last_heartbeat = now;
        if previous == Routing::Active {
            debug!(queue = %id, "queue registered");
        } else {
            info!(queue = %id, ?previous, "queue re-registered");
        }
        state.sweep(now, self.heartbeat_timeout);
        Ok(())
    }

    async fn deregister(&self, id: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.queues.get_mut(id)
            && slot.routing == Routing::Active
        {
            slot.routing = Routing::Dropped;
            debug!(queue = %id, pending = slot.items.len(), "queue deregistered");
        }
        Ok(())
    }

    async fn enqueue(&self, payload: &str, sent_at: f64, seq: u64) -> QueueResult<WorkerId> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep(now, self.heartbeat_timeout);

        let chosen = state.choose_queue().ok_or(QueueError::NoQueues)?;
        let arrived_ns = epoch_nanos();
        state.arrivals_ns.push(arrived_ns);
        state.push(
            &chosen,
            WorkItem {
                query_id: seq,
                payload: payload.to_string(),
                sent_at,
                enqueued_at: arrived_ns as f64 / 1e9,
                dequeued_at: None,
            },
        );
        Ok(chosen)
    }

    async fn pop(&self, id: &str, timeout: Duration) -> QueueResult<Option<WorkItem>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notify = {
                let mut state = self.state.lock().await;
                let Some(slot) = state.queues.get_mut(id) else {
                    // Forgotten queue: still honor the bounded wait.
                    drop(state);
                    tokio::time::sleep_until(deadline).await;
                    return Ok(None);
                };
                if let Some(item) = slot.items.pop_front() {
                    return Ok(Some(item));
                }
                slot.notify.clone()
            };

            // notify_one stores a permit, so a push between unlock and
            // here still wakes us.
            if tokio::time::timeout_at(deadline, notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn try_pop(&self, id: &str) -> QueueResult<Option<WorkItem>> {
        let mut state = self.state.lock().await;
        Ok(state
            .queues
            .get_mut(id)
            .and_then(|slot| slot.items.pop_front()))
    }

    async fn complete(&self, mut record: CompletionRecord) -> QueueResult<()> {
        if record.done_at.is_none() {
            record.done_at = Some(epoch_secs_f64());
        }
        self.state.lock().await.completions.push(record);
        Ok(())
    }

    async fn heartbeat(&self, id: &str) -> QueueResult<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep(now, self.heartbeat_timeout);

        match state.queues.get_mut(id) {
            Some(slot) if slot.routing != Routing::Abandoned => {
                slot.last_heartbeat = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn status(&self) -> QueueResult<QueueStatus> {
        let fractional_value = match &self.params {
            Some(params) => params.fractional().await?.probability,
            None => 0.0,
        };

        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep(now, self.heartbeat_timeout);

        // Forget drained dropped queues and empty abandoned ones.
        state
            .queues
            .retain(|_, slot| slot.routing == Routing::Active || !slot.items.is_empty());

        let mut status = QueueStatus {
            arrival_ts_ns: std::mem::take(&mut state.arrivals_ns),
            fractional_value,
            current_time_ns: epoch_nanos(),
            ..Default::default()
        };

        for (id, slot) in &state.queues {
            let depth = slot.items.len() as u64;
            if slot.routing == Routing::Active {
                status.queues.push(id.clone());
                status.queue_sizes.push(depth);
            } else {
                status.dropped_queues.push(id.clone());
                status.dropped_queue_sizes.push(depth);
            }
        }

        status.num_active_replica = status.queues.len() as u32;
        status.total_queue_size = status.queue_sizes.iter().sum::<u64>()
            + status.dropped_queue_sizes.iter().sum::<u64>()
            + state.orphans.len() as u64;
        Ok(status)
    }

    async fn drain_completions(&self) -> QueueResult<Vec<CompletionRecord>> {
        Ok(std::mem::take(&mut self.state.lock().await.completions))
    }
}
