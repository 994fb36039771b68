//! Domain types shared across fracscale crates.
//!
//! Work units and completion records are JSON-serialized when they cross
//! the queue engine or land in the append-only trace files; the control
//! types (`MetricsSnapshot`, `ControllerAction`, `ScalingTarget`) are
//! serialized into per-tick status records.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of a worker and of the queue it registers.
pub type WorkerId = String;

// ── Work units ────────────────────────────────────────────────────

/// One unit of work as stored in a worker's queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    /// Sequence number assigned by the producer.
    pub query_id: u64,
    /// Opaque payload.
    pub payload: String,
    /// Unix seconds at which the producer issued the enqueue request.
    pub sent_at: f64,
    /// Unix seconds at which the engine admitted the item.
    pub enqueued_at: f64,
    /// Unix seconds at which a worker pulled the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dequeued_at: Option<f64>,
}

impl WorkItem {
    /// Turn a processed item into its completion record.
    ///
    /// `done_at` is normally left unset and stamped by the engine in
    /// `complete`.
    pub fn into_completion(self, worker_id: &str) -> CompletionRecord {
        CompletionRecord {
            query_id: self.query_id,
            worker_id: worker_id.to_string(),
            sent_at: self.sent_at,
            enqueued_at: self.enqueued_at,
            dequeued_at: self.dequeued_at,
            done_at: None,
        }
    }
}

/// A finished unit of work, as fed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    pub query_id: u64,
    pub worker_id: WorkerId,
    pub sent_at: f64,
    pub enqueued_at: f64,
    #[serde(default)]
    pub dequeued_at: Option<f64>,
    #[serde(default)]
    pub done_at: Option<f64>,
}

impl CompletionRecord {
    /// End-to-end latency in milliseconds, from the enqueue request to
    /// completion. `None` until the record has been completed.
    pub fn latency_ms(&self) -> Option<f64> {
        self.done_at.map(|done| (done - self.sent_at) * 1000.0)
    }
}

// ── Queue engine status ───────────────────────────────────────────

/// Point-in-time status read from the queue engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStatus {
    /// Raw arrival timestamps (unix ns) since the previous status read.
    pub arrival_ts_ns: Vec<i64>,
    /// Routable queues.
    pub queues: Vec<WorkerId>,
    /// Depth of each routable queue, parallel to `queues`.
    pub queue_sizes: Vec<u64>,
    /// Deregistered queues that still hold items.
    pub dropped_queues: Vec<WorkerId>,
    /// Depth of each dropped queue, parallel to `dropped_queues`.
    pub dropped_queue_sizes: Vec<u64>,
    /// Sum over routable and dropped queues.
    pub total_queue_size: u64,
    pub num_active_replica: u32,
    pub current_time_ns: i64,
    /// Fractional probability currently published.
    pub fractional_value: f64,
}

impl QueueStatus {
    /// Items waiting in any queue, draining queues and orphans included.
    pub fn backlog(&self) -> u64 {
        let per_queue: u64 =
            self.queue_sizes.iter().sum::<u64>() + self.dropped_queue_sizes.iter().sum::<u64>();
        self.total_queue_size.max(per_queue)
    }
}

// ── Control types ─────────────────────────────────────────────────

/// Feature vector handed to a controller once per tick.
///
/// Built fresh each tick and never mutated once a controller sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    /// End-to-end latencies (ms) of requests completed since last tick.
    pub latencies_ms: Vec<f64>,
    /// Inter-arrival deltas (ms) of requests admitted since last tick.
    pub interarrival_ms: Vec<f64>,
    /// Number of requests admitted since last tick.
    pub arrivals: usize,
    /// Current replicas; the fractional part is probabilistic capacity.
    pub replicas: f64,
    /// Items waiting across worker queues.
    pub backlog: u64,
}

impl MetricsSnapshot {
    /// Number of completions observed this tick.
    pub fn completions(&self) -> usize {
        self.latencies_ms.len()
    }

    /// Whether nothing arrived and nothing completed this tick.
    pub fn is_idle(&self) -> bool {
        self.arrivals == 0 && self.latencies_ms.is_empty()
    }
}

/// What a controller wants done this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ControllerAction {
    /// Relative change in replicas; may be fractional.
    Delta(f64),
    /// Absolute replica target.
    Absolute(f64),
    /// Leave scaling to an external mechanism.
    DoNotScale,
}

impl ControllerAction {
    /// The action returned when there is no signal.
    pub const NEUTRAL: Self = Self::Delta(0.0);

    /// Magnitude recorded in status logs (absolute targets as-is,
    /// `DoNotScale` as zero).
    pub fn recorded_value(&self) -> f64 {
        match self {
            Self::Delta(d) => *d,
            Self::Absolute(t) => *t,
            Self::DoNotScale => 0.0,
        }
    }
}

/// Bounded, rounded replica target produced by the scaling policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingTarget {
    /// Whole replicas requested from the external scaler.
    pub replicas: u32,
    /// Fractional remainder in [0, 1), published to workers.
    pub fraction: f64,
}

impl ScalingTarget {
    pub fn new(replicas: u32, fraction: f64) -> Self {
        Self {
            replicas,
            fraction: clamp_unit(fraction),
        }
    }

    /// Replica count as a real number (integer part + remainder).
    pub fn as_f64(&self) -> f64 {
        self.replicas as f64 + self.fraction
    }
}

/// Probabilistic throttling parameters shared with every worker.
///
/// Absence reads as the default: probability 0, no delay, no throttling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FractionalParameters {
    /// Probability in [0, 1) that a worker skips a work cycle.
    pub probability: f64,
    /// How long a skipped cycle sleeps.
    pub delay: Duration,
}

impl FractionalParameters {
    pub fn new(probability: f64, delay: Duration) -> Self {
        Self {
            probability: clamp_unit(probability),
            delay,
        }
    }

    /// Whether these parameters never throttle.
    pub fn is_disabled(&self) -> bool {
        self.probability <= 0.0
    }
}

/// Clamp into [0, 1); NaN reads as 0.
fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() || value <= 0.0 {
        0.0
    } else if value >= 1.0 {
        1.0 - f64::EPSILON
    } else {
        value
    }
}

// ── Worker lifecycle ──────────────────────────────────────────────

/// Lifecycle state of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting for the start gate; nothing registered yet.
    Registering,
    /// Queue registered, pulling work.
    Active,
    /// Deregistered, flushing locally queued work.
    Draining,
    /// Drain finished and monitors joined.
    Terminated,
}

impl WorkerState {
    /// Whether `next` is a legal forward transition from `self`.
    ///
    /// A worker stopped before it ever registered goes straight to
    /// `Terminated`; there is nothing to drain.
    pub fn can_advance_to(self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (Self::Registering, Self::Active)
                | (Self::Registering, Self::Terminated)
                | (Self::Active, Self::Draining)
                | (Self::Draining, Self::Terminated)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Terminated
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registering => "registering",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}
