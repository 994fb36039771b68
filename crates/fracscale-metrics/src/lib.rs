//! fracscale-metrics — turns raw queue-engine observations into the
//! per-tick feature vector controllers consume.
//!
//! # Architecture
//!
//! ```text
//! completion records ─┐
//!                     ├─ SnapshotBuilder::build() → MetricsSnapshot
//! QueueStatus ────────┘
//!
//! stats
//!   ├── percentile()              (None on empty input)
//!   └── LatencySummary            (p25/p50/p95/p99/max for logging)
//! ```
//!
//! Statistics over an empty sample are "no signal" and come back as
//! `None`; they are never computed as zero.

pub mod snapshot;
pub mod stats;

pub use snapshot::{SnapshotBuilder, interarrival_deltas_ms};
pub use stats::{LatencySummary, percentile};
