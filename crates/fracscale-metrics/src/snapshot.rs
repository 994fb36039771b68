//! Snapshot builder — converts completion records and a queue-engine
//! status read into a [`MetricsSnapshot`].

use tracing::debug;

use fracscale_core::{CompletionRecord, MetricsSnapshot, QueueStatus};

/// Builds one [`MetricsSnapshot`] per control tick.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotBuilder {
    /// Add the published fractional remainder to the replica count.
    track_fraction: bool,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self {
            track_fraction: true,
        }
    }
}

impl SnapshotBuilder {
    pub fn new(track_fraction: bool) -> Self {
        Self { track_fraction }
    }

    /// Build the snapshot for this tick.
    ///
    /// `completions` are the records drained since the previous tick,
    /// `status` the single status read for this tick, and `fraction` the
    /// fractional remainder currently published. Zero completions and
    /// zero arrivals are fine: the sequences are simply empty.
    pub fn build(
        &self,
        completions: &[CompletionRecord],
        status: &QueueStatus,
        fraction: f64,
    ) -> MetricsSnapshot {
        let latencies_ms: Vec<f64> = completions
            .iter()
            .filter_map(CompletionRecord::latency_ms)
            .filter(|l| l.is_finite())
            .collect();

        let mut replicas = status.num_active_replica as f64;
        if self.track_fraction && fraction.is_finite() && fraction > 0.0 {
            replicas += fraction.min(1.0);
        }

        let snapshot = MetricsSnapshot {
            latencies_ms,
            interarrival_ms: interarrival_deltas_ms(&status.arrival_ts_ns),
            arrivals: status.arrival_ts_ns.len(),
            replicas,
            backlog: status.backlog(),
        };

        debug!(
            completions = snapshot.completions(),
            arrivals = snapshot.arrivals,
            replicas = snapshot.replicas,
            backlog = snapshot.backlog,
            "snapshot built"
        );
        snapshot
    }
}

/// Consecutive differences of raw arrival timestamps (ns), in ms.
pub fn interarrival_deltas_ms(arrival_ts_ns: &[i64]) -> Vec<f64> {
    arrival_ts_ns
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 / 1e6)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sent_at: f64, done_at: Option<f64>) -> CompletionRecord {
        CompletionRecord {
            query_id: 0,
            worker_id: "w".to_string(),
            sent_at,
            enqueued_at: sent_at,
            dequeued_at: None,
            done_at,
        }
    }

    fn status(active: u32, sizes: Vec<u64>, arrivals: Vec<i64>) -> QueueStatus {
        QueueStatus {
            arrival_ts_ns: arrivals,
            queues: (0..sizes.len()).map(|i| format!("q-{i}")).collect(),
            queue_sizes: sizes,
            num_active_replica: active,
            ..Default::default()
        }
    }

    #[test]
    fn empty_tick_builds_empty_snapshot() {
        let snap = SnapshotBuilder::default().build(&[], &QueueStatus::default(), 0.0);
        assert!(snap.latencies_ms.is_empty());
        assert!(snap.interarrival_ms.is_empty());
        assert_eq!(snap.arrivals, 0);
        assert_eq!(snap.replicas, 0.0);
        assert_eq!(snap.backlog, 0);
        assert!(snap.is_idle());
    }

    #[test]
    fn latencies_in_milliseconds() {
        let completions = vec![record(10.0, Some(10.1)), record(10.0, Some(10.25))];
        let snap = SnapshotBuilder::default().build(&completions, &QueueStatus::default(), 0.0);
        assert_eq!(snap.latencies_ms.len(), 2);
        assert!((snap.latencies_ms[0] - 100.0).abs() < 1e-6);
        assert!((snap.latencies_ms[1] - 250.0).abs() < 1e-6);
    }

    #[test]
    fn uncompleted_records_are_skipped() {
        let completions = vec![record(10.0, None), record(10.0, Some(10.5))];
        let snap = SnapshotBuilder::default().build(&completions, &QueueStatus::default(), 0.0);
        assert_eq!(snap.completions(), 1);
    }

    #[test]
    fn arrivals_and_deltas() {
        let st = status(2, vec![3, 4], vec![1_000_000, 3_000_000, 6_000_000]);
        let snap = SnapshotBuilder::default().build(&[], &st, 0.0);
        assert_eq!(snap.arrivals, 3);
        assert_eq!(snap.interarrival_ms, vec![2.0, 3.0]);
        assert_eq!(snap.backlog, 7);
    }

    #[test]
    fn backlog_counts_draining_queues_and_orphans() {
        let mut st = status(1, vec![2], vec![]);
        st.dropped_queues = vec!["retired".to_string()];
        st.dropped_queue_sizes = vec![5];
        let snap = SnapshotBuilder::default().build(&[], &st, 0.0);
        assert_eq!(snap.backlog, 7);

        // Orphans only show up in the engine's total.
        st.total_queue_size = 10;
        let snap = SnapshotBuilder::default().build(&[], &st, 0.0);
        assert_eq!(snap.backlog, 10);
    }

    #[test]
    fn fraction_added_to_replicas_when_tracked() {
        let st = status(10, vec![0; 10], vec![]);
        let snap = SnapshotBuilder::default().build(&[], &st, 0.3);
        assert!((snap.replicas - 10.3).abs() < 1e-9);

        let snap = SnapshotBuilder::new(false).build(&[], &st, 0.3);
        assert_eq!(snap.replicas, 10.0);
    }

    #[test]
    fn single_arrival_has_no_delta() {
        assert!(interarrival_deltas_ms(&[5]).is_empty());
        assert!(interarrival_deltas_ms(&[]).is_empty());
    }
}
