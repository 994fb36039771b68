//! Heartbeat beacon for a worker's queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fracscale_queue::QueueEngine;

/// Refreshes the queue's health record every `interval`.
///
/// Raises `stale` when the engine reports the queue as no longer
/// routable, or when a beat lands more than `lapse` after the previous
/// acknowledged one (the engine may have abandoned the queue meanwhile).
/// The main loop clears the flag after re-registering.
pub struct HeartbeatBeacon {
    worker_id: String,
    engine: Arc<dyn QueueEngine>,
    interval: Duration,
    lapse: Duration,
    stale: Arc<AtomicBool>,
}

impl HeartbeatBeacon {
    pub fn new(
        worker_id: impl Into<String>,
        engine: Arc<dyn QueueEngine>,
        interval: Duration,
        lapse: Duration,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            engine,
            interval,
            lapse,
            stale: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag raised when the queue must be re-registered.
    pub fn stale_flag(&self) -> Arc<AtomicBool> {
        self.stale.clone()
    }

    pub async fn run(self, stop: CancellationToken) {
        debug!(worker = %self.worker_id, interval = ?self.interval, "heartbeat started");
        let mut last_ack = Instant::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.cancelled() => break,
            }

            match self.engine.heartbeat(&self.worker_id).await {
                Ok(true) => {
                    let gap = last_ack.elapsed();
                    last_ack = Instant::now();
                    if gap > self.lapse {
                        warn!(worker = %self.worker_id, gap = ?gap, "heartbeat lapsed, queue marked stale");
                        self.stale.store(true, Ordering::Release);
                    }
                }
                Ok(false) => {
                    last_ack = Instant::now();
                    warn!(worker = %self.worker_id, "queue no longer routable, marked stale");
                    self.stale.store(true, Ordering::Release);
                }
                Err(e) => {
                    warn!(worker = %self.worker_id, error = %e, "heartbeat failed");
                }
            }
        }
        debug!(worker = %self.worker_id, "heartbeat stopped");
    }
}

#[cfg(test)]
mod tests {
    use fracscale_queue::MemoryQueue;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn live_queue_stays_fresh() {
        let engine = MemoryQueue::new(Duration::from_secs(5));
        engine.register("w").await.unwrap();

        let beacon = HeartbeatBeacon::new(
            "w",
            Arc::new(engine.clone()),
            Duration::from_secs(1),
            Duration::from_secs(5),
        );
        let stale = beacon.stale_flag();
        let stop = CancellationToken::new();
        let handle = tokio::spawn(beacon.run(stop.clone()));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!stale.load(Ordering::Acquire));
        assert!(engine.is_routable("w").await);

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_queue_is_flagged() {
        // Beats every 2s against a 500ms engine timeout: the engine
        // abandons the queue before the first beat arrives.
        let engine = MemoryQueue::new(Duration::from_millis(500));
        engine.register("w").await.unwrap();

        let beacon = HeartbeatBeacon::new(
            "w",
            Arc::new(engine.clone()),
            Duration::from_secs(2),
            Duration::from_millis(500),
        );
        let stale = beacon.stale_flag();
        let stop = CancellationToken::new();
        let handle = tokio::spawn(beacon.run(stop.clone()));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(stale.load(Ordering::Acquire));
        assert!(!engine.is_routable("w").await);

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_queue_is_flagged() {
        let engine = MemoryQueue::new(Duration::from_secs(5));
        let beacon = HeartbeatBeacon::new(
            "ghost",
            Arc::new(engine),
            Duration::from_millis(100),
            Duration::from_secs(5),
        );
        let stale = beacon.stale_flag();
        let stop = CancellationToken::new();
        let handle = tokio::spawn(beacon.run(stop.clone()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(stale.load(Ordering::Acquire));

        stop.cancel();
        handle.await.unwrap();
    }
}
