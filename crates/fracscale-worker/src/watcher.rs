//! Termination watcher: notices when the hosting environment has marked
//! this worker for termination and trips the shutdown latch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::shutdown::{ShutdownLatch, ShutdownReason};

/// Asks the hosting environment whether this worker is being retired.
#[async_trait]
pub trait TerminationProbe: Send + Sync {
    async fn marked_for_termination(&self) -> bool;
}

/// Marked once a marker file exists (e.g. written by a pre-stop hook).
#[derive(Debug, Clone)]
pub struct FileProbe {
    path: PathBuf,
}

impl FileProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TerminationProbe for FileProbe {
    async fn marked_for_termination(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

/// Marked once its token is cancelled. Used by the in-process pool to
/// retire individual workers.
#[derive(Debug, Clone, Default)]
pub struct TokenProbe {
    token: CancellationToken,
}

impl TokenProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) {
        self.token.cancel();
    }

    pub fn is_marked(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[async_trait]
impl TerminationProbe for TokenProbe {
    async fn marked_for_termination(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Polls a probe every `every` until it reports termination or `stop`
/// fires.
pub struct TerminationWatcher {
    worker_id: String,
    probe: Arc<dyn TerminationProbe>,
    latch: ShutdownLatch,
    every: Duration,
}

impl TerminationWatcher {
    pub fn new(
        worker_id: impl Into<String>,
        probe: Arc<dyn TerminationProbe>,
        latch: ShutdownLatch,
        every: Duration,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            probe,
            latch,
            every,
        }
    }

    pub async fn run(self, stop: CancellationToken) {
        debug!(worker = %self.worker_id, every = ?self.every, "termination watcher started");
        loop {
            if self.probe.marked_for_termination().await {
                info!(worker = %self.worker_id, "marked for termination");
                self.latch.trigger(ShutdownReason::MarkedForTermination);
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.every) => {}
                _ = stop.cancelled() => break,
            }
        }
        debug!(worker = %self.worker_id, "termination watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_probe_sees_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("terminate");
        let probe = FileProbe::new(&marker);
        assert!(!probe.marked_for_termination().await);

        std::fs::write(&marker, b"").unwrap();
        assert!(probe.marked_for_termination().await);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_trips_latch() {
        let probe = TokenProbe::new();
        let latch = ShutdownLatch::new();
        let watcher = TerminationWatcher::new(
            "w",
            Arc::new(probe.clone()),
            latch.clone(),
            Duration::from_millis(100),
        );
        let handle = tokio::spawn(watcher.run(CancellationToken::new()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!latch.is_triggered());

        probe.mark();
        handle.await.unwrap();
        assert_eq!(latch.reason(), Some(ShutdownReason::MarkedForTermination));
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_stops_without_triggering() {
        let latch = ShutdownLatch::new();
        let watcher = TerminationWatcher::new(
            "w",
            Arc::new(TokenProbe::new()),
            latch.clone(),
            Duration::from_millis(100),
        );
        let stop = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(stop.clone()));

        stop.cancel();
        handle.await.unwrap();
        assert!(!latch.is_triggered());
    }
}
