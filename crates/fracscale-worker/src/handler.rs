//! Work execution.

use std::time::Duration;

use async_trait::async_trait;

use fracscale_core::WorkItem;

/// Executes one unit of work. Payloads are opaque to the worker.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn handle(&self, item: &WorkItem) -> anyhow::Result<()>;
}

/// Stand-in workload: sleeps a fixed processing time per item.
#[derive(Debug, Clone, Copy)]
pub struct SleepHandler {
    processing_time: Duration,
}

impl SleepHandler {
    pub fn new(processing_time: Duration) -> Self {
        Self { processing_time }
    }
}

impl Default for SleepHandler {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

#[async_trait]
impl WorkHandler for SleepHandler {
    async fn handle(&self, _item: &WorkItem) -> anyhow::Result<()> {
        if !self.processing_time.is_zero() {
            tokio::time::sleep(self.processing_time).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleeps_processing_time() {
        let item = WorkItem {
            query_id: 1,
            payload: "1".repeat(100),
            sent_at: 0.0,
            enqueued_at: 0.0,
            dequeued_at: None,
        };
        let start = tokio::time::Instant::now();
        SleepHandler::default().handle(&item).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
