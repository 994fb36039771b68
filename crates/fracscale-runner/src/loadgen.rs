//! Open-loop load generator replaying recorded inter-arrival deltas.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fracscale_core::clock::epoch_secs_f64;
use fracscale_queue::params::LOAD_GATE;
use fracscale_queue::{ParamStore, QueueEngine};

/// Read inter-arrival deltas (ms): a JSON array, or one number per line
/// (blank lines and `#` comments skipped).
pub fn read_deltas(path: &Path) -> anyhow::Result<Vec<f64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read load file {}", path.display()))?;
    parse_deltas(&content).with_context(|| format!("invalid load file {}", path.display()))
}

fn parse_deltas(content: &str) -> anyhow::Result<Vec<f64>> {
    let deltas: Vec<f64> = if content.trim_start().starts_with('[') {
        serde_json::from_str(content)?
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| {
                l.parse::<f64>()
                    .with_context(|| format!("`{l}` is not a number"))
            })
            .collect::<anyhow::Result<_>>()?
    };

    if let Some(bad) = deltas.iter().find(|d| !d.is_finite() || **d < 0.0) {
        anyhow::bail!("delta {bad} must be a non-negative number of milliseconds");
    }
    Ok(deltas)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub sent: u64,
    /// Enqueue attempts that had to be retried.
    pub retries: u64,
    pub cancelled: bool,
}

pub struct LoadGenerator {
    engine: Arc<dyn QueueEngine>,
    params: Arc<dyn ParamStore>,
    deltas_ms: Vec<f64>,
    payload: String,
    poll: Duration,
}

impl LoadGenerator {
    pub fn new(
        engine: Arc<dyn QueueEngine>,
        params: Arc<dyn ParamStore>,
        deltas_ms: Vec<f64>,
        payload_bytes: usize,
    ) -> Self {
        Self {
            engine,
            params,
            deltas_ms,
            payload: "1".repeat(payload_bytes),
            poll: Duration::from_secs(1),
        }
    }

    /// How often the start conditions and failed enqueues are retried.
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Total workload size.
    pub fn total(&self) -> u64 {
        self.deltas_ms.len() as u64
    }

    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<LoadReport> {
        let mut report = LoadReport::default();

        if !self.wait_to_start(&cancel).await {
            report.cancelled = true;
            return Ok(report);
        }
        info!(queries = self.deltas_ms.len(), "load generator started");

        for (seq, delta_ms) in self.deltas_ms.iter().enumerate() {
            loop {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    info!(sent = report.sent, "load generator cancelled");
                    return Ok(report);
                }
                match self
                    .engine
                    .enqueue(&self.payload, epoch_secs_f64(), seq as u64)
                    .await
                {
                    Ok(queue) => {
                        debug!(seq, %queue, "query enqueued");
                        report.sent += 1;
                        break;
                    }
                    Err(e) => {
                        warn!(seq, error = %e, "enqueue failed, retrying");
                        report.retries += 1;
                        self.pause(self.poll, &cancel).await;
                    }
                }
            }
            self.pause(Duration::from_secs_f64(delta_ms / 1000.0), &cancel)
                .await;
        }

        info!(sent = report.sent, "load generator finished");
        Ok(report)
    }

    /// Wait for the load gate and at least one registered queue.
    async fn wait_to_start(&self, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let gate = self.params.flag(LOAD_GATE).await.unwrap_or_else(|e| {
                warn!(error = %e, "load gate read failed");
                false
            });
            if gate {
                match self.engine.status().await {
                    Ok(status) if !status.queues.is_empty() => return true,
                    Ok(_) => debug!("waiting for a registered queue"),
                    Err(e) => warn!(error = %e, "status read failed"),
                }
            }
            self.pause(self.poll, cancel).await;
        }
    }

    async fn pause(&self, duration: Duration, cancel: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = cancel.cancelled() => {}
        }
    }
}
