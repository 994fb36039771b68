//! The worker: start gate, registration, pull loop, and drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fracscale_core::clock::epoch_secs_f64;
use fracscale_core::{FractionalParameters, WorkItem, WorkerConfig, WorkerState};
use fracscale_queue::params::WORKER_GATE;
use fracscale_queue::{ParamStore, QueueEngine};

use crate::fractional::{FractionalPoller, FractionalThrottle};
use crate::handler::WorkHandler;
use crate::heartbeat::HeartbeatBeacon;
use crate::lifecycle::Lifecycle;
use crate::shutdown::ShutdownLatch;
use crate::watcher::{TerminationProbe, TerminationWatcher};

/// Timing knobs for one worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Bounded wait of a single pop; also how often shutdown is noticed
    /// while idle.
    pub pop_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Gap between acknowledged heartbeats after which the queue is
    /// treated as stale.
    pub heartbeat_lapse: Duration,
    pub fractional_poll: Duration,
    pub termination_poll: Duration,
    pub gate_poll: Duration,
    pub fractional_enabled: bool,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            pop_timeout: config.pop_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_lapse: config.heartbeat_lapse(),
            fractional_poll: config.fractional_poll(),
            termination_poll: config.termination_poll(),
            gate_poll: config.gate_poll(),
            fractional_enabled: config.fractional_enabled,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

/// Counters returned when a worker terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Items handled by the main loop.
    pub processed: u64,
    /// Items flushed from the local queue during drain.
    pub drained: u64,
    /// Cycles skipped by the fractional throttle.
    pub skipped_cycles: u64,
    pub reregistrations: u64,
    pub handler_failures: u64,
}

impl WorkerReport {
    pub fn total_handled(&self) -> u64 {
        self.processed + self.drained
    }
}

pub struct Worker {
    id: String,
    engine: Arc<dyn QueueEngine>,
    params: Arc<dyn ParamStore>,
    handler: Arc<dyn WorkHandler>,
    probe: Option<Arc<dyn TerminationProbe>>,
    settings: WorkerSettings,
    latch: ShutdownLatch,
    lifecycle: Lifecycle,
    seed: Option<u64>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        engine: Arc<dyn QueueEngine>,
        params: Arc<dyn ParamStore>,
        handler: Arc<dyn WorkHandler>,
        settings: WorkerSettings,
    ) -> Self {
        let id = id.into();
        Self {
            lifecycle: Lifecycle::new(id.clone()),
            id,
            engine,
            params,
            handler,
            probe: None,
            settings,
            latch: ShutdownLatch::new(),
            seed: None,
        }
    }

    /// Watch `probe` for termination marks while active.
    pub fn with_probe(mut self, probe: Arc<dyn TerminationProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Seed the fractional throttle (for testing).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handle for local shutdown requests.
    pub fn latch(&self) -> ShutdownLatch {
        self.latch.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.lifecycle.subscribe()
    }

    /// Run the worker until it has drained and its monitors have joined.
    pub async fn run(self) -> anyhow::Result<WorkerReport> {
        let mut report = WorkerReport::default();
        info!(worker = %self.id, "worker starting");

        if !self.wait_for_gate().await || !self.register().await {
            self.lifecycle.advance(WorkerState::Terminated)?;
            info!(worker = %self.id, "worker stopped before registering");
            return Ok(report);
        }
        self.lifecycle.advance(WorkerState::Active)?;

        let monitors = CancellationToken::new();
        let (fractional_tx, fractional_rx) = watch::channel(FractionalParameters::default());
        let mut throttle = match self.seed {
            Some(seed) => FractionalThrottle::with_seed(fractional_rx, seed),
            None => FractionalThrottle::new(fractional_rx),
        };

        let beacon = HeartbeatBeacon::new(
            self.id.clone(),
            self.engine.clone(),
            self.settings.heartbeat_interval,
            self.settings.heartbeat_lapse,
        );
        let stale = beacon.stale_flag();
        let mut handles: Vec<JoinHandle<()>> = vec![tokio::spawn(beacon.run(monitors.clone()))];

        if self.settings.fractional_enabled {
            let poller = FractionalPoller::new(
                self.id.clone(),
                self.params.clone(),
                fractional_tx,
                self.settings.fractional_poll,
            );
            handles.push(tokio::spawn(poller.run(monitors.clone())));
        }
        if let Some(probe) = &self.probe {
            let watcher = TerminationWatcher::new(
                self.id.clone(),
                probe.clone(),
                self.latch.clone(),
                self.settings.termination_poll,
            );
            handles.push(tokio::spawn(watcher.run(monitors.clone())));
        }

        self.pull_loop(&mut throttle, &stale, &mut report).await;

        self.lifecycle.advance(WorkerState::Draining)?;
        if self.latch.claim_drain() {
            self.drain(&mut report).await;
        } else {
            debug!(worker = %self.id, "drain already claimed");
        }

        monitors.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(worker = %self.id, error = %e, "monitor task failed");
            }
        }
        self.lifecycle.advance(WorkerState::Terminated)?;

        info!(
            worker = %self.id,
            processed = report.processed,
            drained = report.drained,
            skipped = report.skipped_cycles,
            reason = ?self.latch.reason(),
            "worker terminated"
        );
        Ok(report)
    }

    /// Wait for the start gate. `false` if shut down first.
    async fn wait_for_gate(&self) -> bool {
        loop {
            if self.latch.is_triggered() {
                return false;
            }
            match self.params.flag(WORKER_GATE).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!(worker = %self.id, error = %e, "gate read failed"),
            }
            self.pause(self.settings.gate_poll).await;
        }
    }

    /// Register the queue, retrying transient failures. `false` if shut
    /// down first.
    async fn register(&self) -> bool {
        loop {
            if self.latch.is_triggered() {
                return false;
            }
            match self.engine.register(&self.id).await {
                Ok(()) => {
                    info!(worker = %self.id, "queue registered");
                    return true;
                }
                Err(e) => warn!(worker = %self.id, error = %e, "registration failed"),
            }
            self.pause(self.settings.gate_poll).await;
        }
    }

    async fn pull_loop(
        &self,
        throttle: &mut FractionalThrottle,
        stale: &AtomicBool,
        report: &mut WorkerReport,
    ) {
        while !self.latch.is_triggered() {
            if stale.swap(false, Ordering::AcqRel) {
                match self.engine.register(&self.id).await {
                    Ok(()) => {
                        report.reregistrations += 1;
                        info!(worker = %self.id, "queue re-registered after lapse");
                    }
                    Err(e) => {
                        warn!(worker = %self.id, error = %e, "re-registration failed");
                        stale.store(true, Ordering::Release);
                        self.pause(self.settings.pop_timeout).await;
                        continue;
                    }
                }
            }

            if let Some(delay) = throttle.check() {
                report.skipped_cycles += 1;
                self.pause(delay).await;
                continue;
            }

            match self.engine.pop(&self.id, self.settings.pop_timeout).await {
                Ok(Some(item)) => {
                    self.process(item, report).await;
                    report.processed += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker = %self.id, error = %e, "pop failed");
                    self.pause(self.settings.pop_timeout).await;
                }
            }
        }
    }

    /// Deregister, then flush everything still queued locally. Runs to
    /// completion; failures end the drain early but never the exit path.
    async fn drain(&self, report: &mut WorkerReport) {
        info!(worker = %self.id, reason = ?self.latch.reason(), "draining");

        if let Err(e) = self.engine.deregister(&self.id).await {
            error!(worker = %self.id, error = %e, "drain error: deregister failed");
        }

        loop {
            match self.engine.try_pop(&self.id).await {
                Ok(Some(item)) => {
                    self.process(item, report).await;
                    report.drained += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    error!(worker = %self.id, error = %e, "drain error: backlog flush aborted");
                    break;
                }
            }
        }
        info!(worker = %self.id, drained = report.drained, "drain complete");
    }

    async fn process(&self, mut item: WorkItem, report: &mut WorkerReport) {
        item.dequeued_at = Some(epoch_secs_f64());
        if let Err(e) = self.handler.handle(&item).await {
            report.handler_failures += 1;
            warn!(worker = %self.id, query = item.query_id, error = %e, "work item failed");
        }

        let mut record = item.into_completion(&self.id);
        record.done_at = Some(epoch_secs_f64());
        if let Err(e) = self.engine.complete(record).await {
            warn!(worker = %self.id, error = %e, "completion report failed");
        }
    }

    /// Sleep for `duration`, waking early on shutdown.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.latch.triggered() => {}
        }
    }
}
