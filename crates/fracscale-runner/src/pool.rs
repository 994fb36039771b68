//! In-process worker pool driven through the [`Scaler`] capability.
//!
//! Scale-up spawns workers against the shared engine. Scale-down marks
//! the newest workers for termination through their probes; they drain
//! their local queues before exiting, exactly as a retired replica would.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fracscale_queue::{ParamStore, QueueEngine};
use fracscale_worker::{
    ShutdownLatch, ShutdownReason, TokenProbe, WorkHandler, Worker, WorkerReport, WorkerSettings,
};

use crate::error::ScaleResult;
use crate::scaler::Scaler;

/// Totals over every worker the pool has run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub workers: u64,
    pub processed: u64,
    pub drained: u64,
    pub skipped_cycles: u64,
    pub reregistrations: u64,
    /// Workers whose task failed or panicked.
    pub failed: u64,
}

impl PoolReport {
    pub fn total_handled(&self) -> u64 {
        self.processed + self.drained
    }

    fn absorb(&mut self, report: &WorkerReport) {
        self.workers += 1;
        self.processed += report.processed;
        self.drained += report.drained;
        self.skipped_cycles += report.skipped_cycles;
        self.reregistrations += report.reregistrations;
    }
}

struct Member {
    id: String,
    latch: ShutdownLatch,
    probe: TokenProbe,
    handle: JoinHandle<anyhow::Result<WorkerReport>>,
}

#[derive(Default)]
struct PoolState {
    live: Vec<Member>,
    retiring: Vec<Member>,
    next_id: u64,
    report: PoolReport,
}

impl PoolState {
    async fn join(&mut self, member: Member) {
        match member.handle.await {
            Ok(Ok(report)) => self.report.absorb(&report),
            Ok(Err(e)) => {
                warn!(worker = %member.id, error = %e, "worker failed");
                self.report.failed += 1;
            }
            Err(e) => {
                warn!(worker = %member.id, error = %e, "worker task panicked");
                self.report.failed += 1;
            }
        }
    }

    /// Join workers that already exited.
    async fn reap(&mut self) {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retiring)
            .into_iter()
            .partition(|m| m.handle.is_finished());
        self.retiring = pending;
        for member in done {
            self.join(member).await;
        }

        let (done, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut self.live)
            .into_iter()
            .partition(|m| m.handle.is_finished());
        self.live = alive;
        for member in done {
            self.join(member).await;
        }
    }
}

pub struct LocalPoolScaler {
    engine: Arc<dyn QueueEngine>,
    params: Arc<dyn ParamStore>,
    handler: Arc<dyn WorkHandler>,
    settings: WorkerSettings,
    state: Mutex<PoolState>,
}

impl LocalPoolScaler {
    pub fn new(
        engine: Arc<dyn QueueEngine>,
        params: Arc<dyn ParamStore>,
        handler: Arc<dyn WorkHandler>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            engine,
            params,
            handler,
            settings,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Workers not yet marked for termination.
    pub async fn live_count(&self) -> usize {
        self.state.lock().await.live.len()
    }

    /// Workers marked for termination that are still draining.
    pub async fn retiring_count(&self) -> usize {
        self.state.lock().await.retiring.len()
    }

    /// Stop every worker and wait for all of them to drain.
    pub async fn shutdown(&self) -> PoolReport {
        let mut state = self.state.lock().await;
        let live = std::mem::take(&mut state.live);
        let retiring = std::mem::take(&mut state.retiring);
        info!(live = live.len(), retiring = retiring.len(), "shutting down worker pool");

        for member in &live {
            member.latch.trigger(ShutdownReason::Signal);
        }
        for member in live.into_iter().chain(retiring) {
            state.join(member).await;
        }

        info!(
            workers = state.report.workers,
            handled = state.report.total_handled(),
            "worker pool stopped"
        );
        state.report
    }

    fn spawn_member(&self, id: String) -> Member {
        let probe = TokenProbe::new();
        let worker = Worker::new(
            id.clone(),
            self.engine.clone(),
            self.params.clone(),
            self.handler.clone(),
            self.settings.clone(),
        )
        .with_probe(Arc::new(probe.clone()));
        let latch = worker.latch();
        let handle = tokio::spawn(worker.run());
        Member {
            id,
            latch,
            probe,
            handle,
        }
    }
}

#[async_trait]
impl Scaler for LocalPoolScaler {
    fn name(&self) -> &'static str {
        "local-pool"
    }

    async fn apply(&self, replicas: u32) -> ScaleResult<u32> {
        let mut state = self.state.lock().await;
        state.reap().await;

        let current = state.live.len();
        let wanted = replicas as usize;
        if wanted > current {
            for _ in current..wanted {
                let id = format!("worker-{}", state.next_id);
                state.next_id += 1;
                let member = self.spawn_member(id);
                state.live.push(member);
            }
            info!(from = current, to = wanted, "pool scaled up");
        } else if wanted < current {
            let retired = state.live.split_off(wanted);
            for member in &retired {
                member.probe.mark();
            }
            info!(
                from = current,
                to = wanted,
                retired = ?retired.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
                "pool scaled down"
            );
            state.retiring.extend(retired);
        }
        Ok(replicas)
    }
}
