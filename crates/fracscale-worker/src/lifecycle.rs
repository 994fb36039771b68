//! Forward-only worker state, observable through a `watch` channel.

use tokio::sync::watch;
use tracing::info;

use fracscale_core::WorkerState;

use crate::error::{LifecycleError, LifecycleResult};

#[derive(Debug)]
pub struct Lifecycle {
    worker_id: String,
    tx: watch::Sender<WorkerState>,
}

impl Lifecycle {
    pub fn new(worker_id: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(WorkerState::Registering);
        Self {
            worker_id: worker_id.into(),
            tx,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.tx.subscribe()
    }

    /// Move to `next`; backwards or skipping transitions are rejected.
    pub fn advance(&self, next: WorkerState) -> LifecycleResult<()> {
        let from = self.state();
        if !from.can_advance_to(next) {
            return Err(LifecycleError::InvalidTransition { from, to: next });
        }
        self.tx.send_replace(next);
        info!(worker = %self.worker_id, %from, to = %next, "worker state changed");
        Ok(())
    }
}
