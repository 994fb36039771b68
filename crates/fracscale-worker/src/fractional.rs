//! Fractional capacity: probabilistic skipping of work cycles.
//!
//! The poller copies the published [`FractionalParameters`] into a
//! `watch` cell; the main loop asks the throttle before every pull.
//! Across many workers and cycles the skipped share approaches `p`.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fracscale_core::FractionalParameters;
use fracscale_queue::ParamStore;

/// Minimum spacing between "published probability" log lines.
const LOG_EVERY: Duration = Duration::from_secs(10);

/// Per-worker skip decision over the latest published parameters.
#[derive(Debug)]
pub struct FractionalThrottle {
    params: watch::Receiver<FractionalParameters>,
    rng: StdRng,
}

impl FractionalThrottle {
    pub fn new(params: watch::Receiver<FractionalParameters>) -> Self {
        Self::with_rng(params, StdRng::from_entropy())
    }

    pub fn with_seed(params: watch::Receiver<FractionalParameters>, seed: u64) -> Self {
        Self::with_rng(params, StdRng::seed_from_u64(seed))
    }

    fn with_rng(params: watch::Receiver<FractionalParameters>, rng: StdRng) -> Self {
        Self { params, rng }
    }

    /// `Some(delay)` when this cycle should be skipped.
    pub fn check(&mut self) -> Option<Duration> {
        let params = *self.params.borrow();
        if params.is_disabled() {
            return None;
        }
        let draw: f64 = self.rng.gen_range(0.0..1.0);
        (draw <= params.probability).then_some(params.delay)
    }
}

/// Background task refreshing the fractional cell from the param store.
pub struct FractionalPoller {
    worker_id: String,
    params: Arc<dyn ParamStore>,
    cell: watch::Sender<FractionalParameters>,
    every: Duration,
}

impl FractionalPoller {
    pub fn new(
        worker_id: impl Into<String>,
        params: Arc<dyn ParamStore>,
        cell: watch::Sender<FractionalParameters>,
        every: Duration,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            params,
            cell,
            every,
        }
    }

    /// Read the store once and publish the value into the cell when it
    /// changed. Read failures keep the previous value.
    pub async fn refresh(&self) -> Option<FractionalParameters> {
        match self.params.fractional().await {
            Ok(latest) => {
                self.cell.send_if_modified(|current| {
                    if *current == latest {
                        false
                    } else {
                        *current = latest;
                        true
                    }
                });
                Some(latest)
            }
            Err(e) => {
                warn!(worker = %self.worker_id, error = %e, "fractional poll failed");
                None
            }
        }
    }

    pub async fn run(self, stop: CancellationToken) {
        debug!(worker = %self.worker_id, every = ?self.every, "fractional poller started");
        let mut last_log: Option<Instant> = None;

        loop {
            if let Some(latest) = self.refresh().await
                && last_log.is_none_or(|at| at.elapsed() >= LOG_EVERY)
            {
                info!(
                    worker = %self.worker_id,
                    probability = latest.probability,
                    delay = ?latest.delay,
                    "fractional parameters"
                );
                last_log = Some(Instant::now());
            }

            tokio::select! {
                _ = tokio::time::sleep(self.every) => {}
                _ = stop.cancelled() => break,
            }
        }
        debug!(worker = %self.worker_id, "fractional poller stopped");
    }
}
