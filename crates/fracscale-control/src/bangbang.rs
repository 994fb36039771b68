//! Bang-bang controller on tail latency.
//!
//! Holds p99 between two watermarks derived from the SLO: a fixed step
//! down below the low watermark, a fixed step up above the high one.

use tracing::debug;

use fracscale_core::{BangBangConfig, ControllerAction, MetricsSnapshot};
use fracscale_metrics::percentile;

use crate::controller::Controller;

#[derive(Debug, Clone)]
pub struct BangBang {
    low_ms: f64,
    high_ms: f64,
    step: f64,
}

impl BangBang {
    pub fn new(config: &BangBangConfig) -> Self {
        Self {
            low_ms: config.low_fraction * config.slo_ms,
            high_ms: config.high_fraction * config.slo_ms,
            step: config.step,
        }
    }

    /// Default watermarks (0.5, 0.8) and step (0.8) around `slo_ms`.
    pub fn with_slo(slo_ms: f64) -> Self {
        Self::new(&BangBangConfig {
            slo_ms,
            ..Default::default()
        })
    }

    pub fn watermarks(&self) -> (f64, f64) {
        (self.low_ms, self.high_ms)
    }
}

impl Controller for BangBang {
    fn name(&self) -> &'static str {
        "bangbang"
    }

    fn action(&mut self, snapshot: &MetricsSnapshot) -> ControllerAction {
        let Some(p99) = percentile(&snapshot.latencies_ms, 99.0) else {
            return ControllerAction::NEUTRAL;
        };

        let action = if p99 < self.low_ms {
            ControllerAction::Delta(-self.step)
        } else if p99 > self.high_ms {
            ControllerAction::Delta(self.step)
        } else {
            ControllerAction::NEUTRAL
        };

        debug!(p99, low = self.low_ms, high = self.high_ms, ?action, "bangbang evaluated");
        action
    }
}
