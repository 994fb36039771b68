//! Controllers that do not follow the metrics: delegation to an
//! external autoscaler, the no-op baseline, and a random walk.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use fracscale_core::{ControllerAction, MetricsSnapshot, PassthroughConfig};

use crate::controller::Controller;

/// Hands scaling to an external autoscaler; every tick is `DoNotScale`.
#[derive(Debug, Clone)]
pub struct Passthrough {
    target_cpu: u32,
    max_replicas: u32,
}

impl Passthrough {
    pub fn new(config: &PassthroughConfig) -> Self {
        info!(
            target_cpu = config.target_cpu,
            max_replicas = config.max_replicas,
            "scaling delegated to external autoscaler"
        );
        Self {
            target_cpu: config.target_cpu,
            max_replicas: config.max_replicas,
        }
    }

    /// The (target CPU %, max replicas) handed to the external autoscaler.
    pub fn delegated(&self) -> (u32, u32) {
        (self.target_cpu, self.max_replicas)
    }
}

impl Controller for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn action(&mut self, _snapshot: &MetricsSnapshot) -> ControllerAction {
        ControllerAction::DoNotScale
    }
}

/// Baseline: never changes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoNothing;

impl Controller for DoNothing {
    fn name(&self) -> &'static str {
        "do_nothing"
    }

    fn action(&mut self, _snapshot: &MetricsSnapshot) -> ControllerAction {
        ControllerAction::NEUTRAL
    }
}

/// Alternates adding and removing a random number of replicas in
/// `[1, 40)`, starting with an addition.
#[derive(Debug)]
pub struct RandomAddDelete {
    should_add: bool,
    rng: StdRng,
}

impl RandomAddDelete {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            should_add: true,
            rng,
        }
    }
}

impl Default for RandomAddDelete {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for RandomAddDelete {
    fn name(&self) -> &'static str {
        "random"
    }

    fn action(&mut self, _snapshot: &MetricsSnapshot) -> ControllerAction {
        let amount = f64::from(self.rng.gen_range(1u32..40));
        let delta = if self.should_add { amount } else { -amount };
        self.should_add = !self.should_add;

        debug!(delta, "random step");
        ControllerAction::Delta(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_never_scales() {
        let mut ctl = Passthrough::new(&PassthroughConfig::default());
        assert_eq!(ctl.delegated(), (50, 72));
        let busy = MetricsSnapshot {
            latencies_ms: vec![10_000.0; 50],
            arrivals: 500,
            ..Default::default()
        };
        assert_eq!(ctl.action(&busy), ControllerAction::DoNotScale);
    }

    #[test]
    fn do_nothing_is_neutral() {
        let busy = MetricsSnapshot {
            latencies_ms: vec![10_000.0; 50],
            ..Default::default()
        };
        assert_eq!(DoNothing.action(&busy), ControllerAction::NEUTRAL);
    }

    #[test]
    fn random_alternates_sign_within_range() {
        let mut ctl = RandomAddDelete::with_seed(7);
        let snap = MetricsSnapshot::default();
        for i in 0..20 {
            let ControllerAction::Delta(d) = ctl.action(&snap) else {
                panic!("expected a delta");
            };
            if i % 2 == 0 {
                assert!((1.0..40.0).contains(&d), "tick {i}: {d}");
            } else {
                assert!((-39.0..=-1.0).contains(&d), "tick {i}: {d}");
            }
            assert_eq!(d.fract(), 0.0);
        }
    }
}
