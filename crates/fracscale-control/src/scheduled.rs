//! Open-loop controllers: a repeating delta schedule, and the constant
//! single-delta special case.

use tracing::debug;

use fracscale_core::{ConfigResult, ControllerAction, MetricsSnapshot, ScheduledConfig};

use crate::controller::Controller;

/// Applies `deltas[i]` on tick `i` (wrapping) to an internal running
/// count and returns the count as an absolute target.
#[derive(Debug, Clone)]
pub struct Scheduled {
    name: &'static str,
    deltas: Vec<f64>,
    cursor: usize,
    running: Option<f64>,
}

impl Scheduled {
    pub fn from_config(config: &ScheduledConfig) -> ConfigResult<Self> {
        Ok(Self::new(config.deltas()?, config.start_replicas))
    }

    /// A schedule over `deltas`, seeded with `start` or, when `None`,
    /// with the replica count of the first snapshot seen.
    ///
    /// An empty schedule behaves as a single zero delta.
    pub fn new(deltas: Vec<f64>, start: Option<f64>) -> Self {
        let deltas = if deltas.is_empty() { vec![0.0] } else { deltas };
        Self {
            name: "scheduled",
            deltas,
            cursor: 0,
            running: start,
        }
    }

    /// Add `delta` every tick.
    pub fn fixed(delta: f64, start: Option<f64>) -> Self {
        Self {
            name: "fixed",
            ..Self::new(vec![delta], start)
        }
    }

    /// The running count after the last tick, if any.
    pub fn running(&self) -> Option<f64> {
        self.running
    }
}

impl Controller for Scheduled {
    fn name(&self) -> &'static str {
        self.name
    }

    fn action(&mut self, snapshot: &MetricsSnapshot) -> ControllerAction {
        let base = *self.running.get_or_insert(snapshot.replicas.max(0.0));
        let delta = self.deltas[self.cursor];
        self.cursor = (self.cursor + 1) % self.deltas.len();

        let next = (base + delta).max(0.0);
        self.running = Some(next);

        debug!(controller = self.name, base, delta, target = next, "schedule advanced");
        ControllerAction::Absolute(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(ctl: &mut Scheduled, ticks: usize) -> Vec<f64> {
        let snap = MetricsSnapshot::default();
        (0..ticks)
            .map(|_| match ctl.action(&snap) {
                ControllerAction::Absolute(t) => t,
                other => panic!("expected an absolute target, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn pattern_wraps_around() {
        let config = ScheduledConfig {
            pattern: "1/0/-1/0".to_string(),
            start_replicas: Some(10.0),
        };
        let mut ctl = Scheduled::from_config(&config).unwrap();
        assert_eq!(
            targets(&mut ctl, 8),
            vec![11.0, 11.0, 10.0, 10.0, 11.0, 11.0, 10.0, 10.0]
        );
    }

    #[test]
    fn seeded_from_first_snapshot() {
        let mut ctl = Scheduled::new(vec![2.0], None);
        let snap = MetricsSnapshot {
            replicas: 4.0,
            ..Default::default()
        };
        assert_eq!(ctl.action(&snap), ControllerAction::Absolute(6.0));
        // Later snapshots no longer move the running count.
        assert_eq!(ctl.action(&snap), ControllerAction::Absolute(8.0));
        assert_eq!(ctl.running(), Some(8.0));
    }

    #[test]
    fn fixed_adds_constant_delta() {
        let mut ctl = Scheduled::fixed(1.0, Some(3.0));
        assert_eq!(ctl.name(), "fixed");
        assert_eq!(targets(&mut ctl, 3), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn running_count_never_negative() {
        let mut ctl = Scheduled::fixed(-2.0, Some(3.0));
        assert_eq!(targets(&mut ctl, 3), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_schedule_holds() {
        let mut ctl = Scheduled::new(Vec::new(), Some(5.0));
        assert_eq!(targets(&mut ctl, 2), vec![5.0, 5.0]);
    }

    #[test]
    fn invalid_pattern_rejected() {
        let config = ScheduledConfig {
            pattern: "1/x".to_string(),
            start_replicas: None,
        };
        assert!(Scheduled::from_config(&config).is_err());
    }
}
