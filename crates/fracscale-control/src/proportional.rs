//! Proportional controller on utilization (PID with k_i = k_d = 0).
//!
//! ```text
//! arrival_rate = arrivals / period_s
//! service_rate = replicas / processing_time_s
//! error        = arrival_rate / service_rate − target_utilization
//! action       = k_p · error
//! ```

use std::time::Duration;

use tracing::debug;

use fracscale_core::{ControllerAction, MetricsSnapshot, ProportionalConfig};

use crate::controller::Controller;

#[derive(Debug, Clone)]
pub struct Proportional {
    processing_time_s: f64,
    target_utilization: f64,
    k_p: f64,
    /// Control period in seconds; arrivals are counted per tick.
    window_s: f64,
}

impl Proportional {
    pub fn new(config: &ProportionalConfig, period: Duration) -> Self {
        Self {
            processing_time_s: config.processing_time_s,
            target_utilization: config.target_utilization,
            k_p: config.k_p,
            window_s: period.as_secs_f64(),
        }
    }
}

impl Controller for Proportional {
    fn name(&self) -> &'static str {
        "pid"
    }

    fn action(&mut self, snapshot: &MetricsSnapshot) -> ControllerAction {
        // Cold start: nothing arrived and nothing finished.
        if snapshot.is_idle() {
            return ControllerAction::NEUTRAL;
        }

        if !(self.window_s > 0.0) {
            return ControllerAction::NEUTRAL;
        }
        let arrival_rate = snapshot.arrivals as f64 / self.window_s;
        let service_rate = snapshot.replicas / self.processing_time_s;
        if !(service_rate > 0.0) {
            debug!(replicas = snapshot.replicas, "no serving capacity observed");
            return ControllerAction::NEUTRAL;
        }

        let utilization = arrival_rate / service_rate;
        let error = utilization - self.target_utilization;
        let delta = self.k_p * error;

        debug!(
            arrival_rate,
            service_rate,
            utilization,
            target = self.target_utilization,
            delta,
            "pid evaluated"
        );
        ControllerAction::Delta(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(5);

    fn controller() -> Proportional {
        Proportional::new(
            &ProportionalConfig {
                processing_time_s: 0.5,
                ..Default::default()
            },
            PERIOD,
        )
    }

    fn snapshot(arrivals: usize, completions: usize, replicas: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            latencies_ms: vec![0.0; completions],
            arrivals,
            replicas,
            ..Default::default()
        }
    }

    fn delta(action: ControllerAction) -> f64 {
        match action {
            ControllerAction::Delta(d) => d,
            other => panic!("expected a delta, got {other:?}"),
        }
    }

    #[test]
    fn cold_start_is_neutral() {
        let mut ctl = controller();
        assert_eq!(ctl.action(&MetricsSnapshot::default()), ControllerAction::NEUTRAL);
    }

    #[test]
    fn heavy_arrivals_scale_up() {
        // 100 arrivals / 5s = 20/s against 10 × 2/s: utilization 1.0.
        let mut ctl = controller();
        let d = delta(ctl.action(&snapshot(100, 10, 10.0)));
        assert!(d > 0.0);
        assert!((d - 0.6).abs() < 1e-9, "delta was {d}");
    }

    #[test]
    fn light_arrivals_scale_down() {
        let mut ctl = controller();
        let d = delta(ctl.action(&snapshot(1, 100, 10.0)));
        assert!(d < 0.0);
    }

    #[test]
    fn gain_scales_the_error() {
        let mut ctl = Proportional::new(
            &ProportionalConfig {
                processing_time_s: 0.5,
                k_p: 2.0,
                ..Default::default()
            },
            PERIOD,
        );
        let d = delta(ctl.action(&snapshot(100, 0, 10.0)));
        assert!((d - 1.2).abs() < 1e-9, "delta was {d}");
    }

    #[test]
    fn arrival_rate_follows_control_period() {
        // 100 arrivals over a 10s tick = 10/s against 20/s: utilization 0.5.
        let mut ctl = Proportional::new(
            &ProportionalConfig {
                processing_time_s: 0.5,
                ..Default::default()
            },
            Duration::from_secs(10),
        );
        let d = delta(ctl.action(&snapshot(100, 10, 10.0)));
        assert!((d - 0.1).abs() < 1e-9, "delta was {d}");
    }

    #[test]
    fn zero_replicas_do_not_divide_by_zero() {
        let mut ctl = controller();
        assert_eq!(ctl.action(&snapshot(50, 0, 0.0)), ControllerAction::NEUTRAL);
    }

    #[test]
    fn completions_alone_count_as_signal() {
        // Nothing arrived but work finished: utilization 0, scale down.
        let mut ctl = controller();
        let d = delta(ctl.action(&snapshot(0, 5, 4.0)));
        assert!((d + 0.4).abs() < 1e-9, "delta was {d}");
    }
}
