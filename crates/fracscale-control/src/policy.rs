//! Scaling policy — clamps, rounds, and splits a controller action into
//! whole replicas plus a fractional remainder.

use serde::{Deserialize, Serialize};
use tracing::debug;

use fracscale_core::{ConfigError, ConfigResult, ControllerAction, PolicyConfig, ScalingTarget};

/// Outcome of applying the policy to one controller action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The controller delegated scaling; nothing is applied this tick.
    Skip,
    Scale {
        target: ScalingTarget,
        /// Target before clamping and rounding.
        requested: f64,
        /// Whether the integer part differs from the last applied one.
        changed: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
    Hold,
}

#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    min_replicas: u32,
    max_replicas: u32,
    last_applied: Option<u32>,
}

impl ScalingPolicy {
    pub fn new(config: &PolicyConfig) -> ConfigResult<Self> {
        if config.min_replicas < 1 {
            return Err(ConfigError::invalid("policy.min_replicas", "must be at least 1"));
        }
        if config.min_replicas > config.max_replicas {
            return Err(ConfigError::invalid(
                "policy.max_replicas",
                format!(
                    "max ({}) is below min ({})",
                    config.max_replicas, config.min_replicas
                ),
            ));
        }
        Ok(Self {
            min_replicas: config.min_replicas,
            max_replicas: config.max_replicas,
            last_applied: None,
        })
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min_replicas, self.max_replicas)
    }

    /// The integer target last confirmed by the scaler.
    pub fn last_applied(&self) -> Option<u32> {
        self.last_applied
    }

    /// Remember what the scaler accepted so an unchanged integer part is
    /// not sent again.
    pub fn record_applied(&mut self, replicas: u32) {
        self.last_applied = Some(replicas);
    }

    /// Turn `action` into a target relative to `current` replicas.
    ///
    /// Scale-up rounds the clamped target up, scale-down and zero deltas
    /// round down. The fractional remainder is taken from the clamped,
    /// unrounded target. Non-finite actions count as zero deltas.
    pub fn decide(&self, action: ControllerAction, current: f64) -> PolicyDecision {
        let current = if current.is_finite() { current.max(0.0) } else { 0.0 };

        let (requested, direction) = match action {
            ControllerAction::DoNotScale => return PolicyDecision::Skip,
            ControllerAction::Delta(d) if d.is_finite() => {
                let direction = if d > 0.0 {
                    Direction::Up
                } else if d < 0.0 {
                    Direction::Down
                } else {
                    Direction::Hold
                };
                (current + d, direction)
            }
            ControllerAction::Absolute(t) if t.is_finite() => {
                let direction = if t > current {
                    Direction::Up
                } else if t < current {
                    Direction::Down
                } else {
                    Direction::Hold
                };
                (t, direction)
            }
            _ => (current, Direction::Hold),
        };

        let min = f64::from(self.min_replicas);
        let max = f64::from(self.max_replicas);
        let clamped = requested.clamp(min, max);

        let rounded = match direction {
            Direction::Up => clamped.ceil(),
            Direction::Down | Direction::Hold => clamped.floor(),
        };
        let replicas = (rounded as u32).clamp(self.min_replicas, self.max_replicas);
        let target = ScalingTarget::new(replicas, clamped - clamped.floor());
        let changed = self.last_applied != Some(replicas);

        debug!(
            ?action,
            current,
            requested,
            replicas = target.replicas,
            fraction = target.fraction,
            changed,
            "policy applied"
        );
        PolicyDecision::Scale {
            target,
            requested,
            changed,
        }
    }
}
