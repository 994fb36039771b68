//! The controller capability and the startup factory.

use std::time::Duration;

use tracing::info;

use fracscale_core::{ConfigResult, ControllerAction, ControllerConfig, MetricsSnapshot};

use crate::bangbang::BangBang;
use crate::passive::{DoNothing, Passthrough, RandomAddDelete};
use crate::proportional::Proportional;
use crate::scheduled::Scheduled;

/// Produces one scaling action per control tick.
///
/// The orchestrator calls `action` exactly once per tick from a single
/// task, so implementations may keep internal state without locking.
pub trait Controller: Send {
    /// Registry name, used in logs and status records.
    fn name(&self) -> &'static str;

    /// Decide this tick's action. Must return the neutral action rather
    /// than fail on degenerate input.
    fn action(&mut self, snapshot: &MetricsSnapshot) -> ControllerAction;
}

/// Build the configured controller, validating its parameters first.
///
/// `period` is the control period; rate-based controllers measure over it.
pub fn build_controller(
    config: &ControllerConfig,
    period: Duration,
) -> ConfigResult<Box<dyn Controller>> {
    config.validate()?;

    let controller: Box<dyn Controller> = match config {
        ControllerConfig::BangBang(c) => Box::new(BangBang::new(c)),
        ControllerConfig::Proportional(c) => Box::new(Proportional::new(c, period)),
        ControllerConfig::Scheduled(c) => Box::new(Scheduled::from_config(c)?),
        ControllerConfig::Fixed(c) => Box::new(Scheduled::fixed(c.delta, c.start_replicas)),
        ControllerConfig::Passthrough(c) => Box::new(Passthrough::new(c)),
        ControllerConfig::Random => Box::new(RandomAddDelete::new()),
        ControllerConfig::DoNothing => Box::new(DoNothing),
    };

    info!(controller = controller.name(), "controller selected");
    Ok(controller)
}
