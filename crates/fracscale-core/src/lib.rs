//! fracscale-core — shared types and configuration for fracscale.
//!
//! Every other crate speaks in these types: the per-tick
//! [`MetricsSnapshot`] handed to controllers, the [`ControllerAction`] they
//! return, the [`ScalingTarget`] the policy produces, the
//! [`FractionalParameters`] workers throttle against, and the work-unit
//! records that flow through the queue engine.
//!
//! Configuration lives in [`config`]: one TOML document with a section per
//! subsystem, validated once at startup before any control tick runs.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::{ConfigError, ConfigResult};
pub use types::*;
