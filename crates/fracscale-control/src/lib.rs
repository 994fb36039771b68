//! fracscale-control — from a metrics snapshot to a replica target.
//!
//! A [`Controller`] turns the per-tick [`MetricsSnapshot`] into a
//! [`ControllerAction`]; the [`ScalingPolicy`] turns that action into a
//! bounded, rounded [`ScalingTarget`].
//!
//! # Strategies
//!
//! ```text
//! bangbang     p99 < low  → −step      p99 > high → +step      else 0
//! pid          k_p · (arrival_rate / service_rate − target_utilization)
//! scheduled    running += pattern[i]; Absolute(running)     (wrapping)
//! fixed        running += delta;      Absolute(running)
//! passthrough  DoNotScale (an external autoscaler owns the deployment)
//! random       alternate +k / −k, k ∈ [1, 40)
//! do_nothing   0
//! ```
//!
//! # Policy
//!
//! ```text
//! target  = current + delta   (or the absolute target)
//! clamped = clamp(target, min_replicas, max_replicas)
//! replicas = ceil(clamped) on scale-up, floor(clamped) otherwise
//! fraction = clamped − floor(clamped)
//! ```
//!
//! Controllers never fail: an empty snapshot yields the neutral action.
//!
//! [`MetricsSnapshot`]: fracscale_core::MetricsSnapshot
//! [`ControllerAction`]: fracscale_core::ControllerAction
//! [`ScalingTarget`]: fracscale_core::ScalingTarget

pub mod bangbang;
pub mod controller;
pub mod passive;
pub mod policy;
pub mod proportional;
pub mod scheduled;

pub use bangbang::BangBang;
pub use controller::{Controller, build_controller};
pub use passive::{DoNothing, Passthrough, RandomAddDelete};
pub use policy::{PolicyDecision, ScalingPolicy};
pub use proportional::Proportional;
pub use scheduled::Scheduled;
