//! fracscale-worker — one replica pulling work from its queue.
//!
//! # Lifecycle
//!
//! ```text
//!  Registering ──gate open, queue registered──▶ Active
//!       │                                          │ signal or marked
//!       │ shutdown                                 ▼ for termination
//!       │                                      Draining
//!       │                          deregister, flush local queue
//!       ▼                                          ▼
//!  Terminated ◀──────────── monitors joined ────────┘
//! ```
//!
//! While Active the main loop runs alongside three background monitors,
//! all stopped and joined before the worker reports Terminated:
//!
//! - heartbeat beacon: refreshes the queue's health record and flags the
//!   worker stale when the engine no longer routes to it
//! - fractional poller: copies the published throttling parameters into
//!   a `watch` cell read by the main loop
//! - termination watcher: triggers the shutdown latch when the hosting
//!   environment marks the worker for termination
//!
//! Every trigger path goes through one [`ShutdownLatch`]; the drain runs
//! exactly once no matter how many paths fire.

pub mod error;
pub mod fractional;
pub mod handler;
pub mod heartbeat;
pub mod lifecycle;
pub mod shutdown;
pub mod watcher;
pub mod worker;

pub use error::{LifecycleError, LifecycleResult};
pub use fractional::{FractionalPoller, FractionalThrottle};
pub use handler::{SleepHandler, WorkHandler};
pub use heartbeat::HeartbeatBeacon;
pub use lifecycle::Lifecycle;
pub use shutdown::{ShutdownLatch, ShutdownReason};
pub use watcher::{FileProbe, TerminationProbe, TerminationWatcher, TokenProbe};
pub use worker::{Worker, WorkerReport, WorkerSettings};
