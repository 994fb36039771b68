//! fracscale-queue — the queue engine and shared-parameter contracts.
//!
//! Workers and the orchestrator never share memory; they meet at two
//! external collaborators:
//!
//! ```text
//! QueueEngine                       ParamStore
//!   ├── register / deregister         ├── worker_should_go   (bool)
//!   ├── enqueue  → routed queue       ├── load_gen_should_go (bool)
//!   ├── pop / try_pop                 ├── fractional_prob    (f64)
//!   ├── complete → completion feed    └── fractional_delay_s (f64)
//!   ├── heartbeat
//!   └── status   → depths + arrivals
//! ```
//!
//! [`MemoryQueue`] and [`MemoryParams`] implement both contracts in-process
//! for standalone runs and tests. Routing is power-of-two-choices over
//! routable queues; a queue whose heartbeat goes stale is abandoned and its
//! items are handed to the remaining queues.

pub mod engine;
pub mod error;
pub mod memory;
pub mod params;

pub use engine::QueueEngine;
pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use params::{MemoryParams, ParamStore};
