//! fracscale-runner — the control loop and everything it drives.
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────┐ deltas ┌───────────────┐
//!                │ LoadGenerator│───────▶│  QueueEngine  │◀──── workers
//!                └──────────────┘enqueue └───────┬───────┘ pop/complete
//!                                                │ completions + status
//!                                                ▼
//!  ┌──────────┐ snapshot ┌────────────┐ action ┌────────┐ target ┌────────┐
//!  │ Snapshot │────────▶│ Controller │───────▶│ Policy │───────▶│ Scaler │
//!  │ Builder  │          └────────────┘        └───┬────┘        └────────┘
//!  └──────────┘                                    │ fraction
//!                                                  ▼
//!                                            ParamStore ──▶ worker throttles
//! ```
//!
//! Each tick appends one line to `status.jsonl` and the tick's completion
//! records to `trace.jsonl` in the run directory.

pub mod control_loop;
pub mod error;
pub mod loadgen;
pub mod pool;
pub mod scaler;
pub mod standalone;
pub mod writer;

pub use control_loop::{
    CompletionTracker, Orchestrator, RunSummary, RunnerSettings, TickOutcome, TickRecord,
};
pub use error::{ScaleError, ScaleResult};
pub use loadgen::{LoadGenerator, LoadReport, read_deltas};
pub use pool::{LocalPoolScaler, PoolReport};
pub use scaler::{CommandScaler, Scaler};
pub use standalone::run_standalone;
pub use writer::ResultWriter;
