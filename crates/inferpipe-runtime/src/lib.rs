//! # inferpipe-runtime
//!
//! The scheduling half of inferpipe: a fixed pool of worker slots, a
//! reorder buffer, and the `Pipeline` monitor that ties them together.
//!
//! ## Modules
//!
//! - `pool` - Fixed-size worker slot pool (idle/in-use tracking)
//! - `reorder` - Sequence-keyed reorder buffer
//! - `perf` - Latency and throughput accounting
//! - `config` - Pipeline configuration (defaults + env overrides)
//! - `pipeline` - Submit / poll / wait surface

pub mod pool;
pub mod reorder;
pub mod perf;
pub mod config;
pub mod pipeline;

pub use config::PipelineConfig;
pub use perf::PerfInfo;
pub use pipeline::Pipeline;
pub use pool::{SlotId, WorkerPool};
pub use reorder::{PendingResult, ResultBuffer};
