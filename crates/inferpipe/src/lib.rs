//! # inferpipe - Ordered Inference Pipeline
//!
//! Runs independent units of work (typically model inferences) on a fixed
//! pool of asynchronous workers and hands the results back in submission
//! order, no matter which unit finishes first.
//!
//! ## Features
//!
//! - **Bounded concurrency**: one worker slot per in-flight unit, no queueing
//! - **Ordered delivery**: results are buffered and released strictly by sequence id
//! - **First failure wins**: a worker failure is re-raised once to the consumer
//! - **Perf accounting**: frames, mean latency, FPS since the first submission
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use inferpipe::{ExecutorConfig, PipelineConfig, ThreadedExecutor};
//!
//! let executor = Arc::new(ThreadedExecutor::new(ExecutorConfig::from_env())?);
//! let config = PipelineConfig::from_env().output_selector("prob");
//! let pipeline = inferpipe::threaded_pipeline(&executor, config, |frame: Vec<u8>| {
//!     Ok(vec![("prob".to_string(), classify(&frame))])
//! })?;
//!
//! for frame in frames {
//!     pipeline.submit_blocking(frame)?;
//!     while let Some(result) = pipeline.get_result() {
//!         println!("#{} -> {:?}", result.id, result.output);
//!     }
//! }
//! pipeline.wait_for_total_completion();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        submit(), get_result(), wait_for_data()              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Pipeline                               │
//! │     one lock + condvar: pool, reorder buffer, ids, perf     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Worker   │      │  Worker   │      │  Worker   │
//!    │  slot 0   │      │  slot 1   │      │  slot N   │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │          Backend (ThreadedExecutor, engine, ...)        │
//!    │      completion callbacks on arbitrary threads          │
//!    └─────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

// Re-export core types
pub use inferpipe_core::{
    Completion,
    ConfigError,
    PipelineError,
    Result,
    SeqId,
    Worker,
    WorkerError,
    WorkerFactory,
};

// Re-export env utilities
pub use inferpipe_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use inferpipe_runtime::{
    PendingResult,
    PerfInfo,
    Pipeline,
    PipelineConfig,
    ResultBuffer,
    SlotId,
    WorkerPool,
};
pub use inferpipe_runtime::config::defaults;

// Re-export default workers
pub use inferpipe_module::{
    DeferredBackend,
    DeferredWorker,
    ExecutorConfig,
    ExecutorWorker,
    InlineWorker,
    Outputs,
    ThreadedExecutor,
};

/// Build a pipeline whose workers all run `compute` on `executor`.
///
/// One `ExecutorWorker` is created per slot; they share the compute
/// function and the executor threads.
pub fn threaded_pipeline<I, O, F>(
    executor: &Arc<ThreadedExecutor>,
    config: PipelineConfig,
    compute: F,
) -> Result<Pipeline<ExecutorWorker<I, O>>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> std::result::Result<Outputs<O>, WorkerError> + Send + Sync + 'static,
{
    let compute = Arc::new(compute);
    let factory = |_: usize| {
        let compute = Arc::clone(&compute);
        Ok::<_, WorkerError>(ExecutorWorker::new(Arc::clone(executor), move |input| {
            compute(input)
        }))
    };
    Pipeline::new(&factory, config)
}
