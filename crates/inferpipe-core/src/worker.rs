//! Worker abstraction (one concurrent execution slot).
//!
//! A `Worker` accepts one input at a time, runs it somewhere else, and
//! reports back through a single-shot completion callback. The pipeline
//! never knows where the work runs.
//!
//! # Implementors
//!
//! - `ExecutorWorker` (default): runs a compute function on a shared
//!   `ThreadedExecutor` thread pool.
//!
//! - `DeferredWorker` (testing): parks every unit until the host
//!   completes it by hand. Used to force out-of-order completion.
//!
//! - `InlineWorker` (testing): executes synchronously in the caller and
//!   fires the callback before `start_async` returns.

use crate::error::WorkerError;

/// Completion notification handed to `Worker::start_async`.
///
/// `Ok(())` means the unit finished and its outputs can be read through
/// `Worker::output`. `Err` carries a backend failure.
pub type Completion = Box<dyn FnOnce(Result<(), WorkerError>) + Send + 'static>;

/// One reusable execution slot.
///
/// **Contract:**
/// - `start_async()` must not block waiting for the unit to finish.
/// - `on_done` is invoked exactly once per `start_async()`, on any thread,
///   possibly before `start_async()` returns.
/// - After `on_done(Ok(()))`, `output()` returns the named output once;
///   a second read of the same name yields `OutputMissing`.
/// - A slot is never started again before its previous `on_done` ran; the
///   pool guarantees this.
pub trait Worker: Send + Sync + 'static {
    /// Input for one unit of work.
    type Input: Send + 'static;
    /// Value extracted for one named output.
    type Output: Send + 'static;

    /// Begin executing `input`; call `on_done` when finished.
    fn start_async(&self, input: Self::Input, on_done: Completion);

    /// Take the named output of the last finished unit.
    fn output(&self, selector: &str) -> Result<Self::Output, WorkerError>;
}

/// Builds the fixed set of workers when a pipeline is initialized.
///
/// Closures `Fn(usize) -> Result<W, WorkerError>` implement this trait,
/// receiving the slot index.
pub trait WorkerFactory<W: Worker> {
    /// Create the worker for slot `index`.
    fn create(&self, index: usize) -> Result<W, WorkerError>;
}

impl<W, F> WorkerFactory<W> for F
where
    W: Worker,
    F: Fn(usize) -> Result<W, WorkerError>,
{
    fn create(&self, index: usize) -> Result<W, WorkerError> {
        self(index)
    }
}
