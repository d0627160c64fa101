//! Shared plumbing for compute-function backed workers.
//!
//! A compute function turns one input into a set of named outputs. The
//! worker keeps the outputs of its latest unit in a `NamedOutputs` table
//! until the pipeline reads the one it selected.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use inferpipe_core::WorkerError;
use parking_lot::Mutex;

/// Named outputs produced by one unit of work
pub type Outputs<O> = Vec<(String, O)>;

/// User computation run for each submitted input
pub type ComputeFn<I, O> = dyn Fn(I) -> Result<Outputs<O>, WorkerError> + Send + Sync;

/// Run `compute`, turning a panic into `WorkerError::Panicked`.
pub fn run_compute<I, O>(compute: &ComputeFn<I, O>, input: I) -> Result<Outputs<O>, WorkerError> {
    panic::catch_unwind(AssertUnwindSafe(|| compute(input)))
        .unwrap_or_else(|payload| Err(WorkerError::Panicked(describe_panic(payload.as_ref()))))
}

pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(s) => (*s).to_string(),
        None => payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

/// Output table of one worker slot
pub struct NamedOutputs<O> {
    table: Mutex<HashMap<String, O>>,
}

impl<O> Default for NamedOutputs<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> NamedOutputs<O> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the table with the outputs of a newly finished unit.
    pub fn replace(&self, outputs: impl IntoIterator<Item = (String, O)>) {
        let mut table = self.table.lock();
        table.clear();
        table.extend(outputs);
    }

    /// Remove and return the named output.
    pub fn take(&self, selector: &str) -> Result<O, WorkerError> {
        self.table
            .lock()
            .remove(selector)
            .ok_or_else(|| WorkerError::OutputMissing(selector.to_string()))
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}
