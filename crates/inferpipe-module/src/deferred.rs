//! `DeferredBackend` - externally driven completions.
//!
//! Workers hand their inputs to a shared backend and return immediately.
//! Nothing runs until the owner completes or fails a parked unit, in any
//! order it likes. This is the backend for driving out-of-order scenarios
//! deterministically and for bridging to engines that deliver results
//! through their own event loop.
//!
//! Completion callbacks always run after the backend lock is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use inferpipe_core::{Completion, Worker, WorkerError};
use log::trace;
use parking_lot::Mutex;

use crate::compute::NamedOutputs;

/// A started unit waiting for its result.
struct Parked<I, O> {
    input: I,
    outputs: Arc<NamedOutputs<O>>,
    on_done: Completion,
}

pub struct DeferredBackend<I, O> {
    /// Parked units in dispatch order.
    parked: Mutex<Vec<Parked<I, O>>>,
    started: AtomicU64,
}

impl<I, O> DeferredBackend<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            parked: Mutex::new(Vec::new()),
            started: AtomicU64::new(0),
        })
    }

    /// Create a worker slot bound to this backend.
    pub fn worker(self: &Arc<Self>) -> DeferredWorker<I, O> {
        DeferredWorker {
            backend: Arc::clone(self),
            outputs: Arc::new(NamedOutputs::new()),
        }
    }

    /// Units started and not yet resolved
    pub fn pending(&self) -> usize {
        self.parked.lock().len()
    }

    /// Units started over the backend's lifetime
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Inputs of pending units, oldest first.
    pub fn pending_inputs(&self) -> Vec<I>
    where
        I: Clone,
    {
        self.parked.lock().iter().map(|p| p.input.clone()).collect()
    }

    /// Finish the oldest pending unit matching `pred` with `outputs`.
    ///
    /// Returns false when no pending unit matches.
    pub fn complete_where<P>(&self, pred: P, outputs: Vec<(&str, O)>) -> bool
    where
        P: Fn(&I) -> bool,
    {
        let Some(unit) = self.take_where(pred) else {
            return false;
        };
        unit.outputs
            .replace(outputs.into_iter().map(|(name, value)| (name.to_string(), value)));
        (unit.on_done)(Ok(()));
        true
    }

    /// Fail the oldest pending unit matching `pred`.
    pub fn fail_where<P>(&self, pred: P, err: WorkerError) -> bool
    where
        P: Fn(&I) -> bool,
    {
        match self.take_where(pred) {
            Some(unit) => {
                (unit.on_done)(Err(err));
                true
            }
            None => false,
        }
    }

    pub fn complete_input(&self, input: &I, outputs: Vec<(&str, O)>) -> bool
    where
        I: PartialEq,
    {
        self.complete_where(|i| i == input, outputs)
    }

    pub fn fail_input(&self, input: &I, err: WorkerError) -> bool
    where
        I: PartialEq,
    {
        self.fail_where(|i| i == input, err)
    }

    fn take_where<P>(&self, pred: P) -> Option<Parked<I, O>>
    where
        P: Fn(&I) -> bool,
    {
        let mut parked = self.parked.lock();
        let pos = parked.iter().position(|p| pred(&p.input))?;
        Some(parked.remove(pos))
    }

    fn park(&self, unit: Parked<I, O>) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let mut parked = self.parked.lock();
        parked.push(unit);
        trace!("deferred unit parked, {} pending", parked.len());
    }
}

/// Worker slot whose units wait on a `DeferredBackend`.
pub struct DeferredWorker<I, O> {
    backend: Arc<DeferredBackend<I, O>>,
    outputs: Arc<NamedOutputs<O>>,
}

impl<I, O> Worker for DeferredWorker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn start_async(&self, input: I, on_done: Completion) {
        self.backend.park(Parked {
            input,
            outputs: Arc::clone(&self.outputs),
            on_done,
        });
    }

    fn output(&self, selector: &str) -> Result<O, WorkerError> {
        self.outputs.take(selector)
    }
}
