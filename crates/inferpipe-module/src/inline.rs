//! `InlineWorker` - runs the compute function on the submitting thread.
//!
//! The completion fires before `start_async` returns, so the pipeline sees
//! the result land while `submit` is still on the stack. Useful for tests
//! and for backends that are already synchronous.

use inferpipe_core::{Completion, Worker, WorkerError};

use crate::compute::{run_compute, ComputeFn, NamedOutputs, Outputs};

pub struct InlineWorker<I, O> {
    compute: Box<ComputeFn<I, O>>,
    outputs: NamedOutputs<O>,
}

impl<I, O> InlineWorker<I, O> {
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(I) -> Result<Outputs<O>, WorkerError> + Send + Sync + 'static,
    {
        Self {
            compute: Box::new(compute),
            outputs: NamedOutputs::new(),
        }
    }
}

impl<I, O> Worker for InlineWorker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn start_async(&self, input: I, on_done: Completion) {
        match run_compute(&*self.compute, input) {
            Ok(named) => {
                self.outputs.replace(named);
                on_done(Ok(()));
            }
            Err(err) => on_done(Err(err)),
        }
    }

    fn output(&self, selector: &str) -> Result<O, WorkerError> {
        self.outputs.take(selector)
    }
}
