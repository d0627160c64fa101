//! Ordered inference pipeline
//!
//! Submits inputs to a fixed pool of workers, gathers their completions in
//! whatever order they arrive, and hands results back strictly in
//! submission order.
//!
//! ```text
//!  caller thread                         completion threads
//!  ─────────────                         ──────────────────
//!  submit(input)                         on_done(status)
//!    lock ─ acquire slot, id = input_id    lock ─ read output
//!    unlock, notify_all                           insert into buffer
//!    worker.start_async(...)                      or record first failure
//!                                                 release slot
//!  get_result()                            unlock, notify_all
//!    lock ─ extract(output_id)
//! ```
//!
//! All shared state sits in one `State` struct behind one mutex, paired
//! with one condition variable. Workers are started after the lock is
//! dropped so a worker that completes synchronously can take the lock in
//! its callback.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use inferpipe_core::{
    ConfigError, PipelineError, Result, SeqId, Worker, WorkerError, WorkerFactory,
};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::PipelineConfig;
use crate::perf::{PerfInfo, PerfTracker};
use crate::pool::{SlotId, WorkerPool};
use crate::reorder::{PendingResult, ResultBuffer};

/// Everything guarded by the pipeline lock
struct State<W: Worker> {
    pool: WorkerPool<W>,
    buffer: ResultBuffer<W::Output>,
    /// Next id to hand out
    input_id: SeqId,
    /// Next id the consumer may receive
    output_id: SeqId,
    /// First captured failure, drained by `wait_for_data`
    failure: Option<PipelineError>,
    perf: PerfTracker,
    selector: Option<Arc<str>>,
}

impl<W: Worker> State<W> {
    /// Something for `wait_for_data` to report
    fn has_data(&self) -> bool {
        self.failure.is_some() || self.pool.in_use_count() > 0 || !self.buffer.is_empty()
    }

    fn take_failure(&mut self) -> Result<()> {
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn extract_next(&mut self) -> Option<PendingResult<W::Output>> {
        let result = self.buffer.try_extract(self.output_id)?;
        self.output_id.advance();
        self.perf.record(Instant::now(), result.started);
        Some(result)
    }
}

struct Shared<W: Worker> {
    state: Mutex<State<W>>,
    cond: Condvar,
}

impl<W: Worker> Shared<W> {
    /// Completion handler body; runs on whatever thread the worker uses.
    fn complete(
        &self,
        worker: &W,
        slot: SlotId,
        id: SeqId,
        started: Instant,
        selector: &str,
        status: std::result::Result<(), WorkerError>,
    ) {
        {
            let mut state = self.state.lock();

            match status.and_then(|()| read_output(worker, selector)) {
                Ok(output) => {
                    let pending = PendingResult { id, output, started };
                    if let Err(dup) = state.buffer.insert(pending) {
                        // Broken worker contract. Overrides any worker failure;
                        // executor threads catch the panic below.
                        let err = PipelineError::DuplicateId(dup.id);
                        error!("{}", err);
                        state.failure = Some(PipelineError::DuplicateId(dup.id));
                        state.pool.release(slot);
                        drop(state);
                        self.cond.notify_all();
                        panic!("{}", err);
                    }
                    debug!("unit {} completed on slot {}", id, slot.as_usize());
                }
                Err(err) => {
                    if state.failure.is_none() {
                        error!("unit {} failed: {}", id, err);
                        state.failure = Some(PipelineError::Worker(err));
                    } else {
                        warn!("unit {} failed after an earlier failure, dropping: {}", id, err);
                    }
                }
            }

            if !state.pool.release(slot) {
                warn!("slot {} released while already idle", slot.as_usize());
            }
        }
        self.cond.notify_all();
    }
}

/// Read one named output, turning a panic into a `WorkerError`.
fn read_output<W: Worker>(
    worker: &W,
    selector: &str,
) -> std::result::Result<W::Output, WorkerError> {
    panic::catch_unwind(AssertUnwindSafe(|| worker.output(selector)))
        .unwrap_or_else(|payload| Err(WorkerError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Submits work to a bounded worker pool and delivers results in order.
///
/// # Example
///
/// ```ignore
/// let pipeline = Pipeline::new(&factory, PipelineConfig::default()
///     .max_concurrency(4)
///     .output_selector("prob"))?;
///
/// for frame in frames {
///     pipeline.submit_blocking(frame)?;
///     while let Some(result) = pipeline.get_result() {
///         consume(result);
///     }
/// }
/// while let Some(result) = pipeline.next_result()? {
///     consume(result);
/// }
/// ```
pub struct Pipeline<W: Worker> {
    shared: Arc<Shared<W>>,
}

impl<W: Worker> Pipeline<W> {
    /// Build the worker pool and an empty pipeline.
    pub fn new<F>(factory: &F, config: PipelineConfig) -> Result<Self>
    where
        F: WorkerFactory<W> + ?Sized,
    {
        config.validate()?;
        let pool = WorkerPool::new(factory, config.max_concurrency)?;
        let selector: Option<Arc<str>> = config.selector().map(Arc::from);

        info!(
            "pipeline initialized: max_concurrency={}, output={}",
            config.max_concurrency,
            selector.as_deref().unwrap_or("<unset>")
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    pool,
                    buffer: ResultBuffer::new(),
                    input_id: SeqId::ZERO,
                    output_id: SeqId::ZERO,
                    failure: None,
                    perf: PerfTracker::new(),
                    selector,
                }),
                cond: Condvar::new(),
            }),
        })
    }

    /// Set or replace the output selector used by later submissions.
    pub fn set_output_selector(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ConfigError::EmptySelector.into());
        }
        self.shared.state.lock().selector = Some(Arc::from(name));
        Ok(())
    }

    /// Dispatch `input` to an idle worker and return its sequence id.
    ///
    /// Never waits: fails with `CapacityExhausted` when every worker is
    /// busy, and with `NotConfigured` when no output selector is set.
    pub fn submit(&self, input: W::Input) -> Result<SeqId> {
        let state = self.shared.state.lock();
        self.dispatch(state, input)
    }

    /// Like `submit`, but waits for a worker to go idle instead of failing.
    pub fn submit_blocking(&self, input: W::Input) -> Result<SeqId> {
        let mut state = self.shared.state.lock();
        if state.selector.is_none() {
            return Err(PipelineError::NotConfigured);
        }
        self.shared
            .cond
            .wait_while(&mut state, |state| !state.pool.has_idle());
        self.dispatch(state, input)
    }

    fn dispatch(&self, mut state: MutexGuard<'_, State<W>>, input: W::Input) -> Result<SeqId> {
        let selector = state.selector.clone().ok_or(PipelineError::NotConfigured)?;

        let in_use = state.pool.in_use_count();
        let lease = state
            .pool
            .acquire_idle()
            .ok_or(PipelineError::CapacityExhausted)?;

        let started = Instant::now();
        state.perf.mark_submit(started, in_use);
        let id = state.input_id.advance();
        drop(state);
        // A busy slot is data for `wait_for_data` waiters.
        self.shared.cond.notify_all();

        debug!("unit {} dispatched to slot {}", id, lease.slot.as_usize());

        let shared = Arc::clone(&self.shared);
        let worker = Arc::clone(&lease.worker);
        let slot = lease.slot;
        lease.worker.start_async(
            input,
            Box::new(move |status| {
                shared.complete(&worker, slot, id, started, &selector, status);
            }),
        );

        Ok(id)
    }

    /// Block until a failure is captured, a worker is busy, or a result
    /// is buffered. A captured failure is returned (and cleared).
    pub fn wait_for_data(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.shared
            .cond
            .wait_while(&mut state, |state| !state.has_data());
        state.take_failure()
    }

    /// `wait_for_data` with an upper bound. `Ok(false)` on timeout.
    pub fn wait_for_data_timeout(&self, timeout: Duration) -> Result<bool> {
        let mut state = self.shared.state.lock();
        self.shared
            .cond
            .wait_while_for(&mut state, |state| !state.has_data(), timeout);
        state.take_failure()?;
        Ok(state.has_data())
    }

    /// Take the next in-order result if it has completed. Never blocks.
    pub fn get_result(&self) -> Option<PendingResult<W::Output>> {
        self.shared.state.lock().extract_next()
    }

    /// Block until the next in-order result is ready.
    ///
    /// Returns `Ok(None)` once nothing is in flight and the next id is
    /// not buffered. A captured failure is returned (and cleared).
    pub fn next_result(&self) -> Result<Option<PendingResult<W::Output>>> {
        let mut state = self.shared.state.lock();
        loop {
            state.take_failure()?;
            if let Some(result) = state.extract_next() {
                return Ok(Some(result));
            }
            if state.pool.in_use_count() == 0 {
                return Ok(None);
            }
            self.shared.cond.wait(&mut state);
        }
    }

    /// Block until every dispatched worker has completed.
    pub fn wait_for_total_completion(&self) {
        let mut state = self.shared.state.lock();
        self.shared
            .cond
            .wait_while(&mut state, |state| state.pool.in_use_count() > 0);
    }

    /// `wait_for_total_completion` with an upper bound. False on timeout.
    pub fn wait_for_total_completion_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        self.shared
            .cond
            .wait_while_for(&mut state, |state| state.pool.in_use_count() > 0, timeout);
        state.pool.in_use_count() == 0
    }

    /// Whether `submit` would find an idle worker right now
    pub fn is_ready_to_process(&self) -> bool {
        self.shared.state.lock().pool.has_idle()
    }

    pub fn in_use_count(&self) -> usize {
        self.shared.state.lock().pool.in_use_count()
    }

    pub fn capacity(&self) -> usize {
        self.shared.state.lock().pool.capacity()
    }

    /// Completed results waiting for their turn
    pub fn buffered_count(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Units submitted and not yet handed to the consumer
    pub fn undelivered_count(&self) -> u64 {
        let state = self.shared.state.lock();
        state.output_id.distance_to(state.input_id)
    }

    /// Id the next `submit` will assign
    pub fn next_input_id(&self) -> SeqId {
        self.shared.state.lock().input_id
    }

    /// Id the next `get_result` is waiting for
    pub fn next_output_id(&self) -> SeqId {
        self.shared.state.lock().output_id
    }

    pub fn perf_info(&self) -> PerfInfo {
        self.shared.state.lock().perf.snapshot()
    }
}

impl<W: Worker> Drop for Pipeline<W> {
    fn drop(&mut self) {
        self.wait_for_total_completion();
        let state = self.shared.state.lock();
        info!(
            "pipeline shut down: {} results delivered, {} undelivered ({} buffered)",
            state.perf.snapshot().frames_count,
            state.output_id.distance_to(state.input_id),
            state.buffer.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferpipe_module::deferred::{DeferredBackend, DeferredWorker};
    use inferpipe_module::executor::{ExecutorConfig, ExecutorWorker, ThreadedExecutor};
    use inferpipe_module::inline::InlineWorker;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    type Deferred = DeferredWorker<u32, String>;

    fn deferred_pipeline(
        slots: usize,
    ) -> (Arc<DeferredBackend<u32, String>>, Pipeline<Deferred>) {
        let backend = DeferredBackend::new();
        let b = Arc::clone(&backend);
        let factory = move |_: usize| Ok::<_, WorkerError>(b.worker());
        let config = PipelineConfig::default()
            .max_concurrency(slots)
            .output_selector("out");
        let pipeline = Pipeline::new(&factory, config).unwrap();
        (backend, pipeline)
    }

    fn finish(backend: &DeferredBackend<u32, String>, input: u32) {
        assert!(backend.complete_input(&input, vec![("out", format!("r{input}"))]));
    }

    fn inline_pipeline(slots: usize) -> Pipeline<InlineWorker<u32, u32>> {
        let factory = |_: usize| {
            Ok::<_, WorkerError>(InlineWorker::new(|x: u32| Ok(vec![("out".to_string(), x * 2)])))
        };
        let config = PipelineConfig::default()
            .max_concurrency(slots)
            .output_selector("out");
        Pipeline::new(&factory, config).unwrap()
    }

    #[test]
    fn test_invalid_concurrency() {
        let backend = DeferredBackend::<u32, String>::new();
        let factory = move |_: usize| Ok::<_, WorkerError>(backend.worker());
        let config = PipelineConfig::default().max_concurrency(0);
        let result: Result<Pipeline<Deferred>> = Pipeline::new(&factory, config);
        assert!(matches!(
            result,
            Err(PipelineError::Config(ConfigError::InvalidConcurrency(0)))
        ));
    }

    #[test]
    fn test_submit_requires_selector() {
        let backend = DeferredBackend::<u32, String>::new();
        let b = Arc::clone(&backend);
        let factory = move |_: usize| Ok::<_, WorkerError>(b.worker());
        let pipeline: Pipeline<Deferred> =
            Pipeline::new(&factory, PipelineConfig::default().max_concurrency(2)).unwrap();

        assert!(matches!(pipeline.submit(1), Err(PipelineError::NotConfigured)));
        assert!(matches!(
            pipeline.submit_blocking(1),
            Err(PipelineError::NotConfigured)
        ));
        // nothing was dispatched
        assert_eq!(backend.pending(), 0);
        assert_eq!(pipeline.in_use_count(), 0);
        assert_eq!(pipeline.next_input_id(), SeqId::ZERO);

        assert!(matches!(
            pipeline.set_output_selector(""),
            Err(PipelineError::Config(ConfigError::EmptySelector))
        ));
        pipeline.set_output_selector("out").unwrap();
        assert_eq!(pipeline.submit(1).unwrap(), SeqId::ZERO);
        finish(&backend, 1);
        assert_eq!(pipeline.get_result().unwrap().output, "r1");
    }

    #[test]
    fn test_capacity_exhausted() {
        let (backend, pipeline) = deferred_pipeline(2);
        pipeline.submit(0).unwrap();
        pipeline.submit(1).unwrap();
        assert!(!pipeline.is_ready_to_process());
        assert!(matches!(
            pipeline.submit(2),
            Err(PipelineError::CapacityExhausted)
        ));
        // rejected submission consumed no id
        assert_eq!(pipeline.next_input_id(), SeqId::new(2));

        finish(&backend, 0);
        assert!(pipeline.is_ready_to_process());
        assert_eq!(pipeline.submit(2).unwrap(), SeqId::new(2));
        finish(&backend, 1);
        finish(&backend, 2);
    }

    #[test]
    fn test_out_of_order_scenario() {
        let (backend, pipeline) = deferred_pipeline(2);

        assert_eq!(pipeline.submit(0).unwrap(), SeqId::new(0));
        assert_eq!(pipeline.submit(1).unwrap(), SeqId::new(1));
        assert!(matches!(
            pipeline.submit(2),
            Err(PipelineError::CapacityExhausted)
        ));

        // id 1 finishes first
        finish(&backend, 1);
        pipeline.wait_for_data().unwrap();
        assert!(pipeline.get_result().is_none());
        assert_eq!(pipeline.buffered_count(), 1);

        // its slot is free again, so id 2 can go
        assert_eq!(pipeline.submit(2).unwrap(), SeqId::new(2));

        finish(&backend, 0);
        let r0 = pipeline.get_result().unwrap();
        assert_eq!((r0.id, r0.output.as_str()), (SeqId::new(0), "r0"));
        let r1 = pipeline.get_result().unwrap();
        assert_eq!((r1.id, r1.output.as_str()), (SeqId::new(1), "r1"));
        assert!(pipeline.get_result().is_none());

        finish(&backend, 2);
        let r2 = pipeline.get_result().unwrap();
        assert_eq!(r2.id, SeqId::new(2));
        assert!(pipeline.get_result().is_none());
        assert_eq!(pipeline.perf_info().frames_count, 3);
    }

    #[test]
    fn test_get_result_idempotent() {
        let (backend, pipeline) = deferred_pipeline(1);
        pipeline.submit(7).unwrap();
        assert!(pipeline.get_result().is_none());
        finish(&backend, 7);
        assert!(pipeline.get_result().is_some());
        assert!(pipeline.get_result().is_none());
        assert_eq!(pipeline.next_output_id(), SeqId::new(1));
    }

    #[test]
    fn test_first_failure_wins() {
        let (backend, pipeline) = deferred_pipeline(3);
        pipeline.submit(0).unwrap();
        pipeline.submit(3).unwrap();
        pipeline.submit(7).unwrap();

        assert!(backend.fail_input(&3, WorkerError::execution("unit 3 broke")));
        assert!(backend.fail_input(&7, WorkerError::execution("unit 7 broke")));

        // both failing slots went back to idle
        assert_eq!(pipeline.in_use_count(), 1);

        match pipeline.wait_for_data() {
            Err(PipelineError::Worker(WorkerError::Execution(msg))) => {
                assert_eq!(msg, "unit 3 broke")
            }
            other => panic!("unexpected: {:?}", other),
        }

        // drained: the second failure is not raised
        pipeline.wait_for_data().unwrap();
        finish(&backend, 0);
        assert_eq!(pipeline.get_result().unwrap().id, SeqId::ZERO);
        // id 1 is lost, delivery stalls there
        assert!(pipeline.get_result().is_none());
    }

    #[test]
    fn test_missing_output_is_failure_and_releases() {
        let (backend, pipeline) = deferred_pipeline(1);
        pipeline.submit(4).unwrap();
        assert!(backend.complete_input(&4, vec![("other", "x".to_string())]));

        assert_eq!(pipeline.in_use_count(), 0);
        assert!(matches!(
            pipeline.wait_for_data(),
            Err(PipelineError::Worker(WorkerError::OutputMissing(name))) if name == "out"
        ));
        assert!(pipeline.is_ready_to_process());
    }

    #[test]
    fn test_panicking_output_captured() {
        struct Exploding;

        impl Worker for Exploding {
            type Input = ();
            type Output = ();

            fn start_async(&self, _input: (), on_done: inferpipe_core::Completion) {
                on_done(Ok(()));
            }

            fn output(&self, _selector: &str) -> std::result::Result<(), WorkerError> {
                panic!("tensor layout mismatch");
            }
        }

        let factory = |_: usize| Ok::<_, WorkerError>(Exploding);
        let config = PipelineConfig::default()
            .max_concurrency(1)
            .output_selector("out");
        let pipeline: Pipeline<Exploding> = Pipeline::new(&factory, config).unwrap();
        pipeline.submit(()).unwrap();

        assert_eq!(pipeline.in_use_count(), 0);
        match pipeline.wait_for_data() {
            Err(PipelineError::Worker(WorkerError::Panicked(msg))) => {
                assert_eq!(msg, "tensor layout mismatch")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_inline_worker_completes_during_submit() {
        let pipeline = inline_pipeline(1);
        for i in 0..5u32 {
            assert_eq!(pipeline.submit(i).unwrap(), SeqId::new(i as i64));
            assert_eq!(pipeline.in_use_count(), 0);
            let r = pipeline.get_result().unwrap();
            assert_eq!(r.output, i * 2);
        }
        let perf = pipeline.perf_info();
        assert_eq!(perf.frames_count, 5);
        assert!(perf.start_time.is_some());
    }

    #[test]
    fn test_wait_for_data_timeout_when_idle() {
        let pipeline = inline_pipeline(1);
        assert!(!pipeline.wait_for_data_timeout(Duration::from_millis(10)).unwrap());
        pipeline.submit(1).unwrap();
        assert!(pipeline.wait_for_data_timeout(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_total_completion_timeout_with_stalled_worker() {
        let (backend, pipeline) = deferred_pipeline(1);
        pipeline.submit(9).unwrap();
        assert!(!pipeline.wait_for_total_completion_timeout(Duration::from_millis(20)));
        finish(&backend, 9);
        assert!(pipeline.wait_for_total_completion_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_wraparound_ordering() {
        let (backend, pipeline) = deferred_pipeline(3);
        {
            let mut state = pipeline.shared.state.lock();
            state.input_id = SeqId::new(i64::MAX - 1);
            state.output_id = SeqId::new(i64::MAX - 1);
        }

        assert_eq!(pipeline.submit(0).unwrap(), SeqId::new(i64::MAX - 1));
        assert_eq!(pipeline.submit(1).unwrap(), SeqId::MAX);
        assert_eq!(pipeline.submit(2).unwrap(), SeqId::ZERO);

        // wrapped id finishes first but must wait for the two before it
        finish(&backend, 2);
        finish(&backend, 1);
        assert!(pipeline.get_result().is_none());
        finish(&backend, 0);

        let ids: Vec<SeqId> = std::iter::from_fn(|| pipeline.get_result().map(|r| r.id)).collect();
        assert_eq!(ids, vec![SeqId::new(i64::MAX - 1), SeqId::MAX, SeqId::ZERO]);
        assert_eq!(pipeline.next_output_id(), SeqId::new(1));
        assert_eq!(pipeline.undelivered_count(), 0);
    }

    #[test]
    fn test_undelivered_count_spans_wrap() {
        let (backend, pipeline) = deferred_pipeline(3);
        {
            let mut state = pipeline.shared.state.lock();
            state.input_id = SeqId::MAX;
            state.output_id = SeqId::MAX;
        }
        for x in 0..3 {
            pipeline.submit(x).unwrap();
        }
        assert_eq!(pipeline.undelivered_count(), 3);

        finish(&backend, 1);
        assert_eq!(pipeline.buffered_count(), 1);
        assert_eq!(pipeline.undelivered_count(), 3);

        finish(&backend, 0);
        assert!(pipeline.get_result().is_some());
        assert!(pipeline.get_result().is_some());
        assert_eq!(pipeline.undelivered_count(), 1);

        finish(&backend, 2);
        assert!(pipeline.get_result().is_some());
        assert_eq!(pipeline.undelivered_count(), 0);
    }

    #[test]
    fn test_submit_blocking_waits_for_slot() {
        let (backend, pipeline) = deferred_pipeline(1);
        let pipeline = Arc::new(pipeline);
        pipeline.submit(0).unwrap();

        let p = Arc::clone(&pipeline);
        let submitter = thread::spawn(move || p.submit_blocking(1).unwrap());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(backend.pending(), 1);
        finish(&backend, 0);

        assert_eq!(submitter.join().unwrap(), SeqId::new(1));
        finish(&backend, 1);
        assert_eq!(pipeline.next_result().unwrap().unwrap().id, SeqId::ZERO);
        assert_eq!(pipeline.next_result().unwrap().unwrap().id, SeqId::new(1));
        assert!(pipeline.next_result().unwrap().is_none());
    }

    #[test]
    fn test_submit_wakes_data_waiter() {
        let (backend, pipeline) = deferred_pipeline(1);
        let pipeline = Arc::new(pipeline);

        let (tx, rx) = std::sync::mpsc::channel();
        let p = Arc::clone(&pipeline);
        let waiter = thread::spawn(move || {
            let result = p.wait_for_data();
            tx.send(()).unwrap();
            result
        });

        thread::sleep(Duration::from_millis(30));
        pipeline.submit(1).unwrap();

        // woken by the submission, nothing has completed yet
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(backend.pending(), 1);
        waiter.join().unwrap().unwrap();
        finish(&backend, 1);
    }

    #[test]
    fn test_duplicate_id_recorded_for_inline_completion() {
        let pipeline = inline_pipeline(1);
        let stale = PendingResult { id: SeqId::ZERO, output: 0, started: Instant::now() };
        assert!(pipeline.shared.state.lock().buffer.insert(stale).is_ok());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.submit(0)));
        assert!(outcome.is_err());
        assert_eq!(pipeline.in_use_count(), 0);
        assert!(matches!(
            pipeline.wait_for_data(),
            Err(PipelineError::DuplicateId(id)) if id == SeqId::ZERO
        ));
    }

    #[test]
    fn test_duplicate_id_recorded_for_executor_completion() {
        let executor = Arc::new(ThreadedExecutor::new(ExecutorConfig::default().threads(1)).unwrap());
        let exec = Arc::clone(&executor);
        let factory = move |_: usize| {
            Ok::<_, WorkerError>(ExecutorWorker::new(Arc::clone(&exec), |x: u64| {
                Ok(vec![("out".to_string(), x)])
            }))
        };
        let config = PipelineConfig::default()
            .max_concurrency(1)
            .output_selector("out");
        let pipeline: Pipeline<ExecutorWorker<u64, u64>> = Pipeline::new(&factory, config).unwrap();
        let stale = PendingResult { id: SeqId::ZERO, output: 99, started: Instant::now() };
        assert!(pipeline.shared.state.lock().buffer.insert(stale).is_ok());

        pipeline.submit(5).unwrap();
        pipeline.wait_for_total_completion();

        // the executor thread caught the panic; the consumer still sees it
        assert!(matches!(
            pipeline.wait_for_data(),
            Err(PipelineError::DuplicateId(id)) if id == SeqId::ZERO
        ));
        assert_eq!(pipeline.get_result().unwrap().output, 99);
    }

    #[test]
    fn test_threaded_executor_delivers_all_in_order() {
        let executor = Arc::new(
            ThreadedExecutor::new(ExecutorConfig::default().threads(4).queue_depth(64)).unwrap(),
        );
        let exec = Arc::clone(&executor);
        let factory = move |_: usize| {
            Ok::<_, WorkerError>(ExecutorWorker::new(Arc::clone(&exec), |x: u64| {
                // later inputs finish sooner
                thread::sleep(Duration::from_micros((50 - x % 50) * 20));
                Ok(vec![("out".to_string(), x)])
            }))
        };
        let config = PipelineConfig::default()
            .max_concurrency(4)
            .output_selector("out");
        let pipeline: Pipeline<ExecutorWorker<u64, u64>> = Pipeline::new(&factory, config).unwrap();

        let total = 200u64;
        let mut delivered = Vec::new();
        for x in 0..total {
            pipeline.submit_blocking(x).unwrap();
            assert!(pipeline.in_use_count() <= 4);
            while let Some(r) = pipeline.get_result() {
                delivered.push(r.output);
            }
        }
        while let Some(r) = pipeline.next_result().unwrap() {
            delivered.push(r.output);
        }

        assert_eq!(delivered, (0..total).collect::<Vec<_>>());
        assert_eq!(pipeline.perf_info().frames_count, total);
        assert_eq!(pipeline.buffered_count(), 0);
    }

    #[test]
    fn test_drop_waits_for_in_flight_work() {
        let executor = Arc::new(ThreadedExecutor::new(ExecutorConfig::default().threads(2)).unwrap());
        let computed = Arc::new(AtomicUsize::new(0));
        let exec = Arc::clone(&executor);
        let c = Arc::clone(&computed);
        let factory = move |_: usize| {
            let c = Arc::clone(&c);
            Ok::<_, WorkerError>(ExecutorWorker::new(Arc::clone(&exec), move |x: u64| {
                thread::sleep(Duration::from_millis(10));
                c.fetch_add(1, Ordering::SeqCst);
                Ok(vec![("out".to_string(), x)])
            }))
        };
        let config = PipelineConfig::default()
            .max_concurrency(2)
            .output_selector("out");
        let pipeline: Pipeline<ExecutorWorker<u64, u64>> = Pipeline::new(&factory, config).unwrap();
        pipeline.submit(1).unwrap();
        pipeline.submit(2).unwrap();
        drop(pipeline);
        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_any_completion_order_is_delivered_in_order(
            slots in 1usize..6,
            picks in prop::collection::vec(any::<prop::sample::Index>(), 24),
        ) {
            let (backend, pipeline) = deferred_pipeline(slots);
            let total = 24u32;
            let mut next_input = 0u32;
            let mut delivered = Vec::new();
            let mut picks = picks.into_iter();

            loop {
                while next_input < total && pipeline.is_ready_to_process() {
                    pipeline.submit(next_input).unwrap();
                    next_input += 1;
                }
                prop_assert!(pipeline.in_use_count() <= slots);

                let pending = backend.pending_inputs();
                if pending.is_empty() {
                    break;
                }
                let choice = picks.next().map(|ix| ix.index(pending.len())).unwrap_or(0);
                finish(&backend, pending[choice]);

                while let Some(r) = pipeline.get_result() {
                    delivered.push(r.id.as_i64());
                }
            }

            prop_assert_eq!(delivered, (0..total as i64).collect::<Vec<_>>());
            prop_assert_eq!(pipeline.perf_info().frames_count, total as u64);
        }
    }
}
