//! `ThreadedExecutor` - default backend that runs units on OS threads.
//!
//! Spawns N threads at creation. Submitted jobs go into a bounded
//! lock-free MPMC queue; an idle thread pops a job, runs it, and goes back
//! to the queue. Threads park briefly when the queue is empty and are
//! unparked on submit.
//!
//! Every job is called exactly once: with `JobStatus::Run` on an executor
//! thread, or with `JobStatus::Rejected` inline when the queue is full or
//! the executor is shutting down. Workers rely on that to fire their
//! completion exactly once.
//!
//! No dynamic scaling. Simple, predictable, safe.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use inferpipe_core::env::{env_get, key};
use inferpipe_core::{Completion, Worker, WorkerError};
use log::{error, info, warn};
use parking_lot::Mutex;

use crate::compute::{describe_panic, run_compute, ComputeFn, NamedOutputs, Outputs};

/// Upper bound on executor threads
pub const MAX_THREADS: usize = 64;

/// How a job is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Running on an executor thread
    Run,
    /// Refused (queue full or shut down); called inline
    Rejected,
}

/// A unit of work for the executor
pub type Job = Box<dyn FnOnce(JobStatus) + Send + 'static>;

/// Executor sizing
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of OS threads
    pub threads: usize,
    /// Max queued jobs before `execute` rejects
    pub queue_depth: usize,
    /// Park duration when the queue is empty
    pub park_timeout: Duration,
}

impl Default for ExecutorConfig {
    /// min(8, nproc/2) threads, at least 2.
    fn default() -> Self {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            threads: (cpus / 2).clamp(2, 8),
            queue_depth: 256,
            park_timeout: Duration::from_millis(1),
        }
    }
}

impl ExecutorConfig {
    /// Defaults with environment overrides.
    ///
    /// - `INFERPIPE_EXECUTOR_THREADS`
    /// - `INFERPIPE_EXECUTOR_QUEUE_DEPTH`
    /// - `INFERPIPE_EXECUTOR_PARK_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            threads: env_get(&key("EXECUTOR_THREADS"), base.threads),
            queue_depth: env_get(&key("EXECUTOR_QUEUE_DEPTH"), base.queue_depth),
            park_timeout: Duration::from_millis(env_get(
                &key("EXECUTOR_PARK_TIMEOUT_MS"),
                base.park_timeout.as_millis() as u64,
            )),
        }
    }

    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    pub fn queue_depth(mut self, n: usize) -> Self {
        self.queue_depth = n;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }
}

/// Shared state between submitters and executor threads.
struct ExecInner {
    /// Job queue: submitters → threads.
    queue: ArrayQueue<Job>,
    /// Number of threads currently running a job.
    active: AtomicUsize,
    /// Shutdown flag.
    shutdown: AtomicBool,
    park_timeout: Duration,
}

pub struct ThreadedExecutor {
    inner: Arc<ExecInner>,
    threads: Vec<Thread>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_wake: AtomicUsize,
}

impl ThreadedExecutor {
    /// Spawn the executor threads.
    pub fn new(config: ExecutorConfig) -> io::Result<Self> {
        let n = config.threads.clamp(1, MAX_THREADS);
        let inner = Arc::new(ExecInner {
            queue: ArrayQueue::new(config.queue_depth.max(1)),
            active: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            park_timeout: config.park_timeout,
        });

        let mut handles = Vec::with_capacity(n);
        for index in 0..n {
            let inner_ref = Arc::clone(&inner);
            let spawned = thread::Builder::new()
                .name(format!("inferpipe-exec-{}", index))
                .spawn(move || exec_loop(inner_ref));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Threads already running see the flag and exit.
                    inner.shutdown.store(true, Ordering::SeqCst);
                    for handle in &handles {
                        handle.thread().unpark();
                    }
                    return Err(e);
                }
            }
        }

        info!(
            "executor started: {} threads, queue depth {}",
            n,
            inner.queue.capacity()
        );

        Ok(Self {
            threads: handles.iter().map(|h| h.thread().clone()).collect(),
            handles: Mutex::new(handles),
            inner,
            next_wake: AtomicUsize::new(0),
        })
    }

    /// Queue a job. Never blocks.
    ///
    /// If the queue is full or the executor is shut down, the job is
    /// invoked inline with `JobStatus::Rejected`.
    pub fn execute(&self, job: Job) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            job(JobStatus::Rejected);
            return;
        }
        match self.inner.queue.push(job) {
            Ok(()) => {
                // Pairs with the fence in `shutdown`: either its final drain
                // sees this push, or this load sees the flag.
                atomic::fence(Ordering::SeqCst);
                if self.inner.shutdown.load(Ordering::SeqCst) {
                    self.reject_queued();
                } else {
                    self.wake_one();
                }
            }
            Err(job) => {
                warn!("executor queue full, rejecting job");
                job(JobStatus::Rejected);
            }
        }
    }

    /// Pop every queued job and call it with `JobStatus::Rejected`.
    fn reject_queued(&self) {
        while let Some(job) = self.inner.queue.pop() {
            job(JobStatus::Rejected);
        }
    }

    fn wake_one(&self) {
        let i = self.next_wake.fetch_add(1, Ordering::Relaxed) % self.threads.len();
        self.threads[i].unpark();
    }

    /// Threads currently running a job
    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    pub fn total_workers(&self) -> usize {
        self.threads.len()
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Stop accepting jobs, let threads drain the queue, and join them.
    ///
    /// Idempotent. When called from an executor thread (the last handle
    /// dropped inside a job) that thread is detached instead of joined.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        atomic::fence(Ordering::SeqCst);
        for t in &self.threads {
            t.unpark();
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("executor thread panicked");
            }
        }

        // Anything pushed after the threads exited still gets its callback.
        self.reject_queued();
    }
}

impl Drop for ThreadedExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Executor thread main loop.
fn exec_loop(inner: Arc<ExecInner>) {
    loop {
        match inner.queue.pop() {
            Some(job) => {
                inner.active.fetch_add(1, Ordering::Relaxed);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(JobStatus::Run))) {
                    error!("executor job panicked: {}", describe_panic(payload.as_ref()));
                }
                inner.active.fetch_sub(1, Ordering::Relaxed);
            }
            None => {
                if inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
                thread::park_timeout(inner.park_timeout);
            }
        }
    }
}

/// Worker slot that runs a compute function on a shared `ThreadedExecutor`.
pub struct ExecutorWorker<I, O> {
    executor: Arc<ThreadedExecutor>,
    compute: Arc<ComputeFn<I, O>>,
    outputs: Arc<NamedOutputs<O>>,
}

impl<I, O> ExecutorWorker<I, O> {
    pub fn new<F>(executor: Arc<ThreadedExecutor>, compute: F) -> Self
    where
        F: Fn(I) -> Result<Outputs<O>, WorkerError> + Send + Sync + 'static,
    {
        Self {
            executor,
            compute: Arc::new(compute),
            outputs: Arc::new(NamedOutputs::new()),
        }
    }
}

impl<I, O> Worker for ExecutorWorker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn start_async(&self, input: I, on_done: Completion) {
        let compute = Arc::clone(&self.compute);
        let outputs = Arc::clone(&self.outputs);
        self.executor.execute(Box::new(move |status| match status {
            JobStatus::Run => match run_compute(&*compute, input) {
                Ok(named) => {
                    outputs.replace(named);
                    on_done(Ok(()));
                }
                Err(err) => on_done(Err(err)),
            },
            JobStatus::Rejected => on_done(Err(WorkerError::Rejected)),
        }));
    }

    fn output(&self, selector: &str) -> Result<O, WorkerError> {
        self.outputs.take(selector)
    }
}
