//! Fixed-size pool of reusable worker slots
//!
//! Every slot is built once by the `WorkerFactory` and lives as long as the
//! pool. Idle slots sit on a LIFO free stack so the most recently released
//! worker is handed out first.
//!
//! The pool itself is not synchronized. It lives inside the pipeline's
//! monitor state, so both `acquire_idle` (caller thread) and `release`
//! (completion thread) run under the same lock.

use std::sync::Arc;

use inferpipe_core::{ConfigError, Worker, WorkerFactory};
use log::info;

/// Index of a slot within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

/// An in-use slot handed to the submitter
pub struct Lease<W> {
    pub slot: SlotId,
    pub worker: Arc<W>,
}

/// Fixed-size worker pool
pub struct WorkerPool<W: Worker> {
    workers: Vec<Arc<W>>,
    in_use: Vec<bool>,
    /// LIFO stack of idle slot indices
    free: Vec<usize>,
}

impl<W: Worker> WorkerPool<W> {
    /// Build `max_concurrency` workers, all idle.
    pub fn new<F>(factory: &F, max_concurrency: usize) -> Result<Self, ConfigError>
    where
        F: WorkerFactory<W> + ?Sized,
    {
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(max_concurrency));
        }

        let mut workers = Vec::with_capacity(max_concurrency);
        for index in 0..max_concurrency {
            let worker = factory
                .create(index)
                .map_err(|source| ConfigError::WorkerCreation { index, source })?;
            workers.push(Arc::new(worker));
        }

        // Reverse so slot 0 is popped first on a fresh pool
        let free = (0..max_concurrency).rev().collect();
        info!("worker pool ready with {} slots", max_concurrency);

        Ok(Self {
            workers,
            in_use: vec![false; max_concurrency],
            free,
        })
    }

    /// Take an idle slot and mark it in-use. Never blocks.
    pub fn acquire_idle(&mut self) -> Option<Lease<W>> {
        let index = self.free.pop()?;
        debug_assert!(!self.in_use[index], "free stack held an in-use slot");
        self.in_use[index] = true;
        Some(Lease {
            slot: SlotId(index),
            worker: Arc::clone(&self.workers[index]),
        })
    }

    /// Return a slot to idle.
    ///
    /// Returns false if the slot was already idle (a worker fired its
    /// completion twice); the free stack is left untouched in that case.
    pub fn release(&mut self, slot: SlotId) -> bool {
        let index = slot.0;
        if !self.in_use[index] {
            return false;
        }
        self.in_use[index] = false;
        self.free.push(index);
        true
    }

    /// Number of slots currently executing a unit
    #[inline]
    pub fn in_use_count(&self) -> usize {
        self.workers.len() - self.free.len()
    }

    /// Total slots (fixed at construction)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.workers.len()
    }

    /// Whether `acquire_idle` would succeed
    #[inline]
    pub fn has_idle(&self) -> bool {
        !self.free.is_empty()
    }
}
