//! Reorder buffer for out-of-order completions
//!
//! Completions land here keyed by sequence id in whatever order workers
//! finish. The consumer only ever asks for the one id it needs next, so
//! delivery order is decided by the pipeline's output counter and not by
//! the container.

use std::collections::HashMap;
use std::time::Instant;

use inferpipe_core::SeqId;

/// A finished unit waiting to be delivered
#[derive(Debug)]
pub struct PendingResult<T> {
    /// Sequence id assigned at submission
    pub id: SeqId,
    /// Extracted output
    pub output: T,
    /// When the unit was submitted
    pub started: Instant,
}

/// Sequence id → completed result
#[derive(Debug)]
pub struct ResultBuffer<T> {
    entries: HashMap<SeqId, PendingResult<T>>,
}

impl<T> Default for ResultBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultBuffer<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Store a completion.
    ///
    /// An id already present is an invariant violation; the existing entry
    /// is kept and the rejected result is handed back.
    pub fn insert(&mut self, result: PendingResult<T>) -> Result<(), PendingResult<T>> {
        if self.entries.contains_key(&result.id) {
            return Err(result);
        }
        self.entries.insert(result.id, result);
        Ok(())
    }

    /// Remove and return the entry for `expected`, if it has completed.
    ///
    /// No other id is inspected.
    pub fn try_extract(&mut self, expected: SeqId) -> Option<PendingResult<T>> {
        self.entries.remove(&expected)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
