//! Sequence identifier type

use core::fmt;

/// Submission-order identifier for one unit of work.
///
/// Ids are handed out contiguously starting at zero. The counter lives in
/// the non-negative half of an `i64`: stepping past `i64::MAX` wraps back
/// to zero instead of going negative. Ordering is never decided by
/// comparing two ids arithmetically; the reorder logic only ever asks for
/// "the exact successor of the last delivered id", so zero is correctly
/// treated as coming after `MAX` for one cycle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct SeqId(i64);

impl SeqId {
    /// First id of a run
    pub const ZERO: SeqId = SeqId(0);

    /// Largest id before the counter wraps
    pub const MAX: SeqId = SeqId(i64::MAX);

    /// Create an id from a raw value.
    ///
    /// Negative values are clamped to zero; they are never produced by a
    /// counter.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        if raw < 0 {
            SeqId(0)
        } else {
            SeqId(raw)
        }
    }

    /// Get the raw value
    #[inline]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// The id that follows this one, wrapping to zero after `MAX`.
    #[inline]
    pub const fn next(self) -> SeqId {
        match self.0.checked_add(1) {
            Some(v) => SeqId(v),
            None => SeqId(0),
        }
    }

    /// Advance in place and return the previous value.
    #[inline]
    pub fn advance(&mut self) -> SeqId {
        let current = *self;
        *self = current.next();
        current
    }

    /// Number of ids between `self` (inclusive) and `later` (exclusive),
    /// following the wrap.
    pub fn distance_to(self, later: SeqId) -> u64 {
        if later.0 >= self.0 {
            (later.0 - self.0) as u64
        } else {
            // later wrapped past MAX back through zero
            (i64::MAX - self.0) as u64 + 1 + later.0 as u64
        }
    }
}

impl From<SeqId> for i64 {
    #[inline]
    fn from(id: SeqId) -> Self {
        id.0
    }
}

impl fmt::Debug for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqId({})", self.0)
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
