//! # Shared Counter
//!
//! A single atomic integer shared between threads. Used to hand out
//! resource ids on the requesting side without a round trip to the owner.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Cloneable handle to one shared atomic counter.
///
/// Every clone increments the same cell. Values wrap at `u32::MAX`; at
/// one allocation per frame that is longer than any session lives.
#[derive(Clone, Debug, Default)]
pub struct SharedCounter {
    cell: Arc<AtomicU32>,
}

impl SharedCounter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a counter whose first [`fetch_next`](Self::fetch_next) returns `start`.
    #[must_use]
    pub fn starting_at(start: u32) -> Self {
        Self {
            cell: Arc::new(AtomicU32::new(start)),
        }
    }

    /// Returns the current value and advances the counter.
    #[inline]
    pub fn fetch_next(&self) -> u32 {
        self.cell.fetch_add(1, Ordering::AcqRel)
    }

    /// Current value, without advancing.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.cell.load(Ordering::Acquire)
    }
}
