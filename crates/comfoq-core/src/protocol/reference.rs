//! Thread-safe reference counter for request/response correlation.
//!
//! # What is a reference? (for beginners)
//!
//! Every request the app sends carries a small integer in its operation
//! header.  The gateway copies that number into its reply, which is how a
//! confirm is matched to the request that caused it, even when several
//! requests are in flight at once.

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonically increasing source of request references.
///
/// References start at 1 and never take the value 0; on wrap-around the
/// counter skips straight back to 1.
///
/// # Examples
///
/// ```rust
/// use comfoq_core::protocol::ReferenceCounter;
///
/// let counter = ReferenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct ReferenceCounter {
    inner: AtomicU32,
}

impl ReferenceCounter {
    /// Creates a counter whose first value is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a counter whose first value is `start` (0 is bumped to 1).
    pub fn starting_at(start: u32) -> Self {
        Self {
            inner: AtomicU32::new(start.max(1)),
        }
    }

    /// Returns the next reference.
    pub fn next(&self) -> u32 {
        loop {
            let value = self.inner.fetch_add(1, Ordering::Relaxed);
            if value != 0 {
                return value;
            }
        }
    }

    /// Returns the value the next call to [`next`](Self::next) will try.
    pub fn peek(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for ReferenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
