//! Identifier allocation.
//!
//! Connection IDs, application-instance IDs and window IDs are all handed
//! out by independent [`IdAllocator`]s. Each allocation starts scanning right
//! after the previously returned value, wraps from `max` back to `min`, and
//! gives up once the whole range has been visited.

use thiserror::Error;

/// Every ID in the allocator's range is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("identifier space exhausted: all IDs in {min}..={max} are in use")]
pub struct ExhaustedError {
    /// Lowest ID of the range.
    pub min: u64,
    /// Highest ID of the range.
    pub max: u64,
}

/// Next-free-slot allocator over an inclusive `u64` range.
///
/// The allocator does not track which IDs are live; the caller passes a
/// predicate describing the IDs currently in use. Releasing an ID is simply
/// removing it from that set.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    min: u64,
    max: u64,
    last: Option<u64>,
}

impl IdAllocator {
    /// Creates an allocator over `min..=max`.
    ///
    /// If `max < min` the bounds are swapped.
    pub fn new(min: u64, max: u64) -> Self {
        let (min, max) = if max < min { (max, min) } else { (min, max) };
        Self {
            min,
            max,
            last: None,
        }
    }

    /// Allocator over the full `u64` range, starting at zero.
    pub fn unbounded() -> Self {
        Self::new(0, u64::MAX)
    }

    /// Lowest ID this allocator returns.
    pub fn min(&self) -> u64 {
        self.min
    }

    /// Highest ID this allocator returns.
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Last ID handed out, if any.
    pub fn last_allocated(&self) -> Option<u64> {
        self.last
    }

    /// Returns the first ID after the last allocation for which `in_use`
    /// is false.
    ///
    /// # Errors
    ///
    /// Returns [`ExhaustedError`] when every ID in the range is in use.
    pub fn allocate<F>(&mut self, in_use: F) -> Result<u64, ExhaustedError>
    where
        F: Fn(u64) -> bool,
    {
        let mut candidate = match self.last {
            Some(last) => self.successor(last),
            None => self.min,
        };

        // Number of slots is (max - min + 1), which overflows for the full
        // u64 range; count visited slots as (max - min) plus the first one.
        let span = self.max - self.min;
        let mut visited: u64 = 0;

        loop {
            if !in_use(candidate) {
                self.last = Some(candidate);
                return Ok(candidate);
            }
            if visited == span {
                return Err(ExhaustedError {
                    min: self.min,
                    max: self.max,
                });
            }
            visited += 1;
            candidate = self.successor(candidate);
        }
    }

    fn successor(&self, id: u64) -> u64 {
        if id >= self.max || id < self.min {
            self.min
        } else {
            id + 1
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::unbounded()
    }
}
