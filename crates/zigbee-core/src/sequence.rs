//! ZCL transaction sequence numbers

use std::sync::atomic::{AtomicU8, Ordering};

/// Transaction sequence number allocator
///
/// Yields 1..=255 and never 0. One instance is shared by every frame the
/// network sends.
#[derive(Debug)]
pub struct TransactionSequence {
    current: AtomicU8,
}

impl TransactionSequence {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: AtomicU8::new(1),
        }
    }

    /// Advance and return the new value, wrapping from 255 to 1
    pub fn next(&self) -> u8 {
        let step = |cur: u8| if cur >= 255 { 1 } else { cur + 1 };
        match self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| Some(step(cur)))
        {
            Ok(prev) | Err(prev) => step(prev),
        }
    }
}

impl Default for TransactionSequence {
    fn default() -> Self {
        Self::new()
    }
}
