//! Monotonic sequence source for `$seq()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

static PROCESS_SEQUENCE: LazyLock<Arc<SequenceCounter>> =
    LazyLock::new(|| Arc::new(SequenceCounter::new()));

/// Atomically incremented counter; the first value handed out is 1.
///
/// Lifecycle: the binary takes [`SequenceCounter::process`] once at startup
/// and injects it into every evaluator, so values never repeat for the life
/// of the process. Tests build their own counter with [`SequenceCounter::new`].
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide counter. Never reset.
    pub fn process() -> Arc<SequenceCounter> {
        Arc::clone(&PROCESS_SEQUENCE)
    }

    /// Hand out the next value.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last value handed out, 0 if none yet.
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
