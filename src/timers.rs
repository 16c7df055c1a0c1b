//! Phase timing for targeting queries.

use std::time::{Duration, Instant};

/// Adds the time between its creation and its drop to a `Duration` slot.
///
/// Early returns through `?` still record the elapsed time.
pub struct PhaseTimer<'a> {
    start: Instant,
    slot: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(slot: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            slot,
        }
    }

    /// Run `f`, adding its running time to `slot`.
    pub fn measure<T>(slot: &'a mut Duration, f: impl FnOnce() -> T) -> T {
        let _timer = PhaseTimer::new(slot);
        f()
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        *self.slot += self.start.elapsed();
    }
}

/// Time spent in each phase of one query.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QueryTimings {
    pub list_ids: Duration,
    pub compile: Duration,
    pub matching: Duration,
}
