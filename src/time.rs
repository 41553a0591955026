//! Monotonic microsecond clock shared between an engine and its host.

use std::time::{Duration, Instant};

/// Monotonic clock with an arbitrary per-stream epoch.
///
/// All engine deadlines and wire timestamps are microseconds on this clock,
/// so a `Clock` copy handed to the host interprets the atomic deadline cells
/// published by the engine thread.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Microseconds elapsed since the stream epoch.
    pub fn now_usec(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Instant corresponding to an absolute microsecond deadline.
    pub fn instant_at(&self, usec: u64) -> Instant {
        self.epoch + Duration::from_micros(usec)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
