//! Arrival timestamps.

use quanta::Clock;

/// Nanoseconds since engine start from the TSC-backed `quanta` clock.
///
/// Readings are non-decreasing but may repeat; equal arrivals fall back to
/// insertion order inside the book.
#[derive(Clone, Debug)]
pub struct ArrivalClock {
    clock: Clock,
    epoch: u64,
}

impl ArrivalClock {
    /// Start a clock at zero.
    pub fn new() -> Self {
        Self::from_clock(Clock::new())
    }

    /// Start from an existing (possibly mocked) `quanta` clock.
    pub fn from_clock(clock: Clock) -> Self {
        let epoch = clock.raw();
        Self { clock, epoch }
    }

    /// Current arrival time.
    #[inline(always)]
    pub fn now(&self) -> u64 {
        self.clock.delta_as_nanos(self.epoch, self.clock.raw())
    }
}

impl Default for ArrivalClock {
    fn default() -> Self {
        Self::new()
    }
}
