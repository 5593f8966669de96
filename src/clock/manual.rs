use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::CycleClock;
use crate::core::types::Cycles;

/// Clock whose counter only moves when told to. Used for deterministic
/// traces in tests and for replaying captured timestamps.
#[derive(Debug)]
pub struct ManualClock {
    cycles_per_second: f64,
    counter: AtomicU64,
}

impl ManualClock {
    pub fn new(cycles_per_second: f64) -> Self {
        Self {
            cycles_per_second,
            counter: AtomicU64::new(0),
        }
    }

    pub fn set(&self, cycles: Cycles) {
        self.counter.store(cycles, Ordering::Relaxed);
    }

    /// Moves the counter forward and returns the new value
    pub fn advance(&self, cycles: Cycles) -> Cycles {
        self.counter.fetch_add(cycles, Ordering::Relaxed) + cycles
    }
}

impl CycleClock for ManualClock {
    #[inline(always)]
    fn now(&self) -> Cycles {
        self.counter.load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn cycles_per_second(&self) -> f64 {
        self.cycles_per_second
    }
}
