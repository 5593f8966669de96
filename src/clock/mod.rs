//! Cycle counter sources and cycle/time conversion.

pub mod manual;
pub mod tsc;

use std::sync::Arc;

use crate::core::types::Cycles;

pub use manual::ManualClock;
pub use tsc::TscClock;

/// A monotonic cycle counter with a calibrated rate.
pub trait CycleClock: Send + Sync {
    /// Current counter value
    fn now(&self) -> Cycles;

    /// Counter increments per second
    fn cycles_per_second(&self) -> f64;

    #[inline]
    fn cycles_to_seconds(&self, cycles: Cycles) -> f64 {
        cycles as f64 / self.cycles_per_second()
    }

    #[inline]
    fn cycles_to_nanoseconds(&self, cycles: Cycles) -> f64 {
        cycles as f64 * 1e9 / self.cycles_per_second()
    }

    #[inline]
    fn nanoseconds_to_cycles(&self, nanos: f64) -> Cycles {
        (nanos * self.cycles_per_second() / 1e9).round() as Cycles
    }
}

impl<C: CycleClock + ?Sized> CycleClock for Arc<C> {
    #[inline(always)]
    fn now(&self) -> Cycles {
        (**self).now()
    }

    #[inline(always)]
    fn cycles_per_second(&self) -> f64 {
        (**self).cycles_per_second()
    }
}

impl<C: CycleClock + ?Sized> CycleClock for &C {
    #[inline(always)]
    fn now(&self) -> Cycles {
        (**self).now()
    }

    #[inline(always)]
    fn cycles_per_second(&self) -> f64 {
        (**self).cycles_per_second()
    }
}
