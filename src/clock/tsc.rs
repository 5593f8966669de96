use std::hint::spin_loop;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clock::CycleClock;
use crate::core::types::Cycles;

/// Busy-wait window used to measure the counter rate.
pub const CALIBRATION_WINDOW: Duration = Duration::from_millis(10);

/// Rate assumed when calibration produces nonsense
const FALLBACK_CYCLES_PER_SECOND: f64 = 1e9;

/// Hardware time-stamp counter with a rate measured once per process.
#[derive(Debug, Clone, Copy)]
pub struct TscClock {
    cycles_per_second: f64,
}

impl TscClock {
    /// The process-wide calibrated clock. The first call spends
    /// `CALIBRATION_WINDOW` measuring the counter.
    pub fn calibrated() -> TscClock {
        static CLOCK: OnceLock<TscClock> = OnceLock::new();
        *CLOCK.get_or_init(|| TscClock::calibrate(CALIBRATION_WINDOW))
    }

    /// Measures the counter against the monotonic OS clock over `window`.
    pub fn calibrate(window: Duration) -> Self {
        let start_time = Instant::now();
        let start_cycles = read_counter_serialized();

        while start_time.elapsed() < window {
            spin_loop();
        }

        let end_cycles = read_counter_serialized();
        let elapsed = start_time.elapsed().as_secs_f64();
        let rate = end_cycles.saturating_sub(start_cycles) as f64 / elapsed;

        if rate.is_finite() && rate > 0.0 {
            debug!(cycles_per_second = rate, "calibrated cycle counter");
            Self {
                cycles_per_second: rate,
            }
        } else {
            warn!(
                measured = rate,
                "cycle counter calibration failed, assuming 1 GHz"
            );
            Self::with_rate(FALLBACK_CYCLES_PER_SECOND)
        }
    }

    /// A clock with a known rate, skipping calibration
    pub fn with_rate(cycles_per_second: f64) -> Self {
        Self { cycles_per_second }
    }
}

impl CycleClock for TscClock {
    #[inline(always)]
    fn now(&self) -> Cycles {
        read_counter()
    }

    #[inline(always)]
    fn cycles_per_second(&self) -> f64 {
        self.cycles_per_second
    }
}

/// Reads the time-stamp counter without serialization; cheapest possible
/// timestamp for the record path.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
#[allow(unused_unsafe)]
pub fn read_counter() -> Cycles {
    unsafe { std::arch::x86_64::_rdtsc() }
}

/// Nanoseconds since a process-wide anchor on targets without a TSC
#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub fn read_counter() -> Cycles {
    anchor().elapsed().as_nanos() as Cycles
}

/// Counter read fenced on both sides so earlier and later instructions
/// cannot be reordered around it. Used for calibration.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
#[allow(unused_unsafe)]
pub fn read_counter_serialized() -> Cycles {
    unsafe {
        std::arch::x86_64::_mm_mfence();
        std::arch::x86_64::_mm_lfence();
        let tsc = std::arch::x86_64::_rdtsc();
        std::arch::x86_64::_mm_lfence();
        tsc
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub fn read_counter_serialized() -> Cycles {
    read_counter()
}

#[cfg(not(target_arch = "x86_64"))]
fn anchor() -> Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    *ANCHOR.get_or_init(Instant::now)
}
