//! Cycle counter and wall clock sources
//!
//! `TscClock` reads the hardware counter directly (`rdtsc` on x86_64,
//! `cntvct_el0` on aarch64). The counter is not synchronized across cores,
//! which is why sessions pin themselves to one CPU before reading it.
//!
//! `ManualClock` is driven explicitly and runs at one cycle per microsecond.
//! It backs trace replay and deterministic tests.

use super::interval::WallTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of cycle counts and wall-clock time
pub trait Clock {
    /// Current value of the cycle counter
    fn cycles(&self) -> u64;

    /// Current wall-clock time
    fn wall_time(&self) -> WallTime;

    /// Known cycles-per-microsecond rate, for clocks that need no
    /// calibration or CPU pinning
    fn fixed_rate(&self) -> Option<f64> {
        None
    }
}

/// Hardware cycle counter
#[derive(Debug, Clone, Copy, Default)]
pub struct TscClock;

impl TscClock {
    pub fn new() -> Self {
        TscClock
    }
}

impl Clock for TscClock {
    #[inline(always)]
    fn cycles(&self) -> u64 {
        read_counter()
    }

    fn wall_time(&self) -> WallTime {
        WallTime::now()
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_counter() -> u64 {
    // SAFETY: rdtsc has no preconditions on x86_64
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn read_counter() -> u64 {
    let val: u64;
    // SAFETY: cntvct_el0 is readable from EL0 on all supported platforms
    unsafe { core::arch::asm!("mrs {}, cntvct_el0", out(reg) val) };
    val
}

// Without a readable counter, fall back to nanoseconds from a process epoch.
// Calibration then simply measures ~1000 cycles per microsecond.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn read_counter() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Explicitly advanced clock at one cycle per microsecond
///
/// Clones share the same time source, so a test can keep a handle and move
/// time forward while the profiler owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: WallTime,
    elapsed_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start at `base` with zero elapsed time
    pub fn new(base: WallTime) -> Self {
        ManualClock {
            base,
            elapsed_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move time forward
    pub fn advance(&self, micros: u64) {
        self.elapsed_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Jump to an absolute offset from `base`; never moves backwards
    pub fn set_elapsed(&self, micros: u64) {
        self.elapsed_us.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed_us.load(Ordering::Relaxed)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(WallTime::from_micros(0))
    }
}

impl Clock for ManualClock {
    fn cycles(&self) -> u64 {
        self.elapsed()
    }

    fn wall_time(&self) -> WallTime {
        self.base.advance(self.elapsed())
    }

    fn fixed_rate(&self) -> Option<f64> {
        Some(1.0)
    }
}
