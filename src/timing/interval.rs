//! Integer microsecond arithmetic for wall-clock timestamps
//!
//! Sample deadlines are advanced millions of times over a long session, so
//! they are kept as whole microseconds. Floating point only appears in the
//! cycle/microsecond conversions, and never accumulates.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const MICROS_PER_SEC: u64 = 1_000_000;

/// Wall-clock timestamp in whole microseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WallTime(u64);

impl WallTime {
    pub const fn from_micros(micros: u64) -> Self {
        WallTime(micros)
    }

    pub fn from_secs_micros(secs: u64, micros: u64) -> Self {
        WallTime(secs * MICROS_PER_SEC + micros)
    }

    /// Current system time
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        WallTime(micros)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    pub fn secs(self) -> u64 {
        self.0 / MICROS_PER_SEC
    }

    pub fn subsec_micros(self) -> u64 {
        self.0 % MICROS_PER_SEC
    }

    /// Round down to the start of the `interval_us`-wide bucket containing
    /// this timestamp
    pub fn truncate(self, interval_us: u64) -> Self {
        if interval_us == 0 {
            return self;
        }
        WallTime(self.0 / interval_us * interval_us)
    }

    /// Advance by a whole number of microseconds
    pub fn advance(self, micros: u64) -> Self {
        WallTime(self.0 + micros)
    }

    /// Microseconds from `earlier` to `self` (0 if `earlier` is later)
    pub fn micros_since(self, earlier: WallTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs(), self.subsec_micros())
    }
}

/// Convert a cycle count to microseconds at `cycles_per_us`
#[inline]
pub fn micros_from_cycles(cycles: u64, cycles_per_us: f64) -> f64 {
    cycles as f64 / cycles_per_us
}

/// Convert microseconds to the equivalent cycle count at `cycles_per_us`
#[inline]
pub fn cycles_from_micros(micros: u64, cycles_per_us: f64) -> u64 {
    (micros as f64 * cycles_per_us) as u64
}
