//! High-resolution timing for the profiler
//!
//! - `clock`: cycle counter and wall clock sources
//! - `affinity`: CPU pinning with exact mask restore
//! - `calibration`: per-CPU counter frequency measurement
//! - `interval`: drift-free microsecond arithmetic for sample deadlines
//!
//! `Timer` ties these together for a profiler instance: it owns the clock,
//! caches the frequency table across sessions, and pins each session to one
//! calibrated CPU.

pub mod affinity;
pub mod calibration;
pub mod clock;
pub mod interval;

pub use affinity::CpuAffinity;
pub use calibration::FrequencyTable;
pub use clock::{Clock, ManualClock, TscClock};
pub use interval::{cycles_from_micros, micros_from_cycles, WallTime};

use crate::error::{ProfilerError, Result};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

/// Clock plus calibration and pinning state for one profiler instance
#[derive(Debug)]
pub struct Timer<C: Clock> {
    clock: C,
    affinity: Option<CpuAffinity>,
    frequencies: Option<FrequencyTable>,
}

impl<C: Clock> Timer<C> {
    /// Create a timer, capturing the current affinity mask when the clock
    /// needs pinning. Failure here means the profiler cannot be used.
    pub fn new(clock: C) -> Result<Self> {
        let affinity = match clock.fixed_rate() {
            Some(_) => None,
            None => Some(CpuAffinity::capture()?),
        };
        Ok(Timer {
            clock,
            affinity,
            frequencies: None,
        })
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Prepare a session: calibrate if needed, then pin to a random
    /// calibrated CPU. Returns that CPU's cycles-per-microsecond rate.
    ///
    /// On failure the affinity mask is restored and, if calibration itself
    /// failed, the cached table is dropped so the next session retries.
    pub fn begin_session(&mut self) -> Result<f64> {
        if let Some(rate) = self.clock.fixed_rate() {
            return Ok(rate);
        }
        let Some(affinity) = self.affinity.as_mut() else {
            return Err(ProfilerError::Calibration(
                "no affinity state for a calibrated clock".to_string(),
            ));
        };

        if self.frequencies.is_none() {
            let measured = calibration::calibrate_cpus(&self.clock, affinity);
            restore_or_warn(affinity);
            match measured {
                Ok(table) => self.frequencies = Some(table),
                Err(err) => {
                    warn!("CPU frequency calibration failed: {}", err);
                    return Err(err);
                }
            }
        }

        let table = self.frequencies.as_ref().ok_or_else(|| {
            ProfilerError::Calibration("frequency table unavailable".to_string())
        })?;
        let cpus = table.cpus();
        let cpu = *cpus
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| ProfilerError::Calibration("no calibrated CPU".to_string()))?;
        let rate = table.get(cpu).ok_or(ProfilerError::NoCalibratedCpu(cpu))?;

        if let Err(err) = affinity.bind(cpu) {
            restore_or_warn(affinity);
            return Err(err);
        }
        debug!(cpu, cycles_per_us = rate, "pinned profiling session");
        Ok(rate)
    }

    /// Undo the session's CPU pinning
    pub fn end_session(&mut self) {
        if let Some(affinity) = self.affinity.as_mut() {
            if affinity.is_bound() {
                restore_or_warn(affinity);
            }
        }
    }

    /// Drop the cached frequency table and undo any pinning still in
    /// effect. An unpinned process keeps whatever mask it has now.
    pub fn clear_frequencies(&mut self) {
        self.frequencies = None;
        self.end_session();
    }

    /// Cached per-CPU rates, if calibration has run
    pub fn frequencies(&self) -> Option<&FrequencyTable> {
        self.frequencies.as_ref()
    }

    /// CPU the session is pinned to, if pinned
    pub fn current_cpu(&self) -> Option<usize> {
        self.affinity
            .as_ref()
            .filter(|a| a.is_bound())
            .map(CpuAffinity::current_cpu)
    }
}

fn restore_or_warn(affinity: &mut CpuAffinity) {
    if let Err(err) = affinity.restore() {
        warn!("failed to restore CPU affinity: {}", err);
    }
}
