//! Cycle counter frequency calibration
//!
//! The counter rate is measured by sleeping a fixed interval and comparing
//! elapsed cycles against elapsed wall time. Rates can differ between
//! logical CPUs, so every CPU in the saved affinity mask is measured while
//! bound to it. The whole table takes a few milliseconds per CPU and is
//! cached by the caller across sessions.

use super::affinity::CpuAffinity;
use super::clock::Clock;
use crate::error::{ProfilerError, Result};
use std::time::{Duration, Instant};
use tracing::debug;

/// Sleep used for a single frequency measurement
pub const CALIBRATION_SLEEP: Duration = Duration::from_millis(5);

/// Measure the counter rate (cycles per microsecond) on the current CPU
pub fn measure_rate<C: Clock>(clock: &C) -> Result<f64> {
    let wall_start = Instant::now();
    let cycles_start = clock.cycles();

    std::thread::sleep(CALIBRATION_SLEEP);

    let cycles_end = clock.cycles();
    let elapsed_us = wall_start.elapsed().as_micros() as u64;

    if elapsed_us == 0 {
        return Err(ProfilerError::Calibration(
            "no wall time elapsed during calibration".to_string(),
        ));
    }
    if cycles_end <= cycles_start {
        return Err(ProfilerError::Calibration(
            "cycle counter did not advance".to_string(),
        ));
    }

    Ok((cycles_end - cycles_start) as f64 / elapsed_us as f64)
}

/// Cycles-per-microsecond rate for each logical CPU, indexed by CPU id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyTable {
    rates: Vec<Option<f64>>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cpu: usize, rate: f64) {
        if self.rates.len() <= cpu {
            self.rates.resize(cpu + 1, None);
        }
        self.rates[cpu] = Some(rate);
    }

    pub fn get(&self, cpu: usize) -> Option<f64> {
        self.rates.get(cpu).copied().flatten()
    }

    /// CPU ids with a measured rate
    pub fn cpus(&self) -> Vec<usize> {
        self.iter().map(|(cpu, _)| cpu).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.rates
            .iter()
            .enumerate()
            .filter_map(|(cpu, rate)| rate.map(|r| (cpu, r)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Bind to each allowed CPU in turn and measure its rate.
///
/// Stops at the first failure; the caller is responsible for restoring the
/// affinity mask afterwards either way.
pub fn calibrate_cpus<C: Clock>(clock: &C, affinity: &mut CpuAffinity) -> Result<FrequencyTable> {
    let mut table = FrequencyTable::new();
    let cpus = affinity.allowed_cpus().to_vec();

    for cpu in cpus {
        affinity.bind(cpu)?;
        // Give the scheduler a chance to move us onto the target CPU
        std::thread::yield_now();

        let rate = measure_rate(clock)?;
        debug!(cpu, cycles_per_us = rate, "calibrated CPU frequency");
        table.insert(cpu, rate);
    }

    if table.is_empty() {
        return Err(ProfilerError::Calibration(
            "no CPU available for calibration".to_string(),
        ));
    }
    Ok(table)
}
