//! CPU affinity save/pin/restore
//!
//! Cycle counters are per-core, so a session binds the process to a single
//! logical CPU for calibration and for the whole profiling run. The mask in
//! effect before the first bind is captured once and restored exactly when
//! the session ends or calibration fails.

use crate::error::{ProfilerError, Result};
use tracing::debug;

/// Saved affinity mask plus the CPU the process is currently bound to
#[derive(Debug, Clone)]
pub struct CpuAffinity {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    saved: nix::sched::CpuSet,
    allowed: Vec<usize>,
    bound: Option<usize>,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl CpuAffinity {
    /// Capture the current affinity mask
    pub fn capture() -> Result<Self> {
        use nix::sched::{sched_getaffinity, CpuSet};
        use nix::unistd::Pid;

        let saved = sched_getaffinity(Pid::from_raw(0)).map_err(|source| {
            ProfilerError::Affinity {
                op: "get",
                source,
            }
        })?;
        let allowed: Vec<usize> = (0..CpuSet::count())
            .filter(|&cpu| saved.is_set(cpu).unwrap_or(false))
            .collect();
        debug!(cpus = allowed.len(), "captured CPU affinity mask");
        Ok(CpuAffinity {
            saved,
            allowed,
            bound: None,
        })
    }

    /// Bind the process to a single logical CPU
    pub fn bind(&mut self, cpu: usize) -> Result<()> {
        use nix::sched::{sched_setaffinity, CpuSet};
        use nix::unistd::Pid;

        let mut mask = CpuSet::new();
        mask.set(cpu)
            .map_err(|source| ProfilerError::Affinity { op: "set", source })?;
        sched_setaffinity(Pid::from_raw(0), &mask)
            .map_err(|source| ProfilerError::Affinity { op: "set", source })?;
        self.bound = Some(cpu);
        Ok(())
    }

    /// Put the saved mask back
    pub fn restore(&mut self) -> Result<()> {
        use nix::sched::sched_setaffinity;
        use nix::unistd::Pid;

        sched_setaffinity(Pid::from_raw(0), &self.saved).map_err(|source| {
            ProfilerError::Affinity {
                op: "restore",
                source,
            }
        })?;
        self.bound = None;
        Ok(())
    }
}

// Platforms without sched_setaffinity: the "mask" is every available CPU
// and binding only records the chosen id.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl CpuAffinity {
    pub fn capture() -> Result<Self> {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Ok(CpuAffinity {
            allowed: (0..cpus).collect(),
            bound: None,
        })
    }

    pub fn bind(&mut self, cpu: usize) -> Result<()> {
        self.bound = Some(cpu);
        Ok(())
    }

    pub fn restore(&mut self) -> Result<()> {
        self.bound = None;
        Ok(())
    }
}

impl CpuAffinity {
    /// CPUs permitted by the saved mask, in ascending order
    pub fn allowed_cpus(&self) -> &[usize] {
        &self.allowed
    }

    /// CPU the process is bound to; 0 when unbound
    pub fn current_cpu(&self) -> usize {
        self.bound.unwrap_or(0)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }
}
