//! CPU time and memory readings for hierarchical mode
//!
//! Only read when the session enables `measure_cpu` / `measure_memory`;
//! the default path never touches them.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Source of per-process resource readings
pub trait ResourceProbe {
    /// User + system CPU time consumed so far, in microseconds
    fn cpu_time_us(&self) -> u64;

    /// Current memory usage in bytes
    fn memory_usage(&self) -> i64;

    /// Peak memory usage in bytes
    fn peak_memory_usage(&self) -> i64;
}

/// Readings for the current process from `getrusage` and `/proc`
///
/// `/proc/self/statm` is opened once and re-read with `pread`, so a memory
/// reading costs one syscall.
#[derive(Debug)]
pub struct ProcessProbe {
    #[cfg(unix)]
    statm: Option<std::fs::File>,
    #[cfg(unix)]
    page_size: i64,
}

impl ProcessProbe {
    #[cfg(unix)]
    pub fn new() -> Self {
        // SAFETY: sysconf has no preconditions
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        ProcessProbe {
            statm: std::fs::File::open("/proc/self/statm").ok(),
            page_size: i64::try_from(page_size).unwrap_or(0).max(0),
        }
    }

    #[cfg(not(unix))]
    pub fn new() -> Self {
        ProcessProbe {}
    }

    /// Resident set size from `/proc/self/statm`
    #[cfg(unix)]
    fn resident_bytes(&self) -> Option<i64> {
        use std::os::unix::fs::FileExt;

        let statm = self.statm.as_ref()?;
        if self.page_size == 0 {
            return None;
        }
        let mut buf = [0u8; 128];
        let len = statm.read_at(&mut buf, 0).ok()?;
        let text = std::str::from_utf8(&buf[..len]).ok()?;
        let resident: i64 = text.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident * self.page_size)
    }
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl ResourceProbe for ProcessProbe {
    fn cpu_time_us(&self) -> u64 {
        use nix::sys::resource::{getrusage, UsageWho};

        match getrusage(UsageWho::RUSAGE_SELF) {
            Ok(usage) => timeval_micros(usage.user_time()) + timeval_micros(usage.system_time()),
            Err(_) => 0,
        }
    }

    fn memory_usage(&self) -> i64 {
        self.resident_bytes().unwrap_or_else(|| self.peak_memory_usage())
    }

    fn peak_memory_usage(&self) -> i64 {
        use nix::sys::resource::{getrusage, UsageWho};

        match getrusage(UsageWho::RUSAGE_SELF) {
            // Linux reports ru_maxrss in kilobytes
            Ok(usage) => i64::from(usage.max_rss()) * 1024,
            Err(_) => 0,
        }
    }
}

#[cfg(not(unix))]
impl ResourceProbe for ProcessProbe {
    fn cpu_time_us(&self) -> u64 {
        0
    }

    fn memory_usage(&self) -> i64 {
        0
    }

    fn peak_memory_usage(&self) -> i64 {
        0
    }
}

#[cfg(unix)]
fn timeval_micros(tv: nix::sys::time::TimeVal) -> u64 {
    let micros = tv.tv_sec() as i64 * 1_000_000 + tv.tv_usec() as i64;
    micros.max(0) as u64
}

/// Explicitly driven readings for replay and tests
///
/// Clones share state, like `ManualClock`.
#[derive(Debug, Clone, Default)]
pub struct ManualProbe {
    cpu_us: Arc<AtomicU64>,
    memory: Arc<AtomicI64>,
    peak_memory: Arc<AtomicI64>,
}

impl ManualProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cpu_time(&self, micros: u64) {
        self.cpu_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Set current memory usage, raising the peak if needed
    pub fn set_memory(&self, bytes: i64) {
        self.memory.store(bytes, Ordering::Relaxed);
        self.peak_memory.fetch_max(bytes, Ordering::Relaxed);
    }
}

impl ResourceProbe for ManualProbe {
    fn cpu_time_us(&self) -> u64 {
        self.cpu_us.load(Ordering::Relaxed)
    }

    fn memory_usage(&self) -> i64 {
        self.memory.load(Ordering::Relaxed)
    }

    fn peak_memory_usage(&self) -> i64 {
        self.peak_memory.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_probe_reads_something() {
        let probe = ProcessProbe::new();
        // Burn a little CPU so the reading is non-trivial
        let mut x = 0u64;
        for i in 0..1_000_000u64 {
            x = x.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(x);

        assert!(probe.peak_memory_usage() > 0);
        assert!(probe.memory_usage() > 0);
        let first = probe.cpu_time_us();
        assert!(probe.cpu_time_us() >= first);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_memory_usage_follows_allocation() {
        let probe = ProcessProbe::new();
        let before = probe.memory_usage();
        assert!(before > 0);

        // Touch every page so it becomes resident
        let block = vec![1u8; 64 * 1024 * 1024];
        std::hint::black_box(&block);
        let during = probe.memory_usage();
        assert!(
            during >= before + 32 * 1024 * 1024,
            "resident {during} did not grow from {before}"
        );
        drop(block);
    }

    #[test]
    fn test_manual_probe_tracks_peak() {
        let probe = ManualProbe::new();
        probe.set_memory(4096);
        probe.set_memory(1024);
        assert_eq!(probe.memory_usage(), 1024);
        assert_eq!(probe.peak_memory_usage(), 4096);

        let handle = probe.clone();
        handle.add_cpu_time(30);
        assert_eq!(probe.cpu_time_us(), 30);
    }
}
