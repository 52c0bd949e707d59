//! Exact per-edge accounting
//!
//! Each tracked call contributes one call and its wall time to the
//! `caller==>callee` edge key, plus CPU time and memory deltas when the
//! session flags ask for them. With a layer table configured, the callee's
//! entry name is also looked up and counted against its layer.

use super::{ModeHooks, SessionEnv};
use crate::config::ProfilerFlags;
use crate::frame::FrameId;
use crate::probe::ResourceProbe;
use crate::stack::CallStack;
use crate::stats::{LayerStore, Metric};
use crate::symbol::push_entry_name;
use crate::timing::{micros_from_cycles, Clock};

/// Hierarchical mode state
#[derive(Debug, Default)]
pub struct HierarchicalMode {
    flags: ProfilerFlags,
    layers: Option<LayerStore>,
    // Scratch buffers reused across calls
    key: String,
    entry: String,
}

impl HierarchicalMode {
    pub fn new(flags: ProfilerFlags, layers: Option<LayerStore>) -> Self {
        HierarchicalMode {
            flags,
            layers,
            key: String::with_capacity(128),
            entry: String::with_capacity(64),
        }
    }

    pub fn flags(&self) -> ProfilerFlags {
        self.flags
    }

    pub(crate) fn take_layers(&mut self) -> Option<LayerStore> {
        self.layers.take()
    }
}

impl ModeHooks for HierarchicalMode {
    #[inline]
    fn on_begin<C: Clock, R: ResourceProbe>(
        &mut self,
        stack: &mut CallStack,
        frame: FrameId,
        env: &mut SessionEnv<'_, C, R>,
    ) {
        let frame = stack.frame_mut(frame);
        frame.cycles_start = env.clock.cycles();

        if self.flags.measure_cpu {
            frame.cpu_start_us = env.probe.cpu_time_us();
        }
        if self.flags.measure_memory {
            frame.memory_start = env.probe.memory_usage();
            frame.peak_memory_start = env.probe.peak_memory_usage();
        }
    }

    #[inline]
    fn on_end<C: Clock, R: ResourceProbe>(
        &mut self,
        stack: &mut CallStack,
        frame: FrameId,
        env: &mut SessionEnv<'_, C, R>,
    ) {
        let cycles_end = env.clock.cycles();
        let record = stack.frame(frame);
        let wall_us =
            micros_from_cycles(cycles_end.saturating_sub(record.cycles_start), env.cycles_per_us)
                as u64;

        self.key.clear();
        stack.stack_to_string(frame, 2, None, &mut self.key);

        let metrics = env.stats.get_or_create_bucket(&self.key);
        metrics.record_call(wall_us);

        if self.flags.measure_cpu {
            let cpu_us = env.probe.cpu_time_us().saturating_sub(record.cpu_start_us);
            metrics.add(Metric::CpuTime, cpu_us as i64);
        }
        if self.flags.measure_memory {
            metrics.add(Metric::Memory, env.probe.memory_usage() - record.memory_start);
            metrics.add(
                Metric::PeakMemory,
                env.probe.peak_memory_usage() - record.peak_memory_start,
            );
        }

        if let Some(layers) = self.layers.as_mut() {
            self.entry.clear();
            push_entry_name(&mut self.entry, &record.name, record.recursion_level);
            layers.record(&self.entry, wall_us);
        }
    }
}
