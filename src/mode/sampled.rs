//! Periodic stack sampling
//!
//! Deadlines are kept twice: in cycles for the cheap per-call check, and as
//! an integer wall-clock timestamp for the sample key. The first deadline is
//! aligned to an interval boundary, so samples from different sessions land
//! on comparable timestamps. A call that spans several intervals produces
//! one sample per interval when the next hook fires.

use super::{ModeHooks, SessionEnv};
use crate::config::DEFAULT_SAMPLING_INTERVAL_US;
use crate::frame::FrameId;
use crate::probe::ResourceProbe;
use crate::stack::CallStack;
use crate::timing::{cycles_from_micros, Clock, WallTime};

/// Sampled mode state
#[derive(Debug)]
pub struct SampledMode {
    interval_us: u64,
    interval_cycles: u64,
    last_sample_cycles: u64,
    last_sample_time: WallTime,
    max_depth: usize,
}

impl Default for SampledMode {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLING_INTERVAL_US, None)
    }
}

impl SampledMode {
    /// `max_depth` caps the frames rendered per sample; `None` renders the
    /// whole stack
    pub fn new(interval_us: u64, max_depth: Option<usize>) -> Self {
        SampledMode {
            interval_us: interval_us.max(1),
            interval_cycles: 0,
            last_sample_cycles: 0,
            last_sample_time: WallTime::default(),
            max_depth: max_depth.unwrap_or(usize::MAX),
        }
    }

    pub fn interval_us(&self) -> u64 {
        self.interval_us
    }

    /// Wall-clock time of the most recent sample deadline
    pub fn last_sample_time(&self) -> WallTime {
        self.last_sample_time
    }

    /// Take every sample that has come due since the last check
    fn check<C: Clock, R: ResourceProbe>(&mut self, stack: &CallStack, env: &mut SessionEnv<'_, C, R>) {
        let Some(top) = stack.top() else {
            return;
        };

        while env.clock.cycles().saturating_sub(self.last_sample_cycles) > self.interval_cycles {
            self.last_sample_cycles += self.interval_cycles;
            // The key must carry the advanced deadline
            self.last_sample_time = self.last_sample_time.advance(self.interval_us);

            let mut rendered = String::new();
            stack.stack_to_string(top, self.max_depth, None, &mut rendered);
            env.stats.record_sample(self.last_sample_time, rendered);
        }
    }
}

impl ModeHooks for SampledMode {
    fn init<C: Clock, R: ResourceProbe>(&mut self, env: &mut SessionEnv<'_, C, R>) {
        let now_cycles = env.clock.cycles();
        let now = env.clock.wall_time();

        // Pretend the last sample happened at the start of the current
        // interval, and move the cycle mark back by the same amount
        self.last_sample_time = now.truncate(self.interval_us);
        let truncated_us = now.micros_since(self.last_sample_time);
        let truncated_cycles = cycles_from_micros(truncated_us, env.cycles_per_us);
        self.last_sample_cycles = now_cycles.saturating_sub(truncated_cycles);

        self.interval_cycles = cycles_from_micros(self.interval_us, env.cycles_per_us).max(1);
    }

    #[inline]
    fn on_begin<C: Clock, R: ResourceProbe>(
        &mut self,
        stack: &mut CallStack,
        _frame: FrameId,
        env: &mut SessionEnv<'_, C, R>,
    ) {
        self.check(stack, env);
    }

    #[inline]
    fn on_end<C: Clock, R: ResourceProbe>(
        &mut self,
        stack: &mut CallStack,
        _frame: FrameId,
        env: &mut SessionEnv<'_, C, R>,
    ) {
        self.check(stack, env);
    }
}
