//! Profiling mode strategies
//!
//! A mode supplies four hooks that the engine drives at fixed points:
//! `init` at session start, `shutdown` at session stop, and `on_begin` /
//! `on_end` around every tracked call. Every hook defaults to a no-op.
//!
//! - `NullMode`: no session running; nothing is measured
//! - `HierarchicalMode`: exact per-edge timing and resource metrics
//! - `SampledMode`: full stack snapshot at a fixed wall-clock cadence

mod hierarchical;
mod sampled;

pub use hierarchical::HierarchicalMode;
pub use sampled::SampledMode;

use crate::config::ProfilerConfig;
use crate::frame::FrameId;
use crate::probe::ResourceProbe;
use crate::stack::CallStack;
use crate::stats::{LayerStore, StatsStore};
use crate::timing::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of session to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilingMode {
    Hierarchical,
    Sampled,
}

impl fmt::Display for ProfilingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfilingMode::Hierarchical => write!(f, "hierarchical"),
            ProfilingMode::Sampled => write!(f, "sampled"),
        }
    }
}

/// What a hook may read and write during a session
pub struct SessionEnv<'a, C: Clock, R: ResourceProbe> {
    pub clock: &'a C,
    pub probe: &'a R,
    pub stats: &'a mut StatsStore,
    /// Calibrated rate of the CPU the session is pinned to
    pub cycles_per_us: f64,
}

/// Hooks a mode provides to the engine
pub trait ModeHooks {
    fn init<C: Clock, R: ResourceProbe>(&mut self, _env: &mut SessionEnv<'_, C, R>) {}

    fn shutdown<C: Clock, R: ResourceProbe>(&mut self, _env: &mut SessionEnv<'_, C, R>) {}

    /// Called after `frame` is linked under the current top, before it
    /// becomes the top
    fn on_begin<C: Clock, R: ResourceProbe>(
        &mut self,
        _stack: &mut CallStack,
        _frame: FrameId,
        _env: &mut SessionEnv<'_, C, R>,
    ) {
    }

    /// Called while `frame` is still the top, before it is popped
    fn on_end<C: Clock, R: ResourceProbe>(
        &mut self,
        _stack: &mut CallStack,
        _frame: FrameId,
        _env: &mut SessionEnv<'_, C, R>,
    ) {
    }
}

/// The mode of an idle engine
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMode;

impl ModeHooks for NullMode {}

/// Mode selected for the current session
#[derive(Debug)]
pub enum ModeStrategy {
    Null(NullMode),
    Hierarchical(HierarchicalMode),
    Sampled(SampledMode),
}

impl Default for ModeStrategy {
    fn default() -> Self {
        ModeStrategy::Null(NullMode)
    }
}

impl ModeStrategy {
    /// Build the strategy for `mode` from the session configuration
    pub fn for_mode(mode: ProfilingMode, config: &ProfilerConfig) -> Self {
        match mode {
            ProfilingMode::Hierarchical => {
                let layers = config.layers.as_ref().map(|table| LayerStore::new(table.clone()));
                ModeStrategy::Hierarchical(HierarchicalMode::new(config.flags, layers))
            }
            ProfilingMode::Sampled => ModeStrategy::Sampled(SampledMode::new(
                config.sampling_interval_us,
                config.max_sample_depth,
            )),
        }
    }

    /// The running mode, `None` when idle
    pub fn mode(&self) -> Option<ProfilingMode> {
        match self {
            ModeStrategy::Null(_) => None,
            ModeStrategy::Hierarchical(_) => Some(ProfilingMode::Hierarchical),
            ModeStrategy::Sampled(_) => Some(ProfilingMode::Sampled),
        }
    }

    pub(crate) fn take_layers(&mut self) -> Option<LayerStore> {
        match self {
            ModeStrategy::Hierarchical(mode) => mode.take_layers(),
            _ => None,
        }
    }
}

impl ModeHooks for ModeStrategy {
    fn init<C: Clock, R: ResourceProbe>(&mut self, env: &mut SessionEnv<'_, C, R>) {
        match self {
            ModeStrategy::Null(mode) => mode.init(env),
            ModeStrategy::Hierarchical(mode) => mode.init(env),
            ModeStrategy::Sampled(mode) => mode.init(env),
        }
    }

    fn shutdown<C: Clock, R: ResourceProbe>(&mut self, env: &mut SessionEnv<'_, C, R>) {
        match self {
            ModeStrategy::Null(mode) => mode.shutdown(env),
            ModeStrategy::Hierarchical(mode) => mode.shutdown(env),
            ModeStrategy::Sampled(mode) => mode.shutdown(env),
        }
    }

    #[inline]
    fn on_begin<C: Clock, R: ResourceProbe>(
        &mut self,
        stack: &mut CallStack,
        frame: FrameId,
        env: &mut SessionEnv<'_, C, R>,
    ) {
        match self {
            ModeStrategy::Null(mode) => mode.on_begin(stack, frame, env),
            ModeStrategy::Hierarchical(mode) => mode.on_begin(stack, frame, env),
            ModeStrategy::Sampled(mode) => mode.on_begin(stack, frame, env),
        }
    }

    #[inline]
    fn on_end<C: Clock, R: ResourceProbe>(
        &mut self,
        stack: &mut CallStack,
        frame: FrameId,
        env: &mut SessionEnv<'_, C, R>,
    ) {
        match self {
            ModeStrategy::Null(mode) => mode.on_end(stack, frame, env),
            ModeStrategy::Hierarchical(mode) => mode.on_end(stack, frame, env),
            ModeStrategy::Sampled(mode) => mode.on_end(stack, frame, env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ManualProbe;
    use crate::symbol::symbol_hash;
    use crate::timing::ManualClock;

    #[test]
    fn test_default_strategy_is_null() {
        let strategy = ModeStrategy::default();
        assert!(matches!(strategy, ModeStrategy::Null(_)));
        assert_eq!(strategy.mode(), None);
    }

    #[test]
    fn test_null_mode_records_nothing() {
        let clock = ManualClock::default();
        let probe = ManualProbe::new();
        let mut stats = StatsStore::new();
        let mut env = SessionEnv {
            clock: &clock,
            probe: &probe,
            stats: &mut stats,
            cycles_per_us: 1.0,
        };
        let mut strategy = ModeStrategy::default();
        let mut stack = CallStack::new();

        strategy.init(&mut env);
        stack.push("A", symbol_hash("A"), |s, id| strategy.on_begin(s, id, &mut env));
        clock.advance(10);
        stack.pop(|s, id| strategy.on_end(s, id, &mut env));
        strategy.shutdown(&mut env);

        assert!(stats.is_empty());
    }

    #[test]
    fn test_for_mode_selects_variant() {
        let config = ProfilerConfig::default();
        let hier = ModeStrategy::for_mode(ProfilingMode::Hierarchical, &config);
        let sampled = ModeStrategy::for_mode(ProfilingMode::Sampled, &config);
        assert_eq!(hier.mode(), Some(ProfilingMode::Hierarchical));
        assert_eq!(sampled.mode(), Some(ProfilingMode::Sampled));
        assert_eq!(ProfilingMode::Sampled.to_string(), "sampled");
    }
}
