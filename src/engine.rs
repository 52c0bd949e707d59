//! The profiling engine
//!
//! A `Profiler` is an explicit engine instance: it owns the timer, the call
//! stack, the filters and the stats store for one logical call stack. Hosts
//! profiling several threads keep one instance per thread.
//!
//! Host integration goes through `intercept`, which resolves the symbol of
//! the call about to run, brackets the host's dispatch with `begin_call` /
//! `end_call`, and passes the engine back into the dispatch so nested calls
//! can be intercepted too.

use crate::config::{ProfilerConfig, ProfilerFlags};
use crate::error::{ErrorRecord, ProfilerError, Result, Severity, ThrownException};
use crate::filter::{ArgumentFilter, CallFilter};
use crate::frame::FrameArena;
use crate::mode::{ModeHooks, ModeStrategy, ProfilingMode, SessionEnv};
use crate::probe::{ProcessProbe, ResourceProbe};
use crate::stack::CallStack;
use crate::stats::{StatsSnapshot, StatsStore};
use crate::symbol::{symbol_hash, ROOT_SYMBOL};
use crate::timing::{Clock, Timer, TscClock};
use tracing::debug;

/// Kind of call being intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Code defined by the host program
    User,
    /// Native function provided by the host runtime
    Builtin,
}

/// Host collaborator that names the call about to execute
pub trait SymbolSource {
    /// Qualified name of the pending call, or `None` to run it untracked
    fn resolve_current_symbol(&mut self) -> Option<String>;

    /// Short description of the pending call's arguments, appended to the
    /// symbol for functions in the argument-capture list
    fn argument_summary(&mut self, _symbol: &str) -> Option<String> {
        None
    }
}

/// Call profiler for one logical call stack
#[derive(Debug)]
pub struct Profiler<C: Clock = TscClock, R: ResourceProbe = ProcessProbe> {
    timer: Timer<C>,
    probe: R,
    enabled: bool,
    ever_enabled: bool,
    stack: CallStack,
    stats: StatsStore,
    mode: ModeStrategy,
    call_filter: CallFilter,
    argument_filter: ArgumentFilter,
    flags: ProfilerFlags,
    cycles_per_us: f64,
    last_error: Option<ErrorRecord>,
    last_exception: Option<ThrownException>,
}

impl Profiler {
    /// Profiler on the hardware cycle counter, reading this process's
    /// resource usage.
    ///
    /// Fails if the CPU affinity mask cannot be read.
    pub fn new() -> Result<Self> {
        Self::with_clock(TscClock::new(), ProcessProbe::new())
    }
}

impl<C: Clock, R: ResourceProbe> Profiler<C, R> {
    pub fn with_clock(clock: C, probe: R) -> Result<Self> {
        Ok(Profiler {
            timer: Timer::new(clock)?,
            probe,
            enabled: false,
            ever_enabled: false,
            stack: CallStack::new(),
            stats: StatsStore::new(),
            mode: ModeStrategy::default(),
            call_filter: CallFilter::all(),
            argument_filter: ArgumentFilter::none(),
            flags: ProfilerFlags::default(),
            cycles_per_us: 1.0,
            last_error: None,
            last_exception: None,
        })
    }

    /// Start a session and begin the root call.
    ///
    /// Returns `AlreadyStarted` without touching the running session if one
    /// is active. Calibration and affinity failures leave no session
    /// running.
    pub fn start(&mut self, mode: ProfilingMode, config: &ProfilerConfig) -> Result<()> {
        if self.enabled {
            return Err(ProfilerError::AlreadyStarted);
        }
        config.validate()?;

        self.cycles_per_us = self.timer.begin_session()?;

        self.last_error = None;
        self.last_exception = None;
        self.flags = config.flags;
        self.stats = StatsStore::new();
        self.call_filter = match config.call_filter() {
            Some((filter_mode, names)) => CallFilter::new(filter_mode, names),
            None => CallFilter::all(),
        };
        self.argument_filter = match &config.argument_functions {
            Some(names) => ArgumentFilter::new(names),
            None => ArgumentFilter::none(),
        };
        self.mode = ModeStrategy::for_mode(mode, config);

        let mut env = SessionEnv {
            clock: self.timer.clock(),
            probe: &self.probe,
            stats: &mut self.stats,
            cycles_per_us: self.cycles_per_us,
        };
        self.mode.init(&mut env);

        self.enabled = true;
        self.ever_enabled = true;
        debug!(
            %mode,
            cpu = ?self.timer.current_cpu(),
            cycles_per_us = self.cycles_per_us,
            "profiling session started"
        );

        self.begin_call(ROOT_SYMBOL);
        Ok(())
    }

    /// End every open call, stop the session and hand back its results.
    ///
    /// Returns `None` when no session is running.
    pub fn stop(&mut self) -> Option<StatsSnapshot> {
        if !self.enabled {
            return None;
        }

        while !self.stack.is_empty() {
            self.end_call(true);
        }

        let mut env = SessionEnv {
            clock: self.timer.clock(),
            probe: &self.probe,
            stats: &mut self.stats,
            cycles_per_us: self.cycles_per_us,
        };
        self.mode.shutdown(&mut env);

        let mut mode = std::mem::take(&mut self.mode);
        let stats = std::mem::take(&mut self.stats);
        let snapshot = match mode.mode() {
            Some(ProfilingMode::Sampled) => stats.into_sampled(),
            _ => stats.into_hierarchical(mode.take_layers()),
        };

        self.enabled = false;
        self.call_filter = CallFilter::all();
        self.argument_filter = ArgumentFilter::none();
        self.timer.end_session();
        debug!(
            frames = self.stack.arena().allocated(),
            "profiling session stopped"
        );
        Some(snapshot)
    }

    /// Enter a call. Returns whether it is tracked; pass that to the
    /// matching `end_call`.
    #[inline]
    pub fn begin_call(&mut self, symbol: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let hash = symbol_hash(symbol);
        if !self.call_filter.tracks(hash, symbol) {
            return false;
        }

        let mut env = SessionEnv {
            clock: self.timer.clock(),
            probe: &self.probe,
            stats: &mut self.stats,
            cycles_per_us: self.cycles_per_us,
        };
        let mode = &mut self.mode;
        self.stack
            .push(symbol, hash, |stack, frame| mode.on_begin(stack, frame, &mut env));
        true
    }

    /// Leave the call entered by the matching `begin_call`.
    ///
    /// Untracked calls and an empty stack are no-ops.
    #[inline]
    pub fn end_call(&mut self, tracked: bool) {
        if !tracked || !self.enabled {
            return;
        }

        let mut env = SessionEnv {
            clock: self.timer.clock(),
            probe: &self.probe,
            stats: &mut self.stats,
            cycles_per_us: self.cycles_per_us,
        };
        let mode = &mut self.mode;
        self.stack
            .pop(|stack, frame| mode.on_end(stack, frame, &mut env));
    }

    /// Run a host call under the profiler.
    ///
    /// `invoke` performs the actual dispatch and gets the profiler back so
    /// nested calls can be intercepted. Builtins are passed straight through
    /// when the session excludes them, as is any call the source cannot
    /// name.
    pub fn intercept<S, T, F>(&mut self, source: &mut S, kind: CallKind, invoke: F) -> T
    where
        S: SymbolSource + ?Sized,
        F: FnOnce(&mut Self) -> T,
    {
        if !self.enabled || (kind == CallKind::Builtin && !self.flags.include_builtins) {
            return invoke(self);
        }
        let Some(mut symbol) = source.resolve_current_symbol() else {
            return invoke(self);
        };

        if self.argument_filter.should_capture(&symbol) {
            if let Some(summary) = source.argument_summary(&symbol) {
                symbol.push('#');
                symbol.push_str(&summary);
            }
        }

        let tracked = self.begin_call(&symbol);
        let result = invoke(&mut *self);
        self.end_call(tracked);
        result
    }

    /// Report an error raised by the host. Only fatal severities are kept.
    pub fn record_error(
        &mut self,
        severity: Severity,
        file: &str,
        line: u32,
        message: &str,
        trace: &str,
    ) {
        if !severity.is_fatal() {
            return;
        }
        self.last_error = Some(ErrorRecord::fatal(
            severity,
            file,
            line,
            message,
            trace,
            self.last_exception.as_ref(),
        ));
    }

    /// Report an exception thrown by the host
    pub fn record_exception(&mut self, class: &str, message: &str) {
        self.last_exception = Some(ThrownException {
            class: class.to_string(),
            message: message.to_string(),
        });
    }

    /// Most recent fatal error of the running session
    pub fn current_last_error(&self) -> Option<&ErrorRecord> {
        if self.enabled {
            self.last_error.as_ref()
        } else {
            None
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether any session has ever been started on this instance
    pub fn ever_enabled(&self) -> bool {
        self.ever_enabled
    }

    /// Mode of the running session
    pub fn mode(&self) -> Option<ProfilingMode> {
        self.mode.mode()
    }

    /// Number of calls currently on the tracked stack
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Frame arena backing the call stack
    pub fn frames(&self) -> &FrameArena {
        self.stack.arena()
    }

    /// Calibrated cycles-per-microsecond rate per CPU id, empty until the
    /// first session on a calibrated clock
    pub fn cpu_frequencies(&self) -> Vec<(usize, f64)> {
        self.timer
            .frequencies()
            .map(|table| table.iter().collect())
            .unwrap_or_default()
    }

    /// CPU the running session is pinned to
    pub fn current_cpu(&self) -> Option<usize> {
        self.timer.current_cpu()
    }

    /// Tear down: stop any session, forget calibration, restore affinity
    /// and release frame memory
    pub fn shutdown(&mut self) {
        if self.enabled {
            let _ = self.stop();
        }
        self.timer.clear_frequencies();
        let freed = self.stack.drain();
        debug!(freed, "profiler shut down");
    }
}

impl<C: Clock, R: ResourceProbe> Drop for Profiler<C, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
