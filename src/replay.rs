//! Replay of recorded call traces
//!
//! A trace is a text file of call events with microsecond offsets:
//!
//! ```text
//! # comment
//! 0      enter   handle_request
//! 120    builtin strlen
//! 125    exit
//! 480    enter   query SELECT * FROM users
//! 900    exit
//! 1000   exit
//! ```
//!
//! `enter` and `builtin` open a user or builtin call; anything after the
//! symbol is the call's argument summary. `exit` closes the innermost open
//! call. Events drive a `Profiler` on a `ManualClock` through the same
//! `intercept` path a host runtime would use.

use crate::config::ProfilerConfig;
use crate::engine::{CallKind, Profiler, SymbolSource};
use crate::error::{ProfilerError, Result};
use crate::mode::ProfilingMode;
use crate::probe::ManualProbe;
use crate::stats::{StatsSnapshot, StatsStore};
use crate::timing::{ManualClock, WallTime};
use tracing::debug;

/// One parsed trace line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Enter {
        line: usize,
        at_us: u64,
        kind: CallKind,
        symbol: String,
        args: Option<String>,
    },
    Exit {
        line: usize,
        at_us: u64,
    },
}

impl TraceEvent {
    pub fn at_us(&self) -> u64 {
        match self {
            TraceEvent::Enter { at_us, .. } | TraceEvent::Exit { at_us, .. } => *at_us,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            TraceEvent::Enter { line, .. } | TraceEvent::Exit { line, .. } => *line,
        }
    }
}

fn trace_error(line: usize, message: impl Into<String>) -> ProfilerError {
    ProfilerError::Trace {
        line,
        message: message.into(),
    }
}

/// Parse trace text into events. Blank lines and `#` comments are skipped.
pub fn parse_trace(text: &str) -> Result<Vec<TraceEvent>> {
    let mut events = Vec::new();
    let mut last_us = 0u64;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.trim();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }

        let (at, rest) = split_word(content);
        let at_us: u64 = at
            .parse()
            .map_err(|_| trace_error(line, format!("invalid timestamp '{at}'")))?;
        if at_us < last_us {
            return Err(trace_error(
                line,
                format!("timestamp {at_us} goes backwards (previous {last_us})"),
            ));
        }
        last_us = at_us;

        let (verb, rest) = split_word(rest);
        let event = match verb {
            "exit" => TraceEvent::Exit { line, at_us },
            "enter" | "builtin" => {
                let (symbol, args) = split_word(rest);
                if symbol.is_empty() {
                    return Err(trace_error(line, format!("'{verb}' needs a symbol")));
                }
                let kind = if verb == "builtin" {
                    CallKind::Builtin
                } else {
                    CallKind::User
                };
                TraceEvent::Enter {
                    line,
                    at_us,
                    kind,
                    symbol: symbol.to_string(),
                    args: (!args.is_empty()).then(|| args.to_string()),
                }
            }
            "" => return Err(trace_error(line, "missing event")),
            other => return Err(trace_error(line, format!("unknown event '{other}'"))),
        };
        events.push(event);
    }

    Ok(events)
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim()),
        None => (text, ""),
    }
}

/// The call described by the current `enter` event
struct PendingCall {
    symbol: Option<String>,
    args: Option<String>,
}

impl SymbolSource for PendingCall {
    fn resolve_current_symbol(&mut self) -> Option<String> {
        self.symbol.take()
    }

    fn argument_summary(&mut self, _symbol: &str) -> Option<String> {
        self.args.take()
    }
}

/// Drive `profiler` through `events`, moving `clock` to each timestamp
///
/// The profiler must already be started on `clock`.
pub fn replay_events(
    profiler: &mut Profiler<ManualClock, ManualProbe>,
    clock: &ManualClock,
    events: &[TraceEvent],
) -> Result<()> {
    let mut cursor = events.iter();
    if let Some(line) = replay_calls(profiler, clock, &mut cursor)? {
        return Err(trace_error(line, "exit without a matching enter"));
    }
    Ok(())
}

/// Replay events until the exit closing the current level. Returns the
/// line of that exit, or `None` at end of input.
fn replay_calls<'a, I>(
    profiler: &mut Profiler<ManualClock, ManualProbe>,
    clock: &ManualClock,
    events: &mut I,
) -> Result<Option<usize>>
where
    I: Iterator<Item = &'a TraceEvent>,
{
    loop {
        let Some(event) = events.next() else {
            return Ok(None);
        };
        clock.set_elapsed(event.at_us());

        match event {
            TraceEvent::Exit { line, .. } => return Ok(Some(*line)),
            TraceEvent::Enter {
                kind, symbol, args, ..
            } => {
                let mut call = PendingCall {
                    symbol: Some(symbol.clone()),
                    args: args.clone(),
                };
                let closed =
                    profiler.intercept(&mut call, *kind, |p| replay_calls(p, clock, events))?;
                if closed.is_none() {
                    return Ok(None);
                }
            }
        }
    }
}

/// Replay a whole trace in a fresh session and return its results
pub fn replay_trace(
    text: &str,
    mode: ProfilingMode,
    config: &ProfilerConfig,
    base: WallTime,
) -> Result<StatsSnapshot> {
    let events = parse_trace(text)?;
    debug!(events = events.len(), %mode, "replaying trace");

    let clock = ManualClock::new(base);
    let mut profiler = Profiler::with_clock(clock.clone(), ManualProbe::new())?;
    profiler.start(mode, config)?;
    replay_events(&mut profiler, &clock, &events)?;

    Ok(profiler
        .stop()
        .unwrap_or_else(|| StatsStore::new().into_hierarchical(None)))
}
