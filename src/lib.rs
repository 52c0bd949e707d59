//! callprof - In-process call profiling engine
//!
//! Hosts report function entry and exit; the engine keeps the live call
//! stack with recursion accounting and produces either exact per-edge
//! statistics (hierarchical mode) or periodic full-stack snapshots
//! (sampled mode), timed with a calibrated cycle counter.
//!
//! ```no_run
//! use callprof::{Profiler, ProfilerConfig, ProfilingMode};
//!
//! let mut profiler = Profiler::new()?;
//! profiler.start(ProfilingMode::Hierarchical, &ProfilerConfig::default())?;
//! let tracked = profiler.begin_call("load_config");
//! // ... the call runs ...
//! profiler.end_call(tracked);
//! if let Some(snapshot) = profiler.stop() {
//!     snapshot.print_summary();
//! }
//! # Ok::<(), callprof::ProfilerError>(())
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod frame;
pub mod mode;
pub mod probe;
pub mod replay;
pub mod stack;
pub mod stats;
pub mod symbol;
pub mod timing;

pub use config::{FilterMode, ProfilerConfig, ProfilerFlags};
pub use engine::{CallKind, Profiler, SymbolSource};
pub use error::{ErrorKind, ErrorRecord, ProfilerError, Result, Severity};
pub use mode::ProfilingMode;
pub use stats::{Metrics, StatsSnapshot};
