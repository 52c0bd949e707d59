//! Error types for the profiling engine
//!
//! `ProfilerError` covers every recoverable failure surfaced by the library.
//! Frame allocation failure is not represented here: running out of memory
//! while pushing a frame aborts the process like any other Rust allocation.
//!
//! `ErrorRecord` is the diagnostic captured for the most recent fatal error
//! reported by the host's error hook.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the profiling engine
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Profiler session already started")]
    AlreadyStarted,

    #[error("CPU affinity {op} failed: {source}")]
    Affinity {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("CPU frequency calibration failed: {0}")]
    Calibration(String),

    #[error("No calibrated frequency for CPU {0}")]
    NoCalibratedCpu(usize),

    #[error("Invalid profiler configuration: {0}")]
    Config(String),

    #[error("Failed to parse profiler configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid trace at line {line}: {message}")]
    Trace { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for profiler operations
pub type Result<T> = std::result::Result<T, ProfilerError>;

/// Severity of an error reported by the host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    CoreError,
    UserError,
    Warning,
    Notice,
}

impl Severity {
    /// Only fatal severities are captured as the last error
    pub fn is_fatal(self) -> bool {
        matches!(self, Severity::Error | Severity::CoreError | Severity::UserError)
    }
}

/// The error class reported for a fatal error
///
/// Usually the host severity, but an uncaught exception reports the class
/// name of the exception that was thrown instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorKind {
    Severity(Severity),
    Exception(String),
}

/// Last fatal error captured during a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub trace: String,
}

/// Most recently thrown exception, kept so that an "Uncaught exception"
/// fatal error can report where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ThrownException {
    pub class: String,
    pub message: String,
}

const UNCAUGHT_PREFIX: &str = "Uncaught exception";

impl ErrorRecord {
    /// Build the record for a fatal error, folding in the last thrown
    /// exception when the message says it was never caught
    pub(crate) fn fatal(
        severity: Severity,
        file: &str,
        line: u32,
        message: &str,
        trace: &str,
        exception: Option<&ThrownException>,
    ) -> Self {
        match exception {
            Some(exc) if severity == Severity::Error && message.starts_with(UNCAUGHT_PREFIX) => {
                ErrorRecord {
                    kind: ErrorKind::Exception(exc.class.clone()),
                    message: exc.message.clone(),
                    file: file.to_string(),
                    line,
                    trace: message.to_string(),
                }
            }
            _ => ErrorRecord {
                kind: ErrorKind::Severity(severity),
                message: message.to_string(),
                file: file.to_string(),
                line,
                trace: trace.to_string(),
            },
        }
    }
}
