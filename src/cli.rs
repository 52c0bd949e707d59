//! CLI argument parsing for callprof

use crate::mode::ProfilingMode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for profiling results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary table (default)
    Text,
    /// JSON object keyed by edge or sample time
    Json,
}

/// Profiling mode to replay the trace under
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Exact per-edge call counts and times
    Hierarchical,
    /// Periodic full-stack samples
    Sampled,
}

impl From<ModeArg> for ProfilingMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Hierarchical => ProfilingMode::Hierarchical,
            ModeArg::Sampled => ProfilingMode::Sampled,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "callprof")]
#[command(version)]
#[command(about = "Replay a recorded call trace through the call profiler", long_about = None)]
pub struct Cli {
    /// Trace file to replay ("-" reads stdin)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Profiling mode
    #[arg(short = 'm', long = "mode", value_enum, default_value = "hierarchical")]
    pub mode: ModeArg,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Profiler configuration file (TOML, or JSON with a .json extension)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Functions to leave out of the profile
    #[arg(long = "ignore", value_name = "NAMES", value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Only profile these functions
    #[arg(long = "only", value_name = "NAMES", value_delimiter = ',')]
    pub only: Vec<String>,

    /// Functions whose argument summary is appended to their name
    #[arg(long = "args", value_name = "NAMES", value_delimiter = ',')]
    pub argument_functions: Vec<String>,

    /// Map a function to a layer (repeatable)
    #[arg(long = "layer", value_name = "SYMBOL=LABEL", value_parser = parse_layer)]
    pub layers: Vec<(String, String)>,

    /// Do not profile builtin calls
    #[arg(long = "no-builtins")]
    pub no_builtins: bool,

    /// Sampling interval in microseconds (sampled mode)
    #[arg(long = "interval-us", value_name = "MICROS")]
    pub interval_us: Option<u64>,

    /// Maximum frames rendered per sample (sampled mode)
    #[arg(long = "max-sample-depth", value_name = "FRAMES")]
    pub max_sample_depth: Option<usize>,

    /// Wall-clock time of trace offset 0, in microseconds since the epoch
    #[arg(long = "base-us", value_name = "MICROS", default_value = "0")]
    pub base_us: u64,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

fn parse_layer(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((symbol, label)) if !symbol.is_empty() && !label.is_empty() => {
            Ok((symbol.to_string(), label.to_string()))
        }
        _ => Err(format!("expected SYMBOL=LABEL, got '{value}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_trace() {
        let cli = Cli::parse_from(["callprof", "trace.txt"]);
        assert_eq!(cli.trace, PathBuf::from("trace.txt"));
        assert_eq!(cli.mode, ModeArg::Hierarchical);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_requires_trace() {
        assert!(Cli::try_parse_from(["callprof"]).is_err());
    }

    #[test]
    fn test_cli_filter_lists_split_on_commas() {
        let cli = Cli::parse_from(["callprof", "--ignore", "a,b", "--ignore", "c", "t"]);
        assert_eq!(cli.ignore, vec!["a", "b", "c"]);
        assert!(cli.only.is_empty());
    }

    #[test]
    fn test_cli_sampled_options() {
        let cli = Cli::parse_from([
            "callprof",
            "--mode",
            "sampled",
            "--interval-us",
            "5000",
            "--max-sample-depth",
            "8",
            "--format",
            "json",
            "t",
        ]);
        assert_eq!(ProfilingMode::from(cli.mode), ProfilingMode::Sampled);
        assert_eq!(cli.interval_us, Some(5000));
        assert_eq!(cli.max_sample_depth, Some(8));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_layers() {
        let cli = Cli::parse_from(["callprof", "--layer", "query=db", "t"]);
        assert_eq!(cli.layers, vec![("query".to_string(), "db".to_string())]);
        assert!(Cli::try_parse_from(["callprof", "--layer", "nolabel", "t"]).is_err());
    }
}
