use anyhow::{Context, Result};
use callprof::cli::{Cli, OutputFormat};
use callprof::config::ProfilerConfig;
use callprof::replay;
use callprof::timing::WallTime;
use clap::Parser;
use std::io::{self, Read};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Merge command-line options over the configuration file, if any
fn build_config(args: &Cli) -> Result<ProfilerConfig> {
    let mut config = match &args.config {
        Some(path) => ProfilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ProfilerConfig::default(),
    };

    if !args.ignore.is_empty() && !args.only.is_empty() {
        anyhow::bail!("Cannot specify both --ignore and --only. Choose one.");
    }
    if !args.ignore.is_empty() {
        config = config.with_ignored_functions(args.ignore.iter().cloned());
    }
    if !args.only.is_empty() {
        config = config.with_functions(args.only.iter().cloned());
    }
    if !args.argument_functions.is_empty() {
        config = config.with_argument_functions(args.argument_functions.iter().cloned());
    }
    if !args.layers.is_empty() {
        config = config.with_layers(args.layers.iter().cloned());
    }
    if args.no_builtins {
        config.flags.include_builtins = false;
    }
    if let Some(interval_us) = args.interval_us {
        config = config.with_sampling_interval_us(interval_us);
    }
    if let Some(depth) = args.max_sample_depth {
        config = config.with_max_sample_depth(depth);
    }

    config.validate()?;
    Ok(config)
}

fn read_trace(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read trace from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace {}", path.display()))
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = build_config(&args)?;
    let text = read_trace(&args.trace)?;

    let snapshot = replay::replay_trace(
        &text,
        args.mode.into(),
        &config,
        WallTime::from_micros(args.base_us),
    )
    .with_context(|| format!("Failed to replay {}", args.trace.display()))?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot.to_json())?);
        }
        OutputFormat::Text => {
            snapshot.write_summary(&mut io::stdout().lock())?;
        }
    }

    Ok(())
}
