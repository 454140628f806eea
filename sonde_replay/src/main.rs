//! sonde-replay - infer calling conventions from a recorded event stream
//!
//! Usage:
//!   sonde_replay trace.jsonl                  Text report on stdout
//!   sonde_replay trace.bin --input-format bincode -o report.txt
//!   sonde_replay --format json < trace.jsonl

mod event;

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sonde_infer::{report, Session};
use sonde_types::Config;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::event::{read_bincode, read_json, Stats};

#[derive(Parser)]
#[command(name = "sonde_replay")]
#[command(about = "Infer register arguments and return values from a call trace", long_about = None)]
struct Cli {
    /// Event stream to replay, stdin when omitted
    input: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "json")]
    input_format: InputFormat,

    #[arg(long, value_enum, default_value = "text")]
    format: ReportFormat,

    /// JSON file with inference settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    min_calls: Option<u64>,

    #[arg(long)]
    slot_threshold: Option<f64>,

    #[arg(long)]
    return_threshold: Option<f64>,

    #[arg(long)]
    max_functions: Option<usize>,

    #[arg(long)]
    max_depth: Option<usize>,

    #[arg(long)]
    warmup_calls: Option<u64>,

    /// More logging on stderr, repeatable
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    Json,
    Bincode,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    debug!(?config, "effective configuration");

    let input: Box<dyn Read> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let events = match cli.input_format {
        InputFormat::Json => read_json(input),
        InputFormat::Bincode => read_bincode(input),
    };

    // an unwritable destination fails before any replay work
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let mut session = Session::new(config).context("Invalid configuration")?;
    let mut stats = Stats::default();
    for event in events {
        event?
            .apply(&mut session, &mut stats)
            .context("Failed to apply event")?;
    }

    let verdicts = session.classify();
    info!(
        routines = stats.routines,
        calls = stats.calls,
        returns = stats.returns,
        accesses = stats.accesses,
        functions = session.table().len(),
        reported = verdicts.len(),
        "replay finished"
    );
    if session.table().is_saturated() {
        warn!(
            max_functions = session.config().max_functions,
            "function table filled up, later functions were not tracked"
        );
    }

    let written = match cli.format {
        ReportFormat::Text => report::write_text(&mut out, &verdicts),
        ReportFormat::Json => report::write_json(&mut out, &verdicts),
    };
    written.context("Failed to write report")?;

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Defaults, then the config file, then `SONDE_*` variables, then flags.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(v) = cli.min_calls {
        config.min_calls = v;
    }
    if let Some(v) = cli.slot_threshold {
        config.slot_threshold = v;
    }
    if let Some(v) = cli.return_threshold {
        config.return_threshold = v;
    }
    if let Some(v) = cli.max_functions {
        config.max_functions = v;
    }
    if let Some(v) = cli.max_depth {
        config.max_depth = v;
    }
    if let Some(v) = cli.warmup_calls {
        config.warmup_calls = v;
    }

    config.validate()?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}
