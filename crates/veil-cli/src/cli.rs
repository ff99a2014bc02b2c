//! CLI argument definitions for the veil pseudonymizer.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "veil",
    version,
    about = "Deterministic pseudonymization for tabular CSV data",
    long_about = "Replace identifier columns with collision-free numeric surrogates and\n\
                  shift datetime columns by a consistent per-entity offset.\n\
                  Maps persist between runs, so repeated runs stay consistent and\n\
                  `reidentify` can restore the originals."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow raw identifier and cell values in trace logs.
    ///
    /// Off by default: logged values are replaced with [REDACTED] so log
    /// files never leak the data the tool exists to protect.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pseudonymize the declared files into an output directory.
    Run(RunArgs),

    /// Reverse a previous run using its persisted maps.
    Reidentify(ReidentifyArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Path to the YAML run configuration.
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Directory containing the declared input CSV files (default: the
    /// config file's directory).
    #[arg(long = "input-dir", value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Output directory for veiled files (default: <INPUT_DIR>/veiled).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory for persisted identifier and offset maps
    /// (default: <OUTPUT_DIR>/maps).
    #[arg(long = "map-dir", value_name = "DIR")]
    pub map_dir: Option<PathBuf>,

    /// Treat persisted maps as read-only.
    ///
    /// Identifiers without an existing surrogate become null in the output
    /// instead of allocating a new one.
    #[arg(long = "frozen")]
    pub frozen: bool,
}

#[derive(Parser)]
pub struct ReidentifyArgs {
    /// Path to the YAML run configuration.
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Directory containing previously veiled CSV files (default: the
    /// config file's directory).
    #[arg(long = "input-dir", value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Output directory for restored files (default: <INPUT_DIR>/unveiled).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory holding the maps persisted by the forward run.
    #[arg(long = "map-dir", value_name = "DIR")]
    pub map_dir: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
