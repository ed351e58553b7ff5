//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "groundlink", version, about = "Ground-station link session for a picosatellite")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/groundlink.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Transmission path selector for planning commands.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PathArg {
    /// Ground-station relay (small frames)
    Relay,
    /// Network-server push reply (larger frames)
    Push,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the link session (operator commands are read from stdin)
    Run {
        /// Talk to an in-process simulated satellite instead of the relay
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Stop after this many cycles (default: until `q` or Ctrl-C)
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
        /// Beacon interval of the simulated satellite in seconds
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        sim_beacon_s: u64,
    },
    /// Print the verified write batches of the memory setup preset
    PlanSetup {
        /// Size the batches for this path
        #[arg(long, value_enum, default_value = "relay")]
        path: PathArg,
        /// Override the path's packet size (hex chars)
        #[arg(long, value_name = "CHARS")]
        max_hex: Option<usize>,
    },
    /// Encode an upload-plan CSV (label,address,data) into write batches
    Encode {
        /// Upload-plan CSV
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,
        /// Size the batches for this path
        #[arg(long, value_enum, default_value = "relay")]
        path: PathArg,
        /// Override the path's packet size (hex chars)
        #[arg(long, value_name = "CHARS")]
        max_hex: Option<usize>,
        /// Also print the relay MAC frame of each batch
        #[arg(long, action = ArgAction::SetTrue)]
        frames: bool,
    },
    /// Validate the config and exit
    CheckConfig,
}
