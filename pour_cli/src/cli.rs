//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "pour", version, about = "Cocktail machine pour controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/pour_config.toml")]
    pub config: PathBuf,

    /// Optional ingredient→pump CSV (strict header), replaces [pumps]
    #[arg(long = "pumps-csv", value_name = "FILE")]
    pub pumps_csv: Option<PathBuf>,

    /// Emit JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pour a recipe and follow it to the end
    Serve {
        /// Recipe id from the config
        recipe: String,
        /// Confirm the post-add ingredient without prompting
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
        /// Give up waiting after this many seconds (pumps are switched off)
        #[arg(long, value_name = "SECS", default_value_t = 300)]
        timeout_secs: u64,
    },
    /// Switch every pump off
    Stop,
    /// Zero the scale
    Tare,
    /// Print one weight reading
    Weight,
    /// Print device status
    Status,
    /// Run one pump for a fixed time
    Pump {
        /// Pump slot (1..=8)
        pump: u8,
        /// Run time in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        ms: u64,
    },
    /// Switch one pump on until Ctrl-C (or --secs), then off
    StartPump {
        /// Pump slot (1..=8)
        pump: u8,
        /// Stop automatically after this many seconds
        #[arg(long, value_name = "SECS")]
        secs: Option<u64>,
    },
    /// Switch one pump off
    StopPump {
        /// Pump slot (1..=8)
        pump: u8,
    },
    /// Stream weight and status telemetry
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long, value_name = "SECS")]
        secs: Option<u64>,
    },
    /// List recipes and whether they can be poured now
    Recipes,
    /// Quick health check (devices answer, relay is off)
    SelfCheck,
}
