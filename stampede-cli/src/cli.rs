//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand};
use stampede_config::{LogLevel, SinkConfig, StageConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "HTTP load testing with virtual users", long_about = None)]
pub struct Cli {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a load test
    Run(RunArgs),

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to the run configuration (YAML, or JSON by extension)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Constant number of virtual users for the shared pool (with --duration)
    #[arg(long, value_name = "N", requires = "duration", conflicts_with = "stages")]
    pub vus: Option<u32>,

    /// How long to hold --vus virtual users (e.g. 30s, 5m)
    #[arg(long, value_name = "DURATION", requires = "vus", value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Replace the shared ramp profile; repeatable (e.g. 30s:20, 1m:20:hold)
    #[arg(long = "stage", value_name = "DURATION:TARGET[:hold]")]
    pub stages: Vec<StageConfig>,

    /// Report sink replacing the configured ones; repeatable
    /// (stdout, summary, json, yaml, json=PATH, yaml=PATH)
    #[arg(long = "out", value_name = "SINK")]
    pub out: Vec<SinkConfig>,

    /// Override the base URL of the system under test
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Seed scenario selection and think times for a reproducible run
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(value_name = "CONFIG")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}
