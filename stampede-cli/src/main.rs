mod cli;
mod flow;
mod run;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConfigCommands, RunArgs};
use colored::*;
use stampede_config::{ConfigLoader, LoggingConfig, StampedeConfig};
use stampede_engine::RunControl;
use stampede_output::ReportWriter;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tokio::signal;
use tracing::{error, info, warn};

/// The run finished and every threshold held
const EXIT_PASSED: u8 = 0;
/// Configuration, setup or other fatal error before a result existed
const EXIT_FATAL: u8 = 2;

fn print_fatal(error: &anyhow::Error) {
    eprintln!("{} {:#}", "✗".bright_red().bold(), error);
}

fn init_logging(config: &LoggingConfig, cli_level: Option<stampede_config::LogLevel>) -> Result<()> {
    let mut config = config.clone();
    if let Some(level) = cli_level {
        config.level = level;
    }
    stampede_logging::init_logging(&config).context("Failed to initialize logging")
}

/// First Ctrl-C drains the run, the second kills every virtual user
fn install_signal_handler(control: RunControl) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping gracefully (press Ctrl-C again to abort)");
        eprintln!("{} stopping, press Ctrl-C again to abort", "⚠".bright_yellow().bold());
        control.stop();

        if signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt received, aborting");
            control.abort();
        }
    });
}

async fn handle_run(args: &RunArgs, log_level: Option<stampede_config::LogLevel>) -> ExitCode {
    let config = match run::load_run_config(args) {
        Ok(config) => config,
        Err(e) => {
            print_fatal(&e);
            return ExitCode::from(EXIT_FATAL);
        }
    };
    if let Err(e) = init_logging(&config.logging, log_level) {
        print_fatal(&e);
        return ExitCode::from(EXIT_FATAL);
    }

    let writer = match ReportWriter::from_config(&config.output) {
        Ok(writer) => writer,
        Err(e) => {
            print_fatal(&e.into());
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let control = RunControl::new();
    let orchestrator = match run::build_orchestrator(&config, control.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Failed to prepare run: {:#}", e);
            print_fatal(&e);
            return ExitCode::from(EXIT_FATAL);
        }
    };
    install_signal_handler(control);

    let result = match orchestrator.run().await {
        Ok(result) => result,
        Err(e) => {
            error!("Run failed: {}", e);
            print_fatal(&e.into());
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if let Err(e) = writer.write(&result).await {
        eprintln!("{} {}", "⚠".bright_yellow().bold(), e);
    }

    ExitCode::from(result.exit_code() as u8)
}

fn handle_config_validate(config_file: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        anyhow::bail!("Configuration file not found: {:?}", config_file);
    }

    let config = ConfigLoader::new()
        .from_file(config_file)
        .context("Configuration validation failed")?;
    run::parse_thresholds(&config).context("Configuration validation failed")?;

    println!("{} Configuration file is valid", "✓".bright_green().bold());
    println!(
        "  {} scenario(s), {} stage(s) over {:?}, {} threshold(s)",
        config.scenarios.len(),
        config.stages.len(),
        config.shared_duration(),
        config.thresholds.len()
    );
    Ok(())
}

fn handle_config_generate(output: &Path, force: bool) -> Result<()> {
    info!("Generating sample configuration at: {:?}", output);

    if output.exists() && !force {
        anyhow::bail!("Output file already exists: {:?}. Use --force to overwrite.", output);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, StampedeConfig::generate_sample()).context("Failed to write configuration file")?;

    println!("{} Sample configuration generated at: {:?}", "✓".bright_green().bold(), output);
    println!("  Validate with: stampede config validate {:?}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run(args) => handle_run(args, cli.log_level).await,
        Commands::Config { config_cmd } => {
            if let Err(e) = init_logging(&LoggingConfig::default(), cli.log_level) {
                print_fatal(&e);
                return ExitCode::from(EXIT_FATAL);
            }
            let outcome = match config_cmd {
                ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
                ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
            };
            match outcome {
                Ok(()) => ExitCode::from(EXIT_PASSED),
                Err(e) => {
                    print_fatal(&e);
                    ExitCode::from(EXIT_FATAL)
                }
            }
        }
    }
}
