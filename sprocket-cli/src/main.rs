use anyhow::{Context, Result};
use clap::Parser;
use sprocket_config::{ConfigLoader, SprocketConfig};
use sprocket_core::TaskStatus;
use sprocket_logging::{init_child_tracing, init_logging_from_config, init_simple_tracing};
use std::path::PathBuf;
use tracing::{debug, info};

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};
use commands::{child, config, param_map, run, serve};

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<SprocketConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => loader
            .from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path)),
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Child mode: decode the job and run it, returning the exit code
async fn child_main(log_level: Option<&String>) -> i32 {
    let (header, bytecode) = match child::receive().await {
        Ok(job) => job,
        Err(e) => {
            eprintln!("sprocket child: {:#}", e);
            return 2;
        }
    };

    let level = log_level
        .cloned()
        .or_else(|| header.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    if let Err(e) = init_child_tracing(&level) {
        eprintln!("sprocket child: failed to initialize logging: {}", e);
    }

    match child::run_child(header, bytecode).await {
        Ok(TaskStatus::Finished) | Ok(TaskStatus::Terminated) => 0,
        Ok(_) => 1,
        Err(e) => {
            tracing::error!("Child failed: {:#}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Child mode first; its stdout and stdin belong to the supervisor
    // Exit directly so a program still running on a blocking thread after a
    // stop cannot hold the runtime open
    if cli.child {
        std::process::exit(child_main(cli.log_level.as_ref()).await);
    }

    let command = match &cli.command {
        Some(Commands::Config { config_cmd }) => {
            init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
            return match config_cmd {
                ConfigCommands::Validate { config_file } => config::validate(config_file),
                ConfigCommands::Generate { output, force } => config::generate(output.as_deref(), *force),
            };
        }
        Some(command) => command,
        None => {
            eprintln!("No command given. Try `sprocket --help`.");
            return Ok(());
        }
    };

    let config = load_config(cli.config.as_ref())?;
    match cli.log_level.as_deref() {
        Some(level) => init_simple_tracing(level)?,
        None => init_logging_from_config(&config.logging)?,
    }
    info!("Sprocket starting");

    match command {
        Commands::Serve => serve::serve(&config).await,
        Commands::Run { script, lang, params } => {
            run::run(&config, script, lang.clone(), param_map(params)).await
        }
        Commands::Compile { script, params } => {
            let supervisor = commands::build_supervisor(&config)?;
            let source = supervisor
                .generate_source(script, &param_map(params))
                .with_context(|| format!("Failed to compile '{}'", script))?;
            print!("{}", source);
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}
