use anyhow::Context;
use clap::Parser;
use pagehits::cli::{Cli, Command};
use pagehits::error::exit_code;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(err) = e.downcast_ref::<pagehits::Error>() {
                ExitCode::from(err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    // Validate CLI arguments
    cli.validate()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Invalid arguments")?;

    let config = cli.analytics_config();

    match cli.command {
        Command::Ingest { file, .. } => {
            let config = config.context("ingest requires a pipeline configuration")?;
            pagehits::commands::ingest::run(config, file.as_deref())?;
        }
        Command::Top {
            date,
            top,
            json,
            csv,
        } => {
            pagehits::commands::top::run(&cli.db, date.as_deref(), top, json, csv)?;
        }
        Command::Days { limit } => {
            pagehits::commands::days::run(&cli.db, limit)?;
        }
        Command::Query { sql } => {
            pagehits::commands::query::run(&cli.db, &sql)?;
        }
        Command::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pagehits", &mut std::io::stdout());
        }
    }

    Ok(())
}
