//! Ragcite CLI
//!
//! Cited question answering over a local document corpus.

use anyhow::Result;
use clap::Parser;
use ragcite_core::error::exit_codes;
use ragcite_core::{Config, RagError};

mod app;
mod commands;
mod output;
mod progress;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match run(cli).await {
        Ok(code) if code == exit_codes::SUCCESS => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code_for(&e));
        }
    }
}

fn exit_code_for(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<RagError>()
        .map_or(exit_codes::GENERAL_ERROR, RagError::exit_code)
}

async fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let code = match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args, config, cli.format).await?,
        Commands::Remove(args) => commands::remove::run(args, config, cli.format)?,
        Commands::Ls => commands::ls::run(config, cli.format)?,
        Commands::Status => commands::status::run(config, cli.format)?,
        Commands::Query(args) => commands::query::run(args, config, cli.format).await?,
        Commands::Eval(args) => commands::eval::run(args, config, cli.format).await?,
        Commands::Compare(args) => commands::compare::run(args, &config, cli.format)?,
        Commands::Sessions(args) => commands::sessions::run(args, &config, cli.format)?,
        Commands::Config(args) => {
            commands::config::run(args, &config, cli.config.as_deref(), cli.format)?
        }
    };
    Ok(code)
}
