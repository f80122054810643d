#![forbid(unsafe_code)]

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;
mod config;
mod enrich;
mod media;
mod render;
mod schedule;
mod slack;
mod unread;
mod utils;

use cli::Cli;
use config::Config;
use utils::AppError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(hint) = utils::error::hint_for(&err) {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).map_err(AppError::from)?;
    utils::logging::init_tracing(&config.logging, cli.verbose);
    debug!("slack-cli {} starting", env!("CARGO_PKG_VERSION"));

    commands::run(cli, config).await
}
