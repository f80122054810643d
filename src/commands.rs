use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::slack::{SlackApi, SlackClient};
use crate::utils::AppError;

mod conversations;
mod drafts;
mod files;
mod messages;
mod target;

pub use self::target::resolve_target;

/// Builds the client from the effective config and runs one command.
pub async fn run(cli: Cli, mut config: Config) -> Result<()> {
    config.override_token(cli.token.as_deref());
    config.validate().map_err(AppError::from)?;

    let client = SlackClient::new(&config).context("failed to build Slack client")?;
    let output = execute(&client, &config, cli.command).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Runs a parsed command and returns what should go to stdout.
pub async fn execute<A>(api: &A, config: &Config, command: Commands) -> Result<String>
where
    A: SlackApi + ?Sized,
{
    debug!("executing {:?}", command);
    match command {
        Commands::Messages(command) => messages::run(api, command).await,
        Commands::Conversations(command) => conversations::run(api, config, command).await,
        Commands::Files(command) => files::run(api, config, command).await,
        Commands::Drafts(command) => drafts::run(api, command).await,
    }
}

fn require_text(text: &str) -> Result<&str, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("message text cannot be empty"));
    }
    Ok(trimmed)
}
