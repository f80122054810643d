use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use super::{require_text, resolve_target};
use crate::cli::MessagesCommand;
use crate::render;
use crate::schedule::resolve_post_at;
use crate::slack::SlackApi;
use crate::utils::AppError;
use crate::utils::formatting::format_unix;

pub async fn run<A>(api: &A, command: MessagesCommand) -> Result<String>
where
    A: SlackApi + ?Sized,
{
    match command {
        MessagesCommand::Send {
            target,
            text,
            thread,
        } => {
            let text = require_text(&text)?;
            let channel = resolve_target(api, &target).await?;
            let ts = api
                .post_message(&channel, text, thread.as_deref())
                .await
                .with_context(|| format!("failed to send message to {channel}"))?;
            info!("posted message {} to {}", ts, channel);
            Ok(format!("Sent message to {channel} (ts {ts})"))
        }
        MessagesCommand::Schedule {
            target,
            text,
            at,
            thread,
        } => {
            let text = require_text(&text)?;
            let post_at = resolve_post_at(&at, Utc::now()).map_err(AppError::from)?;
            let channel = resolve_target(api, &target).await?;
            let id = api
                .schedule_message(&channel, text, post_at, thread.as_deref())
                .await
                .with_context(|| format!("failed to schedule message in {channel}"))?;
            info!("scheduled message {} in {} for {}", id, channel, post_at);
            Ok(format!(
                "Scheduled message {id} in {channel} for {}",
                format_unix(post_at)
            ))
        }
        MessagesCommand::Scheduled {
            channel,
            limit,
            json,
        } => {
            let channel = match channel {
                Some(target) => Some(resolve_target(api, &target).await?),
                None => None,
            };
            let scheduled = api
                .list_scheduled_messages(channel.as_deref(), limit)
                .await
                .context("failed to list scheduled messages")?;
            if json {
                render::to_json(&scheduled)
            } else {
                Ok(render::scheduled_text(&scheduled))
            }
        }
        MessagesCommand::Unschedule {
            channel,
            scheduled_id,
        } => {
            let channel = resolve_target(api, &channel).await?;
            api.delete_scheduled_message(&channel, &scheduled_id)
                .await
                .with_context(|| format!("failed to delete scheduled message {scheduled_id}"))?;
            Ok(format!("Deleted scheduled message {scheduled_id}"))
        }
    }
}
