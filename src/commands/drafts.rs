use anyhow::{Context, Result};

use super::{require_text, resolve_target};
use crate::cli::DraftsCommand;
use crate::render;
use crate::slack::SlackApi;
use crate::utils::AppError;

pub async fn run<A>(api: &A, command: DraftsCommand) -> Result<String>
where
    A: SlackApi + ?Sized,
{
    match command {
        DraftsCommand::List { json } => {
            let drafts = api.list_drafts().await.context("failed to list drafts")?;
            if json {
                render::to_json(&drafts)
            } else {
                Ok(render::drafts_text(&drafts))
            }
        }
        DraftsCommand::Create {
            channel,
            text,
            thread,
        } => {
            let text = require_text(&text)?;
            let channel = resolve_target(api, &channel).await?;
            let draft = api
                .create_draft(&channel, text, thread.as_deref())
                .await
                .with_context(|| format!("failed to create draft in {channel}"))?;
            Ok(format!("Created draft {} in {channel}", draft.id))
        }
        DraftsCommand::Delete { draft_id } => {
            let drafts = api.list_drafts().await.context("failed to list drafts")?;
            let draft = drafts
                .into_iter()
                .find(|draft| draft.id == draft_id)
                .ok_or_else(|| AppError::not_found(format!("draft {draft_id} not found")))?;
            api.delete_draft(&draft)
                .await
                .with_context(|| format!("failed to delete draft {draft_id}"))?;
            Ok(format!("Deleted draft {draft_id}"))
        }
    }
}
