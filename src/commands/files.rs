use anyhow::{Context, Result};

use super::resolve_target;
use crate::cli::FilesCommand;
use crate::config::Config;
use crate::media;
use crate::render;
use crate::slack::{FileQuery, SlackApi};
use crate::utils::AppError;

pub async fn run<A>(api: &A, config: &Config, command: FilesCommand) -> Result<String>
where
    A: SlackApi + ?Sized,
{
    match command {
        FilesCommand::List {
            channel,
            user,
            types,
            count,
            page,
            json,
        } => {
            let channel = match channel {
                Some(target) => Some(resolve_target(api, &target).await?),
                None => None,
            };
            let query = FileQuery {
                channel,
                user,
                types,
                count: Some(count.unwrap_or(config.limits.file_count)),
                page,
            };
            let listing = api.list_files(&query).await.context("failed to list files")?;
            if json {
                render::to_json(&listing)
            } else {
                Ok(render::files_text(&listing))
            }
        }
        FilesCommand::Download { file_id, output } => {
            let saved = media::download_one(api, &file_id, output.as_deref()).await?;
            Ok(render::saved_file_text(&saved))
        }
        FilesCommand::DownloadAll {
            channel,
            types,
            count,
            output_dir,
            concurrency,
        } => {
            let concurrency = concurrency.unwrap_or(config.limits.download_concurrency);
            if concurrency == 0 {
                return Err(AppError::validation("--concurrency must be at least 1").into());
            }
            let channel = resolve_target(api, &channel).await?;
            let query = FileQuery {
                channel: Some(channel),
                types,
                count: Some(count.unwrap_or(config.limits.file_count)),
                ..FileQuery::default()
            };
            let summary = media::download_all(api, &query, &output_dir, concurrency).await?;
            Ok(render::batch_summary_text(&summary))
        }
    }
}
