use anyhow::{Context, Result};
use tracing::{info, warn};

use super::resolve_target;
use crate::cli::{ConversationsCommand, ReadArgs, UnreadArgs};
use crate::config::Config;
use crate::enrich::{EnrichOptions, Enricher, UserDirectory};
use crate::render;
use crate::slack::{ConversationQuery, HistoryRange, SlackApi};
use crate::unread::{self, UnreadOptions};

pub async fn run<A>(api: &A, config: &Config, command: ConversationsCommand) -> Result<String>
where
    A: SlackApi + ?Sized,
{
    match command {
        ConversationsCommand::List {
            types,
            limit,
            include_archived,
            json,
        } => {
            let mut query = ConversationQuery {
                limit,
                exclude_archived: !include_archived,
                ..ConversationQuery::default()
            };
            if !types.is_empty() {
                query.types = types;
            }
            let conversations = api
                .list_conversations(&query)
                .await
                .context("failed to list conversations")?;

            let mut users = UserDirectory::new();
            users
                .resolve(api, conversations.iter().filter_map(|c| c.user.clone()))
                .await;
            if json {
                render::conversations_json(&conversations, &users)
            } else {
                Ok(render::conversations_text(&conversations, &users))
            }
        }
        ConversationsCommand::Read(args) => read_conversation(api, config, args).await,
        ConversationsCommand::Unread(args) => show_unread(api, config, args).await,
        ConversationsCommand::MarkRead { channel, ts } => {
            let channel = resolve_target(api, &channel).await?;
            let ts = match ts {
                Some(ts) => ts,
                None => {
                    let range = HistoryRange {
                        limit: Some(1),
                        ..HistoryRange::default()
                    };
                    let newest = api
                        .conversation_history(&channel, &range)
                        .await
                        .with_context(|| format!("failed to read history of {channel}"))?;
                    match newest.into_iter().next() {
                        Some(message) => message.ts,
                        None => return Ok(format!("No messages in {channel}")),
                    }
                }
            };
            api.mark_read(&channel, &ts)
                .await
                .with_context(|| format!("failed to mark {channel} read"))?;
            info!("marked {} read up to {}", channel, ts);
            Ok(format!("Marked {channel} read up to {ts}"))
        }
    }
}

async fn read_conversation<A>(api: &A, config: &Config, args: ReadArgs) -> Result<String>
where
    A: SlackApi + ?Sized,
{
    let channel = resolve_target(api, &args.channel).await?;
    let range = HistoryRange {
        limit: Some(args.limit.unwrap_or(config.limits.history_limit)),
        oldest: args.oldest,
        latest: args.latest,
    };

    let (messages, options) = match args.thread.as_deref() {
        Some(thread_ts) => {
            let replies = api
                .thread_replies(&channel, thread_ts, &range)
                .await
                .with_context(|| format!("failed to read thread {thread_ts} in {channel}"))?;
            let options = EnrichOptions {
                threads: false,
                transcripts: args.transcripts,
            };
            (replies, options)
        }
        None => {
            let mut history = api
                .conversation_history(&channel, &range)
                .await
                .with_context(|| format!("failed to read history of {channel}"))?;
            history.reverse();
            let options = EnrichOptions {
                threads: args.with_replies,
                transcripts: args.transcripts,
            };
            (history, options)
        }
    };

    let batch = Enricher::new(api).enrich(&channel, messages, options).await;
    if args.json {
        return render::messages_json(&channel, &batch.messages, &batch.users, &batch.report);
    }

    let mut output = render::messages_text(&batch.messages, &batch.users);
    if let Some(warning) = render::enrich_warning(&batch.report) {
        warn!("{}", warning);
        output.push('\n');
        output.push_str(&warning);
    }
    Ok(output)
}

async fn show_unread<A>(api: &A, config: &Config, args: UnreadArgs) -> Result<String>
where
    A: SlackApi + ?Sized,
{
    let options = UnreadOptions {
        target: args.channel,
        include_muted: args.include_muted,
        with_messages: args.messages,
        message_limit: args.limit.unwrap_or(config.limits.unread_message_limit),
        mark_read: args.mark_read,
    };
    let report = unread::reconcile(api, &options).await?;
    let failures = report.failure_count();
    if failures > 0 {
        warn!("{} unread conversation(s) could not be fully processed", failures);
    }
    if args.json {
        render::unread_json(&report)
    } else {
        Ok(render::unread_text(&report))
    }
}
