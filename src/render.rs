//! Text and JSON output. Everything here is a pure function of data the
//! commands already fetched and resolved.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::enrich::{EnrichReport, UserDirectory};
use crate::media::{BatchSummary, SavedFile};
use crate::slack::{
    Conversation, ConversationKind, Draft, FileListing, Message, ScheduledMessage, UserProfile,
};
use crate::unread::{UnreadMessages, UnreadReport, UnreadSummary};
use crate::utils::formatting::{format_size, format_ts, format_unix, normalize_slack_text};

const REPLY_INDENT: &str = "    ";

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn user_map(users: &UserDirectory) -> BTreeMap<&str, &UserProfile> {
    users
        .profiles()
        .iter()
        .map(|(id, profile)| (id.as_str(), profile))
        .collect()
}

fn author_label(message: &Message, users: &UserDirectory) -> String {
    if let Some(user) = message.author() {
        return users.label(user);
    }
    message
        .username
        .clone()
        .or_else(|| message.bot_id.as_ref().map(|id| format!("bot {id}")))
        .unwrap_or_else(|| "unknown".to_string())
}

fn plain_text(text: &str, users: &UserDirectory) -> String {
    normalize_slack_text(text, |id| users.get(id).map(|p| p.label().to_string()))
}

fn push_message(lines: &mut Vec<String>, message: &Message, users: &UserDirectory, indent: &str) {
    let text = plain_text(&message.text, users);
    let mut text_lines = text.lines();
    lines.push(format!(
        "{indent}[{}] {}: {}",
        format_ts(&message.ts),
        author_label(message, users),
        text_lines.next().unwrap_or_default()
    ));
    for line in text_lines {
        lines.push(format!("{indent}  {line}"));
    }

    for file in &message.files {
        if file.is_tombstone() {
            lines.push(format!("{indent}  [file {}] (deleted)", file.id));
        } else {
            lines.push(format!(
                "{indent}  [file {}] {} ({})",
                file.id,
                file.display_name(),
                format_size(file.size)
            ));
        }
    }

    if !message.reactions.is_empty() {
        let reactions: Vec<String> = message
            .reactions
            .iter()
            .map(|r| format!(":{}: {}", r.name, r.count))
            .collect();
        lines.push(format!("{indent}  {}", reactions.join("  ")));
    }

    if let Some(transcript) = &message.transcript {
        lines.push(format!("{indent}  transcript: {transcript}"));
    }

    if !message.thread_replies.is_empty() {
        for reply in &message.thread_replies {
            push_message(lines, reply, users, &format!("{indent}{REPLY_INDENT}"));
        }
    } else if message.reply_count > 0 {
        lines.push(format!("{indent}  ({} replies)", message.reply_count));
    }
}

pub fn messages_text(messages: &[Message], users: &UserDirectory) -> String {
    if messages.is_empty() {
        return "No messages.".to_string();
    }
    let mut lines = Vec::new();
    for message in messages {
        push_message(&mut lines, message, users, "");
    }
    lines.join("\n")
}

pub fn messages_json(
    channel_id: &str,
    messages: &[Message],
    users: &UserDirectory,
    report: &EnrichReport,
) -> Result<String> {
    to_json(&json!({
        "channel": channel_id,
        "messages": messages,
        "users": user_map(users),
        "enrichment_failures": {
            "threads": report.thread_failures,
            "transcripts": report.transcript_failures,
        },
    }))
}

pub fn enrich_warning(report: &EnrichReport) -> Option<String> {
    if report.failures() == 0 {
        return None;
    }
    Some(format!(
        "warning: {} thread and {} transcript fetches failed",
        report.thread_failures, report.transcript_failures
    ))
}

fn conversation_label(conversation: &Conversation, users: &UserDirectory) -> String {
    match conversation.kind() {
        ConversationKind::Im => conversation
            .user
            .as_deref()
            .map(|user| format!("@{}", users.label(user)))
            .unwrap_or_else(|| conversation.id.clone()),
        _ => conversation
            .name
            .as_deref()
            .map(|name| format!("#{name}"))
            .unwrap_or_else(|| conversation.id.clone()),
    }
}

pub fn conversations_text(conversations: &[Conversation], users: &UserDirectory) -> String {
    if conversations.is_empty() {
        return "No conversations.".to_string();
    }
    conversations
        .iter()
        .map(|conversation| {
            let mut line = format!(
                "{:<12} {:<8} {}",
                conversation.id,
                conversation.kind().as_str(),
                conversation_label(conversation, users)
            );
            if let Some(members) = conversation.num_members {
                line.push_str(&format!(" ({members} members)"));
            }
            if conversation.is_archived {
                line.push_str(" [archived]");
            }
            if let Some(topic) = conversation
                .topic
                .as_ref()
                .map(|t| t.value.trim())
                .filter(|t| !t.is_empty())
            {
                line.push_str(&format!(" - {topic}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn conversations_json(conversations: &[Conversation], users: &UserDirectory) -> Result<String> {
    to_json(&json!({
        "conversations": conversations,
        "users": user_map(users),
    }))
}

fn unread_summary_text(summary: &UnreadSummary) -> String {
    let mut lines: Vec<String> = summary
        .channels
        .iter()
        .map(|channel| {
            let name = channel
                .name
                .as_deref()
                .map(|name| match channel.kind() {
                    ConversationKind::Im => name.to_string(),
                    _ => format!("#{name}"),
                })
                .unwrap_or_else(|| channel.id.clone());
            let mut line = format!("{:<24} {:>5} unread", name, channel.unread_count);
            if channel.mention_count > 0 {
                line.push_str(&format!(", {} mentions", channel.mention_count));
            }
            if channel.is_muted {
                line.push_str(" (muted)");
            }
            line
        })
        .collect();
    lines.push(format!(
        "Total: {} unread in {} conversations, {} mentions",
        summary.total_unread,
        summary.channels.len(),
        summary.total_mentions
    ));
    lines.join("\n")
}

fn unread_messages_text(report: &UnreadMessages) -> String {
    let mut lines = Vec::new();
    for section in &report.sections {
        let name = section
            .channel
            .name
            .as_deref()
            .unwrap_or(section.channel.id.as_str());
        lines.push(format!("== {} ({} new) ==", name, section.messages.len()));
        for message in &section.messages {
            push_message(&mut lines, message, &report.users, "");
        }
        lines.push(String::new());
    }
    for failure in &report.failures {
        lines.push(format!("failed to read {}: {}", failure.channel_id, failure.error));
    }
    for marked in &report.marked {
        lines.push(format!("Marked {} read up to {}", marked.channel_id, marked.ts));
    }
    for failure in &report.mark_failures {
        lines.push(format!("failed to mark {} read: {}", failure.channel_id, failure.error));
    }
    lines.join("\n").trim_end().to_string()
}

pub fn unread_text(report: &UnreadReport) -> String {
    match report {
        UnreadReport::NothingUnread => "No unread conversations.".to_string(),
        UnreadReport::TargetCaughtUp(channel) => format!(
            "No unread messages in {}.",
            channel.name.as_deref().unwrap_or(channel.id.as_str())
        ),
        UnreadReport::AllCaughtUp => "All caught up.".to_string(),
        UnreadReport::Summary(summary) => unread_summary_text(summary),
        UnreadReport::Messages(messages) => unread_messages_text(messages),
    }
}

pub fn unread_json(report: &UnreadReport) -> Result<String> {
    let value = match report {
        UnreadReport::NothingUnread => json!({ "status": "nothing_unread", "channels": [] }),
        UnreadReport::TargetCaughtUp(channel) => {
            json!({ "status": "caught_up", "channel": channel })
        }
        UnreadReport::AllCaughtUp => json!({ "status": "caught_up", "channels": [] }),
        UnreadReport::Summary(summary) => json!({
            "status": "unread",
            "channels": summary.channels,
            "total_unread": summary.total_unread,
            "total_mentions": summary.total_mentions,
        }),
        UnreadReport::Messages(messages) => json!({
            "status": "unread",
            "sections": messages.sections,
            "failures": messages.failures,
            "marked": messages.marked,
            "mark_failures": messages.mark_failures,
            "users": user_map(&messages.users),
        }),
    };
    to_json(&value)
}

pub fn files_text(listing: &FileListing) -> String {
    let mut lines: Vec<String> = listing
        .files
        .iter()
        .map(|file| {
            let created = file.created.map(format_unix).unwrap_or_default();
            let state = if file.is_tombstone() { " [deleted]" } else { "" };
            format!(
                "{:<12} {:<16} {:>9}  {:<6} {}{}",
                file.id,
                created,
                format_size(file.size),
                file.filetype,
                file.display_name(),
                state
            )
        })
        .collect();
    if lines.is_empty() {
        lines.push("No files.".to_string());
    }
    if let Some(paging) = &listing.paging
        && paging.pages > 1
    {
        lines.push(format!(
            "Page {} of {} ({} files total)",
            paging.page, paging.pages, paging.total
        ));
    }
    lines.join("\n")
}

pub fn saved_file_text(saved: &SavedFile) -> String {
    format!("Saved {} to {}", saved.file_id, saved.path.display())
}

pub fn batch_summary_text(summary: &BatchSummary) -> String {
    let mut lines: Vec<String> = summary.saved.iter().map(saved_file_text).collect();
    for skipped in &summary.skipped_files {
        lines.push(format!("Skipped {} ({}): {}", skipped.file_id, skipped.name, skipped.reason));
    }
    for failure in &summary.failures {
        lines.push(format!("Failed {} ({}): {}", failure.file_id, failure.name, failure.error));
    }
    lines.push(format!(
        "Downloaded {}, failed {}, skipped {} of {} files",
        summary.downloaded,
        summary.failed,
        summary.skipped,
        summary.total()
    ));
    lines.join("\n")
}

pub fn scheduled_text(scheduled: &[ScheduledMessage]) -> String {
    if scheduled.is_empty() {
        return "No scheduled messages.".to_string();
    }
    scheduled
        .iter()
        .map(|message| {
            format!(
                "{:<14} {:<12} {}  {}",
                message.id,
                message.channel_id,
                format_unix(message.post_at),
                first_line(&message.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn drafts_text(drafts: &[Draft]) -> String {
    if drafts.is_empty() {
        return "No drafts.".to_string();
    }
    drafts
        .iter()
        .map(|draft| {
            let channel = draft.channel_id.as_deref().unwrap_or("-");
            let thread = draft
                .thread_ts
                .as_deref()
                .map(|ts| format!(" (thread {ts})"))
                .unwrap_or_default();
            format!(
                "{:<14} {:<12} {}{}  {}",
                draft.id,
                channel,
                format_ts(&draft.last_updated_ts),
                thread,
                first_line(&draft.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
