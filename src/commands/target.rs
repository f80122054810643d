use anyhow::{Context, Result};
use tracing::debug;

use crate::slack::{ConversationKind, ConversationQuery, SlackApi};
use crate::utils::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target<'a> {
    Conversation(&'a str),
    User(&'a str),
    Name(&'a str),
}

fn classify(raw: &str) -> Target<'_> {
    if let Some(name) = raw.strip_prefix('#') {
        return Target::Name(name);
    }
    if looks_like_id(raw) {
        match raw.as_bytes()[0] {
            b'U' | b'W' => return Target::User(raw),
            b'C' | b'G' | b'D' => return Target::Conversation(raw),
            _ => {}
        }
    }
    Target::Name(raw)
}

/// Slack ids are a type letter followed by uppercase alphanumerics with at
/// least one digit, so all-caps names like `DEV` stay names.
fn looks_like_id(value: &str) -> bool {
    let Some(rest) = value.get(1..) else {
        return false;
    };
    !rest.is_empty()
        && rest.bytes().any(|b| b.is_ascii_digit())
        && value
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Turns a conversation id, user id or channel name into a conversation id.
/// User ids open (or reuse) the direct conversation with that user.
pub async fn resolve_target<A>(api: &A, raw: &str) -> Result<String>
where
    A: SlackApi + ?Sized,
{
    let raw = raw.trim();
    if raw.is_empty() || raw == "#" {
        return Err(AppError::validation("a target conversation is required").into());
    }

    match classify(raw) {
        Target::Conversation(id) => Ok(id.to_string()),
        Target::User(user_id) => {
            let channel = api
                .open_direct_conversation(user_id)
                .await
                .with_context(|| format!("failed to open a direct conversation with {user_id}"))?;
            debug!("resolved user {} to {}", user_id, channel);
            Ok(channel)
        }
        Target::Name(name) => {
            let query = ConversationQuery {
                types: [ConversationKind::Channel, ConversationKind::Private]
                    .iter()
                    .map(|kind| kind.list_type().to_string())
                    .collect(),
                limit: usize::MAX,
                exclude_archived: false,
            };
            let conversations = api
                .list_conversations(&query)
                .await
                .context("failed to list conversations")?;
            conversations
                .into_iter()
                .find(|conversation| conversation.name.as_deref() == Some(name))
                .map(|conversation| conversation.id)
                .ok_or_else(|| AppError::not_found(format!("conversation #{name} not found")).into())
        }
    }
}
