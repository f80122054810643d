use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;

pub mod error;
#[cfg(test)]
pub mod fake;
pub mod types;

pub use self::error::SlackError;
pub use self::types::{
    Conversation, ConversationKind, ConversationQuery, Draft, FileListing, FilePayload, FileQuery,
    HistoryRange, Message, Paging, Reaction, ScheduledMessage, SlackFile, UnreadChannel,
    UserProfile, compare_ts,
};

pub type SlackResult<T> = std::result::Result<T, SlackError>;

const CONVERSATIONS_PAGE_SIZE: usize = 200;
const MAX_REPLIES_PAGE: u32 = 1000;

/// Remote operations the commands are built on.
///
/// Every call may fail with an auth, rate-limit or transport error; callers
/// decide whether a failure aborts the command or is isolated to one item.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn open_direct_conversation(&self, user_id: &str) -> SlackResult<String>;

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> SlackResult<String>;

    async fn schedule_message(
        &self,
        channel_id: &str,
        text: &str,
        post_at: i64,
        thread_ts: Option<&str>,
    ) -> SlackResult<String>;

    async fn list_scheduled_messages(
        &self,
        channel_id: Option<&str>,
        limit: u32,
    ) -> SlackResult<Vec<ScheduledMessage>>;

    async fn delete_scheduled_message(
        &self,
        channel_id: &str,
        scheduled_message_id: &str,
    ) -> SlackResult<()>;

    async fn list_conversations(&self, query: &ConversationQuery)
    -> SlackResult<Vec<Conversation>>;

    /// Newest first, as the remote returns it.
    async fn conversation_history(
        &self,
        channel_id: &str,
        range: &HistoryRange,
    ) -> SlackResult<Vec<Message>>;

    /// Index 0 is the thread root.
    async fn thread_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        range: &HistoryRange,
    ) -> SlackResult<Vec<Message>>;

    async fn unread_counters(&self) -> SlackResult<Vec<UnreadChannel>>;

    async fn last_read(&self, channel_id: &str) -> SlackResult<Option<String>>;

    async fn mark_read(&self, channel_id: &str, ts: &str) -> SlackResult<()>;

    async fn list_files(&self, query: &FileQuery) -> SlackResult<FileListing>;

    async fn file_info(&self, file_id: &str) -> SlackResult<SlackFile>;

    async fn fetch_text(&self, url: &str) -> SlackResult<String>;

    async fn fetch_bytes(&self, url: &str) -> SlackResult<FilePayload>;

    /// Profiles that cannot be resolved are left out of the result.
    async fn lookup_users(&self, user_ids: &[String]) -> SlackResult<Vec<UserProfile>>;

    async fn lookup_user(&self, user_id: &str) -> SlackResult<UserProfile>;

    async fn list_drafts(&self) -> SlackResult<Vec<Draft>>;

    async fn create_draft(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> SlackResult<Draft>;

    async fn delete_draft(&self, draft: &Draft) -> SlackResult<()>;
}

type Params = Vec<(&'static str, String)>;

pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl SlackClient {
    pub fn new(config: &Config) -> AnyResult<Self> {
        let token = config.auth.token.trim();
        if token.is_empty() {
            return Err(anyhow!("auth.token is empty"));
        }

        let http = reqwest::Client::builder()
            .user_agent(config.api.user_agent.as_str())
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()
            .context("failed to construct HTTP client")?;

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            token: SecretString::from(token.to_string()),
        })
    }

    async fn slack_api_post(&self, method: &str, params: Params) -> SlackResult<Value> {
        let body: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(key, value)| (*key, value.as_str())))
            .finish();
        debug!("calling slack method {}", method);

        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|err| SlackError::transport(method, err))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(SlackError::RateLimited {
                method: method.to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            return Err(SlackError::Api {
                method: method.to_string(),
                code: format!("http_{}", status.as_u16()),
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|err| SlackError::malformed(method, format!("non-JSON body: {err}")))?;
        if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let code = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(SlackError::from_code(method, code));
        }
        if let Some(warning) = value.pointer("/response_metadata/warnings") {
            debug!("slack {} warnings: {}", method, warning);
        }

        Ok(value)
    }

    async fn authorized_get(&self, url: &str) -> SlackResult<reqwest::Response> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|err| SlackError::transport(url, err))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SlackError::RateLimited {
                method: url.to_string(),
                retry_after: None,
            });
        }
        if !status.is_success() {
            return Err(SlackError::transport(url, format!("status {status}")));
        }
        Ok(response)
    }

    async fn fetch_user(&self, user_id: &str) -> SlackResult<UserProfile> {
        let mut value = self
            .slack_api_post("users.info", vec![("user", user_id.to_string())])
            .await?;
        let raw: RawUser = take_field(&mut value, "users.info", "user")?;
        Ok(raw.into_profile())
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn open_direct_conversation(&self, user_id: &str) -> SlackResult<String> {
        let value = self
            .slack_api_post("conversations.open", vec![("users", user_id.to_string())])
            .await?;
        value
            .pointer("/channel/id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| SlackError::malformed("conversations.open", "missing channel.id"))
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> SlackResult<String> {
        let mut params: Params = vec![
            ("channel", channel_id.to_string()),
            ("text", text.to_string()),
        ];
        if let Some(thread_ts) = thread_ts {
            params.push(("thread_ts", thread_ts.to_string()));
        }
        let value = self.slack_api_post("chat.postMessage", params).await?;
        value
            .get("ts")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| SlackError::malformed("chat.postMessage", "missing ts"))
    }

    async fn schedule_message(
        &self,
        channel_id: &str,
        text: &str,
        post_at: i64,
        thread_ts: Option<&str>,
    ) -> SlackResult<String> {
        let mut params: Params = vec![
            ("channel", channel_id.to_string()),
            ("text", text.to_string()),
            ("post_at", post_at.to_string()),
        ];
        if let Some(thread_ts) = thread_ts {
            params.push(("thread_ts", thread_ts.to_string()));
        }
        let value = self.slack_api_post("chat.scheduleMessage", params).await?;
        value
            .get("scheduled_message_id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                SlackError::malformed("chat.scheduleMessage", "missing scheduled_message_id")
            })
    }

    async fn list_scheduled_messages(
        &self,
        channel_id: Option<&str>,
        limit: u32,
    ) -> SlackResult<Vec<ScheduledMessage>> {
        let mut params: Params = vec![("limit", limit.to_string())];
        if let Some(channel_id) = channel_id {
            params.push(("channel", channel_id.to_string()));
        }
        let mut value = self
            .slack_api_post("chat.scheduledMessages.list", params)
            .await?;
        take_field(&mut value, "chat.scheduledMessages.list", "scheduled_messages")
    }

    async fn delete_scheduled_message(
        &self,
        channel_id: &str,
        scheduled_message_id: &str,
    ) -> SlackResult<()> {
        self.slack_api_post(
            "chat.deleteScheduledMessage",
            vec![
                ("channel", channel_id.to_string()),
                ("scheduled_message_id", scheduled_message_id.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_conversations(
        &self,
        query: &ConversationQuery,
    ) -> SlackResult<Vec<Conversation>> {
        let mut conversations = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page_size = CONVERSATIONS_PAGE_SIZE.min(query.limit.max(1));
            let mut params: Params = vec![
                ("types", query.types.join(",")),
                ("limit", page_size.to_string()),
                ("exclude_archived", query.exclude_archived.to_string()),
            ];
            if let Some(cursor) = &cursor {
                params.push(("cursor", cursor.clone()));
            }

            let mut value = self.slack_api_post("conversations.list", params).await?;
            let page: Vec<Conversation> = take_field(&mut value, "conversations.list", "channels")?;
            conversations.extend(page);

            cursor = next_cursor(&value);
            if cursor.is_none() || conversations.len() >= query.limit {
                break;
            }
        }

        conversations.truncate(query.limit);
        Ok(conversations)
    }

    async fn conversation_history(
        &self,
        channel_id: &str,
        range: &HistoryRange,
    ) -> SlackResult<Vec<Message>> {
        let mut params: Params = vec![("channel", channel_id.to_string())];
        push_range(&mut params, range);
        let mut value = self.slack_api_post("conversations.history", params).await?;
        take_field(&mut value, "conversations.history", "messages")
    }

    async fn thread_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        range: &HistoryRange,
    ) -> SlackResult<Vec<Message>> {
        let mut params: Params = vec![
            ("channel", channel_id.to_string()),
            ("ts", thread_ts.to_string()),
        ];
        let range = HistoryRange {
            limit: Some(range.limit.unwrap_or(MAX_REPLIES_PAGE)),
            ..range.clone()
        };
        push_range(&mut params, &range);
        let mut value = self.slack_api_post("conversations.replies", params).await?;
        take_field(&mut value, "conversations.replies", "messages")
    }

    async fn unread_counters(&self) -> SlackResult<Vec<UnreadChannel>> {
        let mut value = self
            .slack_api_post(
                "users.counts",
                vec![
                    ("simple_unreads", "true".to_string()),
                    ("mpim_aware", "true".to_string()),
                    ("only_relevant_ims", "true".to_string()),
                ],
            )
            .await?;

        let mut counters = Vec::new();
        for (key, kind) in [
            ("channels", CountsKind::Channel),
            ("groups", CountsKind::Group),
            ("mpims", CountsKind::Mpim),
            ("ims", CountsKind::Im),
        ] {
            let entries: Option<Vec<CountsEntry>> =
                take_optional_field(&mut value, "users.counts", key)?;
            counters.extend(
                entries
                    .unwrap_or_default()
                    .into_iter()
                    .map(|entry| entry.into_unread(kind)),
            );
        }
        Ok(counters)
    }

    async fn last_read(&self, channel_id: &str) -> SlackResult<Option<String>> {
        let value = self
            .slack_api_post("conversations.info", vec![("channel", channel_id.to_string())])
            .await?;
        Ok(value
            .pointer("/channel/last_read")
            .and_then(Value::as_str)
            .filter(|ts| !ts.is_empty())
            .map(ToOwned::to_owned))
    }

    async fn mark_read(&self, channel_id: &str, ts: &str) -> SlackResult<()> {
        self.slack_api_post(
            "conversations.mark",
            vec![("channel", channel_id.to_string()), ("ts", ts.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn list_files(&self, query: &FileQuery) -> SlackResult<FileListing> {
        let mut params: Params = Vec::new();
        if let Some(channel) = &query.channel {
            params.push(("channel", channel.clone()));
        }
        if let Some(user) = &query.user {
            params.push(("user", user.clone()));
        }
        if let Some(types) = &query.types {
            params.push(("types", types.clone()));
        }
        if let Some(count) = query.count {
            params.push(("count", count.to_string()));
        }
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }

        let mut value = self.slack_api_post("files.list", params).await?;
        let files = take_field(&mut value, "files.list", "files")?;
        let paging = take_optional_field(&mut value, "files.list", "paging")?;
        Ok(FileListing { files, paging })
    }

    async fn file_info(&self, file_id: &str) -> SlackResult<SlackFile> {
        let mut value = self
            .slack_api_post("files.info", vec![("file", file_id.to_string())])
            .await?;
        take_field(&mut value, "files.info", "file")
    }

    async fn fetch_text(&self, url: &str) -> SlackResult<String> {
        self.authorized_get(url)
            .await?
            .text()
            .await
            .map_err(|err| SlackError::transport(url, err))
    }

    async fn fetch_bytes(&self, url: &str) -> SlackResult<FilePayload> {
        let response = self.authorized_get(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let data = response
            .bytes()
            .await
            .map_err(|err| SlackError::transport(url, err))?
            .to_vec();
        debug!("downloaded {} bytes from {}", data.len(), url);
        Ok(FilePayload { data, content_type })
    }

    async fn lookup_users(&self, user_ids: &[String]) -> SlackResult<Vec<UserProfile>> {
        // users.info has no batch form.
        let mut profiles = Vec::with_capacity(user_ids.len());
        let mut seen = HashSet::new();
        for user_id in user_ids {
            if !seen.insert(user_id.as_str()) {
                continue;
            }
            match self.lookup_user(user_id).await {
                Ok(profile) => profiles.push(profile),
                Err(err @ SlackError::Auth { .. }) => return Err(err),
                Err(err) => warn!("failed to fetch slack user {}: {}", user_id, err),
            }
        }
        Ok(profiles)
    }

    async fn lookup_user(&self, user_id: &str) -> SlackResult<UserProfile> {
        self.fetch_user(user_id).await
    }

    async fn list_drafts(&self) -> SlackResult<Vec<Draft>> {
        let mut value = self
            .slack_api_post("drafts.list", vec![("is_active", "true".to_string())])
            .await?;
        let raw: Vec<RawDraft> = take_field(&mut value, "drafts.list", "drafts")?;
        Ok(raw
            .into_iter()
            .filter(|draft| !draft.is_deleted && !draft.is_sent)
            .map(RawDraft::into_draft)
            .collect())
    }

    async fn create_draft(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> SlackResult<Draft> {
        let mut destination = json!({ "channel_id": channel_id });
        if let Some(thread_ts) = thread_ts {
            destination["thread_ts"] = json!(thread_ts);
        }
        let params: Params = vec![
            ("client_msg_id", uuid::Uuid::new_v4().to_string()),
            ("blocks", rich_text_blocks(text).to_string()),
            ("destinations", json!([destination]).to_string()),
            ("file_ids", "[]".to_string()),
            ("is_from_composer", "false".to_string()),
        ];
        let mut value = self.slack_api_post("drafts.create", params).await?;
        let raw: RawDraft = take_field(&mut value, "drafts.create", "draft")?;
        Ok(raw.into_draft())
    }

    async fn delete_draft(&self, draft: &Draft) -> SlackResult<()> {
        self.slack_api_post(
            "drafts.delete",
            vec![
                ("draft_id", draft.id.clone()),
                ("client_last_updated_ts", draft.last_updated_ts.clone()),
            ],
        )
        .await?;
        Ok(())
    }
}

fn push_range(params: &mut Params, range: &HistoryRange) {
    if let Some(limit) = range.limit {
        params.push(("limit", limit.to_string()));
    }
    if let Some(oldest) = &range.oldest {
        params.push(("oldest", oldest.clone()));
    }
    if let Some(latest) = &range.latest {
        params.push(("latest", latest.clone()));
    }
}

fn next_cursor(value: &Value) -> Option<String> {
    value
        .pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(ToOwned::to_owned)
}

fn take_field<T: DeserializeOwned>(value: &mut Value, method: &str, key: &str) -> SlackResult<T> {
    take_optional_field(value, method, key)?
        .ok_or_else(|| SlackError::malformed(method, format!("missing {key}")))
}

fn take_optional_field<T: DeserializeOwned>(
    value: &mut Value,
    method: &str,
    key: &str,
) -> SlackResult<Option<T>> {
    match value.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(None),
        Some(field) => serde_json::from_value(field)
            .map(Some)
            .map_err(|err| SlackError::malformed(method, format!("invalid {key}: {err}"))),
    }
}

fn rich_text_blocks(text: &str) -> Value {
    json!([{
        "type": "rich_text",
        "elements": [{
            "type": "rich_text_section",
            "elements": [{ "type": "text", "text": text }]
        }]
    }])
}

/// Flattens the `text` leaves of a block tree in document order.
fn blocks_text(blocks: &Value) -> String {
    fn walk(node: &Value, out: &mut String) {
        match node {
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            Value::Object(map) => {
                if map.get("type").and_then(Value::as_str) == Some("text")
                    && let Some(text) = map.get("text").and_then(Value::as_str)
                {
                    out.push_str(text);
                }
                if let Some(elements) = map.get("elements") {
                    walk(elements, out);
                }
            }
            _ => {}
        }
    }

    let mut out = String::new();
    walk(blocks, &mut out);
    out
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: RawUserProfile,
}

#[derive(Deserialize, Default)]
struct RawUserProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl RawUser {
    fn into_profile(self) -> UserProfile {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        UserProfile {
            id: self.id,
            name: self.name,
            real_name: non_empty(self.profile.real_name).or(non_empty(self.real_name)),
            display_name: non_empty(self.profile.display_name),
            email: non_empty(self.profile.email),
            is_bot: self.is_bot,
        }
    }
}

#[derive(Clone, Copy)]
enum CountsKind {
    Channel,
    Group,
    Mpim,
    Im,
}

#[derive(Deserialize)]
struct CountsEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    is_muted: bool,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    unread_count: u32,
    #[serde(default)]
    unread_count_display: Option<u32>,
    #[serde(default)]
    mention_count: u32,
    #[serde(default)]
    mention_count_display: Option<u32>,
    #[serde(default)]
    dm_count: Option<u32>,
}

impl CountsEntry {
    fn into_unread(self, kind: CountsKind) -> UnreadChannel {
        let unread_count = self
            .unread_count_display
            .or(self.dm_count)
            .unwrap_or(self.unread_count);
        UnreadChannel {
            id: self.id,
            name: self.name.or(self.user_id),
            unread_count,
            mention_count: self.mention_count_display.unwrap_or(self.mention_count),
            is_muted: self.is_muted,
            is_im: matches!(kind, CountsKind::Im),
            is_mpim: matches!(kind, CountsKind::Mpim),
            is_private: matches!(kind, CountsKind::Group | CountsKind::Mpim),
            is_archived: self.is_archived,
        }
    }
}

#[derive(Deserialize)]
struct RawDraft {
    id: String,
    #[serde(default)]
    date_created: i64,
    #[serde(default)]
    last_updated_ts: String,
    #[serde(default)]
    destinations: Vec<RawDestination>,
    #[serde(default)]
    blocks: Value,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    is_sent: bool,
}

#[derive(Deserialize)]
struct RawDestination {
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

impl RawDraft {
    fn into_draft(self) -> Draft {
        let destination = self.destinations.into_iter().next();
        Draft {
            text: blocks_text(&self.blocks),
            id: self.id,
            channel_id: destination.as_ref().and_then(|d| d.channel_id.clone()),
            thread_ts: destination.and_then(|d| d.thread_ts),
            last_updated_ts: self.last_updated_ts,
            date_created: self.date_created,
        }
    }
}
