//! In-memory `SlackApi` used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    Conversation, ConversationQuery, Draft, FileListing, FilePayload, FileQuery, HistoryRange,
    Message, ScheduledMessage, SlackApi, SlackError, SlackFile, SlackResult, UnreadChannel,
    UserProfile, compare_ts,
};

#[derive(Default)]
pub struct FakeSlack {
    pub conversations: Vec<Conversation>,
    pub history: HashMap<String, Vec<Message>>,
    pub replies: HashMap<(String, String), Vec<Message>>,
    pub failing_threads: HashSet<String>,
    pub unread: Vec<UnreadChannel>,
    pub last_read: HashMap<String, String>,
    pub failing_channels: HashSet<String>,
    pub failing_marks: HashSet<String>,
    pub users: HashMap<String, UserProfile>,
    pub files: Vec<SlackFile>,
    pub payloads: HashMap<String, FilePayload>,
    pub texts: HashMap<String, String>,
    pub drafts: Vec<Draft>,
    /// Echoes every history/replies `oldest` bound back as an extra message,
    /// like an inclusive range query would.
    pub inclusive_oldest: bool,
    pub calls: Mutex<Vec<String>>,
    pub user_batches: Mutex<Vec<Vec<String>>>,
    pub marked: Mutex<Vec<(String, String)>>,
    pub posted: Mutex<Vec<(String, String, Option<String>)>>,
    pub scheduled: Mutex<Vec<ScheduledMessage>>,
    pub deleted_drafts: Mutex<Vec<String>>,
}

pub fn message(ts: &str, user: &str, text: &str) -> Message {
    Message {
        ts: ts.to_string(),
        user: Some(user.to_string()),
        text: text.to_string(),
        ..Default::default()
    }
}

pub fn profile(id: &str, name: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn unread(id: &str, name: &str, unread_count: u32, is_muted: bool) -> UnreadChannel {
    UnreadChannel {
        id: id.to_string(),
        name: Some(name.to_string()),
        unread_count,
        is_muted,
        ..Default::default()
    }
}

fn api_error(method: &str, code: &str) -> SlackError {
    SlackError::Api {
        method: method.to_string(),
        code: code.to_string(),
    }
}

impl FakeSlack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn marked(&self) -> Vec<(String, String)> {
        self.marked.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn open_direct_conversation(&self, user_id: &str) -> SlackResult<String> {
        self.record(format!("conversations.open:{user_id}"));
        if !self.users.contains_key(user_id) {
            return Err(api_error("conversations.open", "user_not_found"));
        }
        Ok(format!("D{user_id}"))
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> SlackResult<String> {
        self.record(format!("chat.postMessage:{channel_id}"));
        let mut posted = self.posted.lock().unwrap();
        posted.push((
            channel_id.to_string(),
            text.to_string(),
            thread_ts.map(ToOwned::to_owned),
        ));
        Ok(format!("1700000000.{:06}", posted.len()))
    }

    async fn schedule_message(
        &self,
        channel_id: &str,
        text: &str,
        post_at: i64,
        _thread_ts: Option<&str>,
    ) -> SlackResult<String> {
        self.record(format!("chat.scheduleMessage:{channel_id}"));
        let mut scheduled = self.scheduled.lock().unwrap();
        let id = format!("Q{}", scheduled.len() + 1);
        scheduled.push(ScheduledMessage {
            id: id.clone(),
            channel_id: channel_id.to_string(),
            post_at,
            date_created: 0,
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn list_scheduled_messages(
        &self,
        channel_id: Option<&str>,
        limit: u32,
    ) -> SlackResult<Vec<ScheduledMessage>> {
        self.record("chat.scheduledMessages.list");
        Ok(self
            .scheduled
            .lock()
            .unwrap()
            .iter()
            .filter(|m| channel_id.is_none_or(|c| m.channel_id == c))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_scheduled_message(
        &self,
        channel_id: &str,
        scheduled_message_id: &str,
    ) -> SlackResult<()> {
        self.record(format!("chat.deleteScheduledMessage:{channel_id}"));
        let mut scheduled = self.scheduled.lock().unwrap();
        let before = scheduled.len();
        scheduled.retain(|m| !(m.id == scheduled_message_id && m.channel_id == channel_id));
        if scheduled.len() == before {
            return Err(api_error("chat.deleteScheduledMessage", "invalid_scheduled_message_id"));
        }
        Ok(())
    }

    async fn list_conversations(
        &self,
        query: &ConversationQuery,
    ) -> SlackResult<Vec<Conversation>> {
        self.record("conversations.list");
        Ok(self
            .conversations
            .iter()
            .filter(|c| !(query.exclude_archived && c.is_archived))
            .filter(|c| query.types.iter().any(|t| t == c.kind().list_type()))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn conversation_history(
        &self,
        channel_id: &str,
        range: &HistoryRange,
    ) -> SlackResult<Vec<Message>> {
        self.record(format!("conversations.history:{channel_id}"));
        if self.failing_channels.contains(channel_id) {
            return Err(api_error("conversations.history", "channel_not_found"));
        }
        let mut messages: Vec<Message> = self
            .history
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|m| {
                range.oldest.as_deref().is_none_or(|oldest| {
                    let ord = compare_ts(&m.ts, oldest);
                    ord.is_gt() || (self.inclusive_oldest && ord.is_eq())
                })
            })
            .collect();
        messages.sort_by(|a, b| compare_ts(&b.ts, &a.ts));
        if let Some(limit) = range.limit {
            messages.truncate(limit as usize);
        }
        Ok(messages)
    }

    async fn thread_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        _range: &HistoryRange,
    ) -> SlackResult<Vec<Message>> {
        self.record(format!("conversations.replies:{channel_id}:{thread_ts}"));
        if self.failing_threads.contains(thread_ts) {
            return Err(api_error("conversations.replies", "thread_not_found"));
        }
        Ok(self
            .replies
            .get(&(channel_id.to_string(), thread_ts.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn unread_counters(&self) -> SlackResult<Vec<UnreadChannel>> {
        self.record("users.counts");
        Ok(self.unread.clone())
    }

    async fn last_read(&self, channel_id: &str) -> SlackResult<Option<String>> {
        self.record(format!("conversations.info:{channel_id}"));
        Ok(self.last_read.get(channel_id).cloned())
    }

    async fn mark_read(&self, channel_id: &str, ts: &str) -> SlackResult<()> {
        self.record(format!("conversations.mark:{channel_id}"));
        if self.failing_marks.contains(channel_id) {
            return Err(api_error("conversations.mark", "not_in_channel"));
        }
        self.marked
            .lock()
            .unwrap()
            .push((channel_id.to_string(), ts.to_string()));
        Ok(())
    }

    async fn list_files(&self, query: &FileQuery) -> SlackResult<FileListing> {
        self.record("files.list");
        let files: Vec<SlackFile> = self
            .files
            .iter()
            .take(query.count.map(|c| c as usize).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(FileListing { files, paging: None })
    }

    async fn file_info(&self, file_id: &str) -> SlackResult<SlackFile> {
        self.record(format!("files.info:{file_id}"));
        self.files
            .iter()
            .find(|f| f.id == file_id)
            .cloned()
            .ok_or_else(|| api_error("files.info", "file_not_found"))
    }

    async fn fetch_text(&self, url: &str) -> SlackResult<String> {
        self.record(format!("GET {url}"));
        self.texts
            .get(url)
            .cloned()
            .ok_or_else(|| SlackError::transport(url, "status 404 Not Found"))
    }

    async fn fetch_bytes(&self, url: &str) -> SlackResult<FilePayload> {
        self.record(format!("GET {url}"));
        self.payloads
            .get(url)
            .cloned()
            .ok_or_else(|| SlackError::transport(url, "status 404 Not Found"))
    }

    async fn lookup_users(&self, user_ids: &[String]) -> SlackResult<Vec<UserProfile>> {
        self.record("users.info*");
        self.user_batches.lock().unwrap().push(user_ids.to_vec());
        Ok(user_ids
            .iter()
            .filter_map(|id| self.users.get(id).cloned())
            .collect())
    }

    async fn lookup_user(&self, user_id: &str) -> SlackResult<UserProfile> {
        self.record(format!("users.info:{user_id}"));
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| api_error("users.info", "user_not_found"))
    }

    async fn list_drafts(&self) -> SlackResult<Vec<Draft>> {
        self.record("drafts.list");
        let deleted = self.deleted_drafts.lock().unwrap();
        Ok(self
            .drafts
            .iter()
            .filter(|d| !deleted.contains(&d.id))
            .cloned()
            .collect())
    }

    async fn create_draft(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> SlackResult<Draft> {
        self.record(format!("drafts.create:{channel_id}"));
        Ok(Draft {
            id: "Dr-new".to_string(),
            channel_id: Some(channel_id.to_string()),
            thread_ts: thread_ts.map(ToOwned::to_owned),
            text: text.to_string(),
            last_updated_ts: "1700000000.000001".to_string(),
            date_created: 1_700_000_000,
        })
    }

    async fn delete_draft(&self, draft: &Draft) -> SlackResult<()> {
        self.record(format!("drafts.delete:{}", draft.id));
        self.deleted_drafts.lock().unwrap().push(draft.id.clone());
        Ok(())
    }
}
