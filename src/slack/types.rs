use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<SlackFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thread_replies: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl Message {
    /// Author id, ignoring the empty strings some bot payloads carry.
    pub fn author(&self) -> Option<&str> {
        self.user.as_deref().filter(|user| !user.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackFile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub filetype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_private: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_private_download: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vtt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl SlackFile {
    pub fn is_tombstone(&self) -> bool {
        self.mode.as_deref() == Some("tombstone")
    }

    pub fn download_url(&self) -> Option<&str> {
        fn usable(url: &Option<String>) -> Option<&str> {
            url.as_deref().filter(|url| !url.trim().is_empty())
        }
        usable(&self.url_private_download).or_else(|| usable(&self.url_private))
    }

    /// The caption track, only once the remote transcription has finished.
    pub fn transcript_url(&self) -> Option<&str> {
        let complete = self
            .transcription
            .as_ref()
            .and_then(|t| t.status.as_deref())
            == Some("complete");
        if !complete {
            return None;
        }
        self.vtt.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Channel,
    Private,
    Im,
    Mpim,
}

impl ConversationKind {
    fn from_flags(is_im: bool, is_mpim: bool, is_private: bool) -> Self {
        if is_im {
            Self::Im
        } else if is_mpim {
            Self::Mpim
        } else if is_private {
            Self::Private
        } else {
            Self::Channel
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Private => "private",
            Self::Im => "im",
            Self::Mpim => "mpim",
        }
    }

    /// The `types` value `conversations.list` filters on.
    pub fn list_type(self) -> &'static str {
        match self {
            Self::Channel => "public_channel",
            Self::Private => "private_channel",
            Self::Im => "im",
            Self::Mpim => "mpim",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_mpim: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_members: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub value: String,
}

impl Conversation {
    pub fn kind(&self) -> ConversationKind {
        ConversationKind::from_flags(self.is_im, self.is_mpim, self.is_private)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnreadChannel {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub unread_count: u32,
    pub mention_count: u32,
    pub is_muted: bool,
    pub is_im: bool,
    pub is_mpim: bool,
    pub is_private: bool,
    pub is_archived: bool,
}

impl UnreadChannel {
    pub fn kind(&self) -> ConversationKind {
        ConversationKind::from_flags(self.is_im, self.is_mpim, self.is_private)
    }

    /// Matches a user-supplied target by id or by name, `#` prefix optional.
    pub fn matches(&self, target: &str) -> bool {
        let target = target.trim();
        if self.id == target {
            return true;
        }
        let wanted = target.trim_start_matches('#');
        self.name.as_deref().is_some_and(|name| name == wanted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub channel_id: String,
    pub post_at: i64,
    #[serde(default)]
    pub date_created: i64,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl UserProfile {
    pub fn label(&self) -> &str {
        [self.display_name.as_deref(), self.real_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .or_else(|| Some(self.name.trim()).filter(|value| !value.is_empty()))
            .unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Draft {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub text: String,
    pub last_updated_ts: String,
    pub date_created: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileListing {
    pub files: Vec<SlackFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

/// Raw bytes of a downloaded file together with the served content type.
#[derive(Debug, Clone, Default)]
pub struct FilePayload {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConversationQuery {
    pub types: Vec<String>,
    pub limit: usize,
    pub exclude_archived: bool,
}

impl Default for ConversationQuery {
    fn default() -> Self {
        Self {
            types: vec![
                "public_channel".to_string(),
                "private_channel".to_string(),
                "mpim".to_string(),
                "im".to_string(),
            ],
            limit: 1000,
            exclude_archived: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryRange {
    pub limit: Option<u32>,
    pub oldest: Option<String>,
    pub latest: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FileQuery {
    pub channel: Option<String>,
    pub user: Option<String>,
    pub types: Option<String>,
    pub count: Option<u32>,
    pub page: Option<u32>,
}

/// Splits a `seconds.micros` timestamp into an integer pair.
///
/// The fraction is right-padded to six digits so `"1.5"` and `"1.500000"`
/// compare equal. Returns `None` for anything that is not a timestamp.
pub fn parse_ts(ts: &str) -> Option<(u64, u32)> {
    let ts = ts.trim();
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));
    if secs.is_empty() || frac.len() > 6 {
        return None;
    }
    if !secs.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs = secs.parse().ok()?;
    let micros = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<6}").parse().ok()?
    };
    Some((secs, micros))
}

pub fn compare_ts(a: &str, b: &str) -> Ordering {
    match (parse_ts(a), parse_ts(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}
