//! Unread reconciliation: which conversations have unread messages, what
//! those messages are, and optionally marking them read.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::enrich::{UserDirectory, collect_user_ids};
use crate::slack::{HistoryRange, Message, SlackApi, SlackResult, UnreadChannel, compare_ts};
use crate::utils::AppError;

#[derive(Debug, Clone, Default)]
pub struct UnreadOptions {
    pub target: Option<String>,
    pub include_muted: bool,
    pub with_messages: bool,
    pub message_limit: u32,
    pub mark_read: bool,
}

/// Outcome of filtering the unread counters.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Empty,
    TargetCaughtUp(UnreadChannel),
    Channels(Vec<UnreadChannel>),
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadSummary {
    pub channels: Vec<UnreadChannel>,
    pub total_unread: u64,
    pub total_mentions: u64,
}

impl UnreadSummary {
    pub fn from_channels(channels: Vec<UnreadChannel>) -> Self {
        let total_unread = channels.iter().map(|c| u64::from(c.unread_count)).sum();
        let total_mentions = channels.iter().map(|c| u64::from(c.mention_count)).sum();
        Self {
            channels,
            total_unread,
            total_mentions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadSection {
    pub channel: UnreadChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read: Option<String>,
    /// Oldest first, all strictly newer than `last_read`.
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelFailure {
    pub channel_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedChannel {
    pub channel_id: String,
    pub ts: String,
}

pub struct UnreadMessages {
    pub sections: Vec<UnreadSection>,
    pub failures: Vec<ChannelFailure>,
    pub marked: Vec<MarkedChannel>,
    pub mark_failures: Vec<ChannelFailure>,
    pub users: UserDirectory,
}

pub enum UnreadReport {
    /// Nothing passed the unread filters.
    NothingUnread,
    /// The named conversation exists but has nothing unread.
    TargetCaughtUp(UnreadChannel),
    Summary(UnreadSummary),
    /// Conversations were selected but no message survived the last-read
    /// filter.
    AllCaughtUp,
    Messages(UnreadMessages),
}

impl UnreadReport {
    pub fn failure_count(&self) -> usize {
        match self {
            Self::Messages(report) => report.failures.len() + report.mark_failures.len(),
            _ => 0,
        }
    }
}

/// Applies the target, unread and muted filters, then orders by unread
/// count, highest first. Ties keep the order the counters arrived in.
pub fn select_unread(
    counters: Vec<UnreadChannel>,
    target: Option<&str>,
    include_muted: bool,
) -> Result<Selection, AppError> {
    if let Some(target) = target {
        let channel = counters
            .into_iter()
            .find(|channel| channel.matches(target))
            .ok_or_else(|| AppError::not_found(format!("conversation {target} not found")))?;
        if channel.unread_count == 0 {
            return Ok(Selection::TargetCaughtUp(channel));
        }
        return Ok(Selection::Channels(vec![channel]));
    }

    let mut channels: Vec<UnreadChannel> = counters
        .into_iter()
        .filter(|channel| channel.unread_count > 0)
        .filter(|channel| include_muted || !channel.is_muted)
        .collect();
    if channels.is_empty() {
        return Ok(Selection::Empty);
    }
    channels.sort_by(|a, b| b.unread_count.cmp(&a.unread_count));
    Ok(Selection::Channels(channels))
}

/// Keeps messages strictly newer than `last_read`, oldest first. The
/// history `oldest` bound is inclusive on some endpoints, so the boundary
/// message is dropped here.
pub fn strictly_after(messages: Vec<Message>, last_read: Option<&str>) -> Vec<Message> {
    let mut retained: Vec<Message> = messages
        .into_iter()
        .filter(|message| {
            last_read.is_none_or(|last_read| compare_ts(&message.ts, last_read) == Ordering::Greater)
        })
        .collect();
    retained.sort_by(|a, b| compare_ts(&a.ts, &b.ts));
    retained
}

pub async fn reconcile<A>(api: &A, options: &UnreadOptions) -> anyhow::Result<UnreadReport>
where
    A: SlackApi + ?Sized,
{
    let counters = api.unread_counters().await?;
    debug!("fetched unread counters for {} conversations", counters.len());

    let channels = match select_unread(counters, options.target.as_deref(), options.include_muted)? {
        Selection::Empty => return Ok(UnreadReport::NothingUnread),
        Selection::TargetCaughtUp(channel) => return Ok(UnreadReport::TargetCaughtUp(channel)),
        Selection::Channels(channels) => channels,
    };

    if !options.with_messages {
        return Ok(UnreadReport::Summary(UnreadSummary::from_channels(channels)));
    }

    let mut sections = Vec::new();
    let mut failures = Vec::new();
    for channel in channels {
        match fetch_section(api, channel.clone(), options.message_limit).await {
            Ok(section) if section.messages.is_empty() => {
                debug!("no messages after last read in {}", section.channel.id);
            }
            Ok(section) => sections.push(section),
            Err(err) => {
                warn!("failed to fetch unread messages for {}: {}", channel.id, err);
                failures.push(ChannelFailure {
                    channel_id: channel.id,
                    error: err.to_string(),
                });
            }
        }
    }

    if sections.is_empty() && failures.is_empty() {
        return Ok(UnreadReport::AllCaughtUp);
    }

    let mut marked = Vec::new();
    let mut mark_failures = Vec::new();
    if options.mark_read {
        for section in &sections {
            let Some(ts) = section.latest_ts.as_deref() else {
                continue;
            };
            match api.mark_read(&section.channel.id, ts).await {
                Ok(()) => {
                    info!("marked {} read up to {}", section.channel.id, ts);
                    marked.push(MarkedChannel {
                        channel_id: section.channel.id.clone(),
                        ts: ts.to_string(),
                    });
                }
                Err(err) => {
                    warn!("failed to mark {} read: {}", section.channel.id, err);
                    mark_failures.push(ChannelFailure {
                        channel_id: section.channel.id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    let mut users = UserDirectory::new();
    let all_messages: Vec<Message> = sections
        .iter()
        .flat_map(|section| section.messages.iter().cloned())
        .collect();
    users.resolve(api, collect_user_ids(&all_messages)).await;

    Ok(UnreadReport::Messages(UnreadMessages {
        sections,
        failures,
        marked,
        mark_failures,
        users,
    }))
}

async fn fetch_section<A>(api: &A, channel: UnreadChannel, limit: u32) -> SlackResult<UnreadSection>
where
    A: SlackApi + ?Sized,
{
    let last_read = api.last_read(&channel.id).await?;
    let range = HistoryRange {
        limit: Some(limit),
        oldest: last_read.clone(),
        latest: None,
    };
    let history = api.conversation_history(&channel.id, &range).await?;
    let messages = strictly_after(history, last_read.as_deref());
    let latest_ts = messages.last().map(|message| message.ts.clone());

    Ok(UnreadSection {
        channel,
        last_read,
        messages,
        latest_ts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slack::fake::{FakeSlack, message, profile, unread};

    fn options(with_messages: bool, mark_read: bool) -> UnreadOptions {
        UnreadOptions {
            target: None,
            include_muted: false,
            with_messages,
            message_limit: 100,
            mark_read,
        }
    }

    fn ids(selection: &Selection) -> Vec<&str> {
        match selection {
            Selection::Channels(channels) => channels.iter().map(|c| c.id.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn muted_channels_need_opt_in() {
        let counters = vec![unread("A", "alpha", 5, false), unread("B", "beta", 2, true)];

        let default = select_unread(counters.clone(), None, false).unwrap();
        assert_eq!(ids(&default), vec!["A"]);

        let with_muted = select_unread(counters, None, true).unwrap();
        assert_eq!(ids(&with_muted), vec!["A", "B"]);
    }

    #[test]
    fn sorts_by_unread_count_keeping_ties_stable() {
        let counters = vec![
            unread("A", "a", 1, false),
            unread("B", "b", 7, false),
            unread("C", "c", 3, false),
            unread("D", "d", 3, false),
            unread("E", "e", 0, false),
        ];
        let selection = select_unread(counters, None, false).unwrap();
        assert_eq!(ids(&selection), vec!["B", "C", "D", "A"]);
    }

    #[test]
    fn explicit_target_outcomes() {
        let counters = vec![
            unread("C1", "general", 0, false),
            unread("C2", "quiet", 4, true),
        ];

        assert_eq!(
            select_unread(counters.clone(), Some("#general"), false).unwrap(),
            Selection::TargetCaughtUp(counters[0].clone())
        );
        assert_eq!(
            ids(&select_unread(counters.clone(), Some("quiet"), false).unwrap()),
            vec!["C2"]
        );
        assert!(matches!(
            select_unread(counters, Some("missing"), false),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn empty_selection_is_not_an_error() {
        let counters = vec![unread("A", "a", 0, false), unread("B", "b", 3, true)];
        assert_eq!(select_unread(counters, None, false).unwrap(), Selection::Empty);
    }

    #[test]
    fn strictly_after_drops_boundary_and_orders_oldest_first() {
        let messages = vec![
            message("1700000000.000300", "U1", "c"),
            message("1700000000.000200", "U1", "b"),
            message("1700000000.000100", "U1", "a"),
        ];
        let kept = strictly_after(messages.clone(), Some("1700000000.000200"));
        let ts: Vec<&str> = kept.iter().map(|m| m.ts.as_str()).collect();
        assert_eq!(ts, vec!["1700000000.000300"]);

        let all = strictly_after(messages, None);
        assert_eq!(all.first().map(|m| m.ts.as_str()), Some("1700000000.000100"));
    }

    fn two_channel_fake() -> FakeSlack {
        let mut fake = FakeSlack::new();
        fake.inclusive_oldest = true;
        fake.unread = vec![unread("C1", "general", 2, false), unread("C2", "random", 1, false)];
        fake.last_read.insert("C1".to_string(), "100.000002".to_string());
        fake.last_read.insert("C2".to_string(), "50.000000".to_string());
        fake.history.insert(
            "C1".to_string(),
            vec![
                message("100.000001", "U1", "old"),
                message("100.000002", "U1", "last read"),
                message("100.000003", "U2", "new one"),
                message("100.000010", "U1", "new two"),
            ],
        );
        fake.history.insert(
            "C2".to_string(),
            vec![message("50.000000", "U1", "seen"), message("60.5", "U2", "fresh")],
        );
        fake.users.insert("U1".to_string(), profile("U1", "alice"));
        fake.users.insert("U2".to_string(), profile("U2", "bob"));
        fake
    }

    #[tokio::test]
    async fn summary_mode_aggregates_counts() {
        let mut fake = FakeSlack::new();
        let mut general = unread("C1", "general", 4, false);
        general.mention_count = 1;
        let mut random = unread("C2", "random", 6, false);
        random.mention_count = 2;
        fake.unread = vec![general, random];

        let report = reconcile(&fake, &options(false, false)).await.unwrap();
        let UnreadReport::Summary(summary) = report else {
            panic!("expected summary");
        };
        assert_eq!(summary.total_unread, 10);
        assert_eq!(summary.total_mentions, 3);
        assert_eq!(summary.channels[0].id, "C2");
        assert!(!fake.calls().iter().any(|c| c.starts_with("conversations.history")));
    }

    #[tokio::test]
    async fn never_shows_messages_at_or_before_last_read() {
        let fake = two_channel_fake();
        let report = reconcile(&fake, &options(true, false)).await.unwrap();
        let UnreadReport::Messages(report) = report else {
            panic!("expected messages");
        };

        for section in &report.sections {
            let last_read = section.last_read.as_deref().unwrap();
            assert!(
                section
                    .messages
                    .iter()
                    .all(|m| compare_ts(&m.ts, last_read) == Ordering::Greater)
            );
        }
        let general: Vec<&str> = report.sections[0]
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(general, vec!["new one", "new two"]);
        assert_eq!(report.users.label("U2"), "bob");
        assert!(fake.marked().is_empty());
    }

    #[tokio::test]
    async fn marks_each_channel_with_its_own_latest_ts() {
        let fake = two_channel_fake();
        let report = reconcile(&fake, &options(true, true)).await.unwrap();
        let UnreadReport::Messages(report) = report else {
            panic!("expected messages");
        };

        assert_eq!(
            fake.marked(),
            vec![
                ("C1".to_string(), "100.000010".to_string()),
                ("C2".to_string(), "60.5".to_string()),
            ]
        );
        assert_eq!(report.marked.len(), 2);
        assert!(report.mark_failures.is_empty());
    }

    #[tokio::test]
    async fn isolates_history_and_mark_failures() {
        let mut fake = two_channel_fake();
        fake.unread.push(unread("C3", "broken", 1, false));
        fake.failing_channels.insert("C3".to_string());
        fake.failing_marks.insert("C1".to_string());

        let report = reconcile(&fake, &options(true, true)).await.unwrap();
        assert_eq!(report.failure_count(), 2);
        let UnreadReport::Messages(report) = report else {
            panic!("expected messages");
        };
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.failures[0].channel_id, "C3");
        assert_eq!(report.mark_failures[0].channel_id, "C1");
        assert_eq!(fake.marked(), vec![("C2".to_string(), "60.5".to_string())]);
    }

    #[tokio::test]
    async fn all_caught_up_differs_from_nothing_unread() {
        let mut fake = FakeSlack::new();
        fake.inclusive_oldest = true;
        fake.unread = vec![unread("C1", "general", 1, false)];
        fake.last_read.insert("C1".to_string(), "10.000000".to_string());
        fake.history
            .insert("C1".to_string(), vec![message("10.000000", "U1", "seen")]);
        let report = reconcile(&fake, &options(true, true)).await.unwrap();
        assert!(matches!(report, UnreadReport::AllCaughtUp));
        assert!(fake.marked().is_empty());

        let empty = FakeSlack::new();
        let report = reconcile(&empty, &options(true, false)).await.unwrap();
        assert!(matches!(report, UnreadReport::NothingUnread));
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let fake = two_channel_fake();
        let mut opts = options(false, false);
        opts.target = Some("#nope".to_string());

        let err = reconcile(&fake, &opts).await.err().unwrap();
        assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::NotFound(_))));
    }
}
