//! Turns a raw batch of messages into a display-ready one.
//!
//! Each pass consumes the batch and hands back the enriched copy. Remote
//! failures are isolated to the message they belong to and counted in the
//! [`EnrichReport`]; they never abort the batch.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::slack::{HistoryRange, Message, SlackApi, UserProfile};
use crate::utils::formatting::mentioned_user_ids;

pub mod vtt;

pub use self::vtt::vtt_to_text;

#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichOptions {
    pub threads: bool,
    pub transcripts: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub threads_expanded: usize,
    pub thread_failures: usize,
    pub transcripts_attached: usize,
    pub transcript_failures: usize,
    pub users_resolved: usize,
}

impl EnrichReport {
    pub fn failures(&self) -> usize {
        self.thread_failures + self.transcript_failures
    }
}

/// Command-scoped user cache. An id is looked up at most once per
/// directory, whether or not the lookup succeeded.
#[derive(Debug, Default)]
pub struct UserDirectory {
    profiles: HashMap<String, UserProfile>,
    attempted: HashSet<String>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every not-yet-attempted id with one batch lookup and
    /// returns how many new profiles arrived.
    pub async fn resolve<A, I>(&mut self, api: &A, ids: I) -> usize
    where
        A: SlackApi + ?Sized,
        I: IntoIterator<Item = String>,
    {
        let missing: Vec<String> = ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && !self.attempted.contains(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if missing.is_empty() {
            return 0;
        }

        self.attempted.extend(missing.iter().cloned());
        match api.lookup_users(&missing).await {
            Ok(profiles) => {
                let resolved = profiles.len();
                debug!("resolved {}/{} slack users", resolved, missing.len());
                for profile in profiles {
                    self.profiles.insert(profile.id.clone(), profile);
                }
                resolved
            }
            Err(err) => {
                warn!("failed to resolve {} slack users: {}", missing.len(), err);
                0
            }
        }
    }

    pub fn insert(&mut self, profile: UserProfile) {
        self.attempted.insert(profile.id.clone());
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn get(&self, user_id: &str) -> Option<&UserProfile> {
        self.profiles.get(user_id)
    }

    /// Display label for an id, falling back to the raw id.
    pub fn label(&self, user_id: &str) -> String {
        self.get(user_id)
            .map(|profile| profile.label().to_string())
            .unwrap_or_else(|| user_id.to_string())
    }

    pub fn profiles(&self) -> &HashMap<String, UserProfile> {
        &self.profiles
    }
}

pub struct EnrichedBatch {
    pub messages: Vec<Message>,
    pub users: UserDirectory,
    pub report: EnrichReport,
}

pub struct Enricher<'a, A: ?Sized> {
    api: &'a A,
    users: UserDirectory,
    report: EnrichReport,
}

impl<'a, A> Enricher<'a, A>
where
    A: SlackApi + ?Sized,
{
    pub fn new(api: &'a A) -> Self {
        Self::with_users(api, UserDirectory::new())
    }

    pub fn with_users(api: &'a A, users: UserDirectory) -> Self {
        Self {
            api,
            users,
            report: EnrichReport::default(),
        }
    }

    /// Runs the requested passes. Users are resolved last so reply authors
    /// are covered.
    pub async fn enrich(
        mut self,
        channel_id: &str,
        messages: Vec<Message>,
        options: EnrichOptions,
    ) -> EnrichedBatch {
        let mut messages = messages;
        if options.threads {
            messages = self.expand_threads(channel_id, messages).await;
        }
        if options.transcripts {
            messages = self.attach_transcripts(messages).await;
        }
        self.resolve_users(&messages).await;

        EnrichedBatch {
            messages,
            users: self.users,
            report: self.report,
        }
    }

    pub async fn expand_threads(&mut self, channel_id: &str, messages: Vec<Message>) -> Vec<Message> {
        let mut enriched = Vec::with_capacity(messages.len());
        for mut message in messages {
            if message.reply_count > 0 {
                match self
                    .api
                    .thread_replies(channel_id, &message.ts, &HistoryRange::default())
                    .await
                {
                    Ok(replies) => {
                        message.thread_replies = replies.into_iter().skip(1).collect();
                        self.report.threads_expanded += 1;
                    }
                    Err(err) => {
                        warn!(
                            "failed to fetch replies for {} in {}: {}",
                            message.ts, channel_id, err
                        );
                        self.report.thread_failures += 1;
                    }
                }
            }
            enriched.push(message);
        }
        enriched
    }

    pub async fn attach_transcripts(&mut self, messages: Vec<Message>) -> Vec<Message> {
        let mut enriched = Vec::with_capacity(messages.len());
        for mut message in messages {
            let mut transcripts = Vec::new();
            for file in &message.files {
                let Some(url) = file.transcript_url() else {
                    continue;
                };
                match self.api.fetch_text(url).await {
                    Ok(body) => {
                        let text = vtt_to_text(&body);
                        if !text.is_empty() {
                            transcripts.push(text);
                        }
                    }
                    Err(err) => {
                        warn!("failed to fetch transcript for file {}: {}", file.id, err);
                        self.report.transcript_failures += 1;
                    }
                }
            }
            if !transcripts.is_empty() {
                message.transcript = Some(transcripts.join("\n\n"));
                self.report.transcripts_attached += 1;
            }
            enriched.push(message);
        }
        enriched
    }

    pub async fn resolve_users(&mut self, messages: &[Message]) -> usize {
        let resolved = self
            .users
            .resolve(self.api, collect_user_ids(messages))
            .await;
        self.report.users_resolved += resolved;
        resolved
    }
}

/// Authors and mentioned users across a batch, replies included.
pub fn collect_user_ids(messages: &[Message]) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for message in messages {
        if let Some(user) = message.author() {
            ids.insert(user.to_string());
        }
        ids.extend(mentioned_user_ids(&message.text));
        ids.extend(collect_user_ids(&message.thread_replies));
    }
    ids
}
