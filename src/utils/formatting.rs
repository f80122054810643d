use chrono::{DateTime, Local, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::slack::types::parse_ts;

static USER_MENTION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@([A-Z0-9]+)(?:\|([^>]+))?>").expect("valid user mention regex"));
static CHANNEL_MENTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<#([A-Z0-9]+)\|([^>]*)>").expect("valid channel mention regex")
});
static LINK_WITH_LABEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<((?:https?|mailto):[^>|]+)\|([^>]+)>").expect("valid labeled link regex")
});
static RAW_LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<((?:https?|mailto):[^>]+)>").expect("valid raw link regex"));

/// User ids referenced by `<@U…>` mentions, in order of appearance.
pub fn mentioned_user_ids(text: &str) -> Vec<String> {
    USER_MENTION_REGEX
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Turns Slack mrkdwn escapes and references into plain terminal text.
/// `resolve_user` maps a user id to a display label when one is known.
pub fn normalize_slack_text<F>(input: &str, resolve_user: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut text = USER_MENTION_REGEX
        .replace_all(input, |caps: &regex::Captures| {
            let id = &caps[1];
            let label = resolve_user(id)
                .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
                .unwrap_or_else(|| id.to_string());
            format!("@{label}")
        })
        .to_string();
    text = CHANNEL_MENTION_REGEX
        .replace_all(&text, |caps: &regex::Captures| {
            if caps[2].is_empty() {
                format!("#{}", &caps[1])
            } else {
                format!("#{}", &caps[2])
            }
        })
        .to_string();
    text = text
        .replace("<!channel>", "@channel")
        .replace("<!here>", "@here")
        .replace("<!everyone>", "@everyone");
    text = LINK_WITH_LABEL_REGEX
        .replace_all(&text, |caps: &regex::Captures| {
            format!("{} ({})", &caps[2], &caps[1])
        })
        .to_string();
    text = RAW_LINK_REGEX
        .replace_all(&text, |caps: &regex::Captures| caps[1].to_string())
        .to_string();

    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Message timestamp rendered in local time, or the raw value if unparsable.
pub fn format_ts(ts: &str) -> String {
    parse_ts(ts)
        .and_then(|(secs, _)| i64::try_from(secs).ok())
        .map(format_unix)
        .unwrap_or_else(|| ts.to_string())
}

pub fn format_unix(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(utc) => {
            let local: DateTime<Local> = utc.with_timezone(&Local);
            local.format("%Y-%m-%d %H:%M").to_string()
        }
        None => secs.to_string(),
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mentions_links_and_escapes() {
        let text = "hi <@U1> and <@U2|bob> in <#C1|general>: <https://a.io|docs> &amp; <!here>";
        let out = normalize_slack_text(text, |id| (id == "U1").then(|| "alice".to_string()));
        assert_eq!(out, "hi @alice and @bob in #general: docs (https://a.io) & @here");
    }

    #[test]
    fn escaped_angle_brackets_survive_as_literals() {
        let out = normalize_slack_text("a &lt;b&gt; c", |_| None);
        assert_eq!(out, "a <b> c");
    }

    #[test]
    fn collects_mentioned_ids() {
        assert_eq!(
            mentioned_user_ids("<@U1> <@W2|x> <#C3|c>"),
            vec!["U1".to_string(), "W2".to_string()]
        );
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn unparsable_ts_is_returned_verbatim() {
        assert_eq!(format_ts("not-a-ts"), "not-a-ts");
    }
}
