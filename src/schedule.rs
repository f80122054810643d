use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;

/// Slack refuses to schedule further ahead than this.
pub const MAX_SCHEDULE_AHEAD_DAYS: i64 = 120;

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid date format: {0:?}")]
    InvalidFormat(String),

    #[error("scheduled time {post_at} is not in the future (now is {now})")]
    NotInFuture { post_at: i64, now: i64 },

    #[error("scheduled time {post_at} is more than 120 days ahead (latest allowed is {latest})")]
    TooFarAhead { post_at: i64, latest: i64 },
}

impl ScheduleError {
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::InvalidFormat(_) => Some(
                "use unix seconds, RFC 3339, \"YYYY-MM-DD HH:MM\" (local time), or a relative \
                 offset like \"+30m\" / \"in 2h\""
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// Resolves a user-supplied time to unix seconds and checks the allowed
/// window.
pub fn resolve_post_at(input: &str, now: DateTime<Utc>) -> Result<i64, ScheduleError> {
    let post_at = parse_post_at(input, now)?;
    validate_post_at(post_at, now.timestamp())?;
    Ok(post_at)
}

pub fn parse_post_at(input: &str, now: DateTime<Utc>) -> Result<i64, ScheduleError> {
    let trimmed = input.trim();
    let invalid = || ScheduleError::InvalidFormat(trimmed.to_string());
    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Some(offset) = trimmed
        .strip_prefix('+')
        .or_else(|| trimmed.strip_prefix("in "))
    {
        let offset = parse_offset(offset.trim()).ok_or_else(invalid)?;
        return now
            .checked_add_signed(offset)
            .map(|post_at| post_at.timestamp())
            .ok_or_else(|| ScheduleError::TooFarAhead {
                post_at: i64::MAX,
                latest: latest_allowed(now.timestamp()),
            });
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse().map_err(|_| invalid());
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.timestamp());
    }

    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.timestamp())
                .ok_or_else(invalid);
        }
    }

    Err(invalid())
}

/// `post_at` must lie in `(now, now + 120 days]`.
pub fn validate_post_at(post_at: i64, now: i64) -> Result<(), ScheduleError> {
    if post_at <= now {
        return Err(ScheduleError::NotInFuture { post_at, now });
    }
    let latest = latest_allowed(now);
    if post_at > latest {
        return Err(ScheduleError::TooFarAhead { post_at, latest });
    }
    Ok(())
}

fn latest_allowed(now: i64) -> i64 {
    now.saturating_add(MAX_SCHEDULE_AHEAD_DAYS * 86_400)
}

fn parse_offset(value: &str) -> Option<TimeDelta> {
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = value.split_at(split);
    let amount: i64 = amount.parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit.trim() {
        "s" | "sec" | "secs" | "second" | "seconds" => TimeDelta::try_seconds(amount),
        "m" | "min" | "mins" | "minute" | "minutes" => TimeDelta::try_minutes(amount),
        "h" | "hr" | "hrs" | "hour" | "hours" => TimeDelta::try_hours(amount),
        "d" | "day" | "days" => TimeDelta::try_days(amount),
        _ => None,
    }
}
