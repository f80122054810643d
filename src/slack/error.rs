use thiserror::Error;

const AUTH_ERROR_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "token_revoked",
    "token_expired",
    "account_inactive",
];

#[derive(Error, Debug)]
pub enum SlackError {
    #[error("Slack rejected the token for {method}: {code}")]
    Auth { method: String, code: String },

    #[error("Slack API {method} is rate limited")]
    RateLimited {
        method: String,
        retry_after: Option<u64>,
    },

    #[error("Slack API {method} returned ok=false: {code}")]
    Api { method: String, code: String },

    #[error("request to {target} failed: {message}")]
    Transport { target: String, message: String },

    #[error("Slack API {method} returned an unexpected payload: {detail}")]
    Malformed { method: String, detail: String },
}

impl SlackError {
    /// Classifies an `ok=false` error code.
    pub fn from_code(method: &str, code: &str) -> Self {
        if AUTH_ERROR_CODES.contains(&code) {
            Self::Auth {
                method: method.to_string(),
                code: code.to_string(),
            }
        } else if code == "ratelimited" {
            Self::RateLimited {
                method: method.to_string(),
                retry_after: None,
            }
        } else {
            Self::Api {
                method: method.to_string(),
                code: code.to_string(),
            }
        }
    }

    pub fn transport(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            target: target.into(),
            message: err.to_string(),
        }
    }

    pub fn malformed(method: &str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            method: method.to_string(),
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Auth { code, .. } | Self::Api { code, .. } => Some(code),
            Self::RateLimited { .. } => Some("ratelimited"),
            _ => None,
        }
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Auth { .. } => Some(
                "check that SLACK_TOKEN (or auth.token in the config file) holds a valid user token"
                    .to_string(),
            ),
            Self::RateLimited {
                retry_after: Some(secs),
                ..
            } => Some(format!("wait {secs} seconds before retrying")),
            Self::RateLimited { .. } => Some("wait a moment before retrying".to_string()),
            Self::Api { code, .. } if code == "missing_scope" => {
                Some("the token is missing an OAuth scope required by this command".to_string())
            }
            Self::Api { code, .. } if code == "channel_not_found" => {
                Some("check the channel id, or that the token's user is a member".to_string())
            }
            _ => None,
        }
    }
}
