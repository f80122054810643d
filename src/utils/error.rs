use thiserror::Error;

use crate::config::ConfigError;
use crate::schedule::ScheduleError;
use crate::slack::SlackError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Slack(#[from] SlackError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Slack(err) => err.hint(),
            Self::Config(err) => err.hint(),
            Self::Schedule(err) => err.hint(),
            Self::NotFound(_) => {
                Some("run `slack-cli conversations list` to see available conversations".to_string())
            }
            _ => None,
        }
    }
}

/// First remediation hint found anywhere in an error chain.
pub fn hint_for(err: &anyhow::Error) -> Option<String> {
    err.chain().find_map(|cause| {
        if let Some(app) = cause.downcast_ref::<AppError>() {
            app.hint()
        } else if let Some(slack) = cause.downcast_ref::<SlackError>() {
            slack.hint()
        } else if let Some(config) = cause.downcast_ref::<ConfigError>() {
            config.hint()
        } else {
            None
        }
    })
}
