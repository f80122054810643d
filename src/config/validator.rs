use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no Slack token configured")]
    MissingToken,
}

impl ConfigError {
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::MissingToken => Some(
                "set SLACK_TOKEN, pass --token, or add auth.token to the config file".to_string(),
            ),
            Self::Io { path, .. } => Some(format!("check that {} is readable", path.display())),
            _ => None,
        }
    }
}
