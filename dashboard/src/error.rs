use std::path::PathBuf;

use envmon_common::ParseError;
use thiserror::Error;

/// Failure of one outbound call. `Display` is the text shown to the user.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("An error occurred {action}: {source}")]
    Transport {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{0}")]
    Upstream(String),
    #[error("Unexpected response {action}: {detail}")]
    Decode {
        action: &'static str,
        detail: String,
    },
    #[error("Invalid endpoint URL '{0}'")]
    BadEndpoint(String),
    #[error("Location not found: {0}")]
    UnknownLocation(String),
    #[error(transparent)]
    InvalidInput(#[from] ParseError),
    #[error("Please enter a question.")]
    EmptyQuestion,
    #[error("Profile spreadsheet is not configured")]
    ProfilesUnavailable,
}

impl ApiError {
    pub fn transport(action: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { action, source }
    }

    pub fn decode(action: &'static str, detail: impl ToString) -> Self {
        Self::Decode {
            action,
            detail: detail.to_string(),
        }
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::EmptyQuestion)
    }
}

/// Startup problems. Any of these stops the server before it binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required secret {0}")]
    MissingSecret(&'static str),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
