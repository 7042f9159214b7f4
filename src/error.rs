use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssessError>;

#[derive(Debug, Error)]
pub enum AssessError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{provider} unavailable: {source}")]
    ProviderUnavailable {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Provider {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssessError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn index(err: impl std::fmt::Display) -> Self {
        Self::Index(err.to_string())
    }

    /// Network failures, rate limits and 5xx answers may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ProviderUnavailable { .. } => true,
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
