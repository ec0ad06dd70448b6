use std::path::PathBuf;

use thiserror::Error;

use crate::client::FetchError;
use crate::ProviderId;

/// Validation errors for identifiers, timestamps, and configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("provider id cannot be empty")]
    EmptyProviderId,
    #[error("provider id length {len} exceeds max {max}")]
    ProviderIdTooLong { len: usize, max: usize },
    #[error("provider id contains invalid character '{ch}' at index {index}")]
    ProviderIdInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("failure_rate must be within [0, 1]: {value}")]
    InvalidFailureRate { value: String },
    #[error("invalid abort policy '{value}', expected one of detach, cancel")]
    InvalidAbortPolicy { value: String },
    #[error("items_per_fetch must be greater than zero")]
    ZeroItemsPerFetch,
}

/// Which side of a provider descriptor referenced an unknown provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    Primary,
    Fallback,
}

impl std::fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// Startup-time configuration failures. None of these may surface mid-request.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{role} provider '{id}' at position {position} has no registered client")]
    UnregisteredProvider {
        id: ProviderId,
        position: usize,
        role: ProviderRole,
    },

    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failures raised while delivering items to a result sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("result sink is closed")]
    Closed,
}

/// Terminal error of one engine run.
#[derive(Debug, Error)]
pub enum MixError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl MixError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch(error) => error.code(),
            Self::Sink(_) => "sink.failed",
        }
    }
}
