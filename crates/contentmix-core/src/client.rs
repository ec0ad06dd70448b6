//! Provider client contract.
//!
//! A [`Client`] performs one bounded-time fetch against a provider backend.
//! The engine treats it as a black box: timeouts, transport failures, and
//! malformed payloads all surface as a [`FetchError`].
//!
//! # Example Implementation
//!
//! ```rust,ignore
//! use contentmix_core::{Client, ClientFuture, ContentItem};
//!
//! struct Headlines;
//!
//! impl Client for Headlines {
//!     fn fetch<'a>(&'a self, query: &'a str, limit: usize) -> ClientFuture<'a> {
//!         Box::pin(async move {
//!             // talk to the backend...
//!             Ok(Vec::new())
//!         })
//!     }
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{ContentItem, ProviderId};

/// Boxed future returned by [`Client::fetch`].
pub type ClientFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<ContentItem>, FetchError>> + Send + 'a>>;

/// Single-call content fetch capability.
///
/// Implementations must be `Send + Sync`: one client instance is shared by
/// every concurrent request and by every fetch task within a request.
pub trait Client: Send + Sync {
    /// Fetches up to `limit` items for `query`, in provider order.
    fn fetch<'a>(&'a self, query: &'a str, limit: usize) -> ClientFuture<'a>;
}

/// Fetch failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Unavailable,
    Timeout,
    Malformed,
    Transport,
    /// The spawned fetch task panicked or was cancelled.
    TaskFailed,
}

/// Structured error raised by a provider fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    provider: Option<ProviderId>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Malformed, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, message)
    }

    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::TaskFailed, message)
    }

    /// Attaches the provider the failed call was made against, unless one is
    /// already recorded.
    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        if self.provider.is_none() {
            self.provider = Some(provider);
        }
        self
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&ProviderId> {
        self.provider.as_ref()
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Unavailable => "fetch.unavailable",
            FetchErrorKind::Timeout => "fetch.timeout",
            FetchErrorKind::Malformed => "fetch.malformed",
            FetchErrorKind::Transport => "fetch.transport",
            FetchErrorKind::TaskFailed => "fetch.task_failed",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "{} ({}, provider '{}')", self.message, self.code(), provider),
            None => write!(f, "{} ({})", self.message, self.code()),
        }
    }
}

impl std::error::Error for FetchError {}
