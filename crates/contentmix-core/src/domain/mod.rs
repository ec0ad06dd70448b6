//! # Domain Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ContentItem`] | One item produced by a provider client |
//! | [`ProviderDescriptor`] | Provider slot with optional fallback |
//! | [`ContentQuery`] | Leniently parsed `count`/`offset` pair |
//! | [`UtcDateTime`] | UTC timestamp |

mod item;
mod timestamp;

pub use item::ContentItem;
pub use timestamp::UtcDateTime;

use serde::{Deserialize, Serialize};

use crate::ProviderId;

/// One slot in the provider mix. Position in the registry is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    #[serde(rename = "provider")]
    pub id: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ProviderId>,
}

impl ProviderDescriptor {
    pub fn new(id: ProviderId, fallback: Option<ProviderId>) -> Self {
        Self { id, fallback }
    }

    pub fn without_fallback(id: ProviderId) -> Self {
        Self { id, fallback: None }
    }
}

/// Pagination parameters of one content request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentQuery {
    pub count: usize,
    pub offset: usize,
}

impl ContentQuery {
    pub const fn new(count: usize, offset: usize) -> Self {
        Self { count, offset }
    }

    /// Parses raw parameter values. Missing, non-numeric (including surrounding
    /// whitespace), or negative values become `0` and never produce an error.
    pub fn parse_lenient(count: Option<&str>, offset: Option<&str>) -> Self {
        Self {
            count: lenient_usize(count),
            offset: lenient_usize(offset),
        }
    }
}

fn lenient_usize(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value >= 0)
        .map(|value| usize::try_from(value).unwrap_or(usize::MAX))
        .unwrap_or(0)
}
