use serde::{Deserialize, Serialize};

use crate::{ProviderId, UtcDateTime};

/// One piece of content produced by a provider client.
///
/// `source` is whatever the producing client stamped on the item. When a
/// fallback client served a slot, `source` names the fallback provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub source: ProviderId,
    pub summary: String,
    pub link: String,
    pub expiry: UtcDateTime,
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source: ProviderId,
        summary: impl Into<String>,
        link: impl Into<String>,
        expiry: UtcDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source,
            summary: summary.into(),
            link: link.into(),
            expiry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_flat_object() {
        let item = ContentItem::new(
            "a1",
            "Headline",
            ProviderId::parse("1").expect("valid"),
            "Short summary",
            "https://example.com/a1",
            UtcDateTime::parse("2024-01-01T00:00:00Z").expect("valid"),
        );

        let value = serde_json::to_value(&item).expect("serialize");
        assert_eq!(value["source"], serde_json::json!("1"));
        assert_eq!(value["expiry"], serde_json::json!("2024-01-01T00:00:00Z"));
        assert_eq!(value["title"], serde_json::json!("Headline"));
    }
}
