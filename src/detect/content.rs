//! Canonical topic content and thumbprints.

use super::source::{SearchResultItem, TopicSource, TrackedRecord};
use crate::error::{Result, StoreError};
use crate::types::{Thumbprint, Topic};
use serde::{Deserialize, Serialize};

/// Stored form of a search topic: results ordered by record id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSnapshot {
    pub results: Vec<SearchResultItem>,
}

/// The observed content of a topic at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicContent {
    /// Compact canonical JSON, the bytes that get hashed and stored as the snapshot.
    pub json: String,
    pub thumbprint: Thumbprint,
    /// Record display name, for record topics.
    pub display_name: Option<String>,
}

impl TopicContent {
    /// Source order is not trusted: entries are sorted by id (then name, so
    /// duplicate ids still serialize deterministically).
    pub fn from_search(mut results: Vec<SearchResultItem>) -> Result<Self> {
        results.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
        let json = serde_json::to_string(&SearchSnapshot { results })?;
        Ok(Self::new(json, None))
    }

    pub fn from_record(record: &TrackedRecord) -> Result<Self> {
        let json = serde_json::to_string(record)?;
        Ok(Self::new(json, record.name.clone()))
    }

    fn new(json: String, display_name: Option<String>) -> Self {
        let thumbprint = Thumbprint::from_bytes(json.as_bytes());
        Self {
            json,
            thumbprint,
            display_name,
        }
    }
}

/// Observe a topic. `Ok(None)` means a tracked record has disappeared upstream.
pub fn fetch(source: &dyn TopicSource, topic: &Topic) -> Result<Option<TopicContent>> {
    match topic {
        Topic::Search { query, .. } => {
            let response = source.search(query)?;
            TopicContent::from_search(response.results).map(Some)
        }
        Topic::Record { id, .. } => match source.get_record(*id)? {
            Some(record) => TopicContent::from_record(&record).map(Some),
            None => Ok(None),
        },
    }
}

/// Read back a search snapshot written by [`TopicContent::from_search`].
pub fn parse_search_snapshot(bytes: &[u8]) -> Result<Vec<SearchResultItem>> {
    let snapshot: SearchSnapshot = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Deserialization(format!("search snapshot: {e}")))?;
    Ok(snapshot.results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_search_order_independent() {
        let a = SearchResultItem::new(Uuid::new_v4(), "A");
        let b = SearchResultItem::new(Uuid::new_v4(), "B");

        let one = TopicContent::from_search(vec![a.clone(), b.clone()]).unwrap();
        let two = TopicContent::from_search(vec![b, a]).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn test_any_change_changes_thumbprint() {
        let id = Uuid::new_v4();
        let base = TopicContent::from_search(vec![SearchResultItem::new(id, "Bob")]).unwrap();
        let renamed = TopicContent::from_search(vec![SearchResultItem::new(id, "Bob2")]).unwrap();
        let grown = TopicContent::from_search(vec![
            SearchResultItem::new(id, "Bob"),
            SearchResultItem::new(Uuid::new_v4(), "Sid"),
        ])
        .unwrap();
        let empty = TopicContent::from_search(vec![]).unwrap();

        assert_ne!(base.thumbprint, renamed.thumbprint);
        assert_ne!(base.thumbprint, grown.thumbprint);
        assert_ne!(base.thumbprint, empty.thumbprint);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let items = vec![SearchResultItem::new(Uuid::new_v4(), "x")];
        let content = TopicContent::from_search(items.clone()).unwrap();
        assert_eq!(parse_search_snapshot(content.json.as_bytes()).unwrap(), items);
        assert!(parse_search_snapshot(b"{oops").is_err());
    }

    #[test]
    fn test_record_content_is_canonical() {
        let id = Uuid::new_v4();
        let one = TrackedRecord::new(id, "Lab")
            .with_field("website", serde_json::json!("x.org"))
            .with_field("address", serde_json::json!("1 Road"));
        let two = TrackedRecord::new(id, "Lab")
            .with_field("address", serde_json::json!("1 Road"))
            .with_field("website", serde_json::json!("x.org"));

        let c1 = TopicContent::from_record(&one).unwrap();
        let c2 = TopicContent::from_record(&two).unwrap();
        assert_eq!(c1.thumbprint, c2.thumbprint);
        assert_eq!(c1.display_name.as_deref(), Some("Lab"));
    }
}
