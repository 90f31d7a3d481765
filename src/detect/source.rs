//! Upstream topic source contract.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One entry of a search result set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: Uuid,
    pub name: Option<String>,
}

impl SearchResultItem {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }
}

/// A search response. `total` is informational and not part of the watched content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total: u64,
    pub results: Vec<SearchResultItem>,
}

impl SearchResults {
    pub fn new(results: Vec<SearchResultItem>) -> Self {
        Self {
            total: results.len() as u64,
            results,
        }
    }
}

/// A single tracked record. Fields beyond id and name are kept in key order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedRecord {
    pub id: Uuid,
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl TrackedRecord {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// The upstream search/record API.
///
/// Implementations are expected to apply their own request timeouts.
pub trait TopicSource: Send + Sync {
    /// Run a canonical query string against the search API.
    fn search(&self, query: &str) -> Result<SearchResults>;

    /// Fetch one record. `None` means it no longer exists.
    fn get_record(&self, id: Uuid) -> Result<Option<TrackedRecord>>;
}
