//! Structured diff of two search result sets.

use super::source::SearchResultItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// An entry present in both sets whose non-key fields differ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedEntry {
    pub old: SearchResultItem,
    pub new: SearchResultItem,
}

impl ModifiedEntry {
    pub fn id(&self) -> Uuid {
        self.old.id
    }
}

/// What changed between two observations of a search topic.
///
/// `added`, `removed` and `modified` are disjoint by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: Vec<SearchResultItem>,
    pub removed: Vec<SearchResultItem>,
    pub modified: Vec<ModifiedEntry>,
}

impl ChangeSummary {
    pub fn between(old: &[SearchResultItem], new: &[SearchResultItem]) -> Self {
        let old_by_id: BTreeMap<Uuid, &SearchResultItem> = old.iter().map(|i| (i.id, i)).collect();
        let new_by_id: BTreeMap<Uuid, &SearchResultItem> = new.iter().map(|i| (i.id, i)).collect();

        let mut summary = ChangeSummary::default();

        for (id, item) in &new_by_id {
            match old_by_id.get(id) {
                None => summary.added.push((*item).clone()),
                Some(previous) if previous != item => summary.modified.push(ModifiedEntry {
                    old: (*previous).clone(),
                    new: (*item).clone(),
                }),
                Some(_) => {}
            }
        }

        summary.removed = old_by_id
            .iter()
            .filter(|(id, _)| !new_by_id.contains_key(id))
            .map(|(_, item)| (*item).clone())
            .collect();

        summary
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} modified.",
            self.added.len(),
            self.removed.len(),
            self.modified.len()
        )
    }
}
