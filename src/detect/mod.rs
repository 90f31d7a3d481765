//! Change detection.
//!
//! A topic is observed as canonical JSON and hashed into a [`Thumbprint`];
//! equal thumbprints mean "no change". Search topics additionally get a
//! [`ChangeSummary`] computed against the previous snapshot.
//!
//! [`Thumbprint`]: crate::types::Thumbprint

mod content;
mod diff;
mod source;

pub use content::{fetch, parse_search_snapshot, SearchSnapshot, TopicContent};
pub use diff::{ChangeSummary, ModifiedEntry};
pub use source::{SearchResultItem, SearchResults, TopicSource, TrackedRecord};
