//! Storage collaborators.
//!
//! The engine and the service only see the traits defined here. Two
//! backends are provided: everything in memory ([`Repositories::in_memory`])
//! and a directory on disk ([`DataStore`]).

mod audit;
mod blobs;
mod entity;
mod store;
mod table;

pub use audit::{AuditEntry, FileAuditLog, MemoryAuditLog};
pub use blobs::{FileBlobStore, MemoryBlobStore};
pub use entity::Subscription;
pub use store::DataStore;
pub use table::KeyedTable;

use crate::error::Result;
use crate::identity::SubscriptionKey;
use crate::types::{EmailAddress, Timestamp};
use std::sync::Arc;
use uuid::Uuid;

/// Blob name of a change summary in [`Repositories::changes`].
pub fn change_summary_blob_name(id: Uuid) -> String {
    format!("{id}.json")
}

/// One page of a forward scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Pass back as `after` to get the next page. `None` on the last page.
    pub continuation: Option<SubscriptionKey>,
}

/// Subscriptions by key. All writes are last-writer-wins.
pub trait SubscriptionTable: Send + Sync {
    fn get(&self, key: &SubscriptionKey) -> Result<Option<Subscription>>;

    fn exists(&self, key: &SubscriptionKey) -> Result<bool>;

    fn upsert(&self, subscription: &Subscription) -> Result<()>;

    /// Returns whether anything was deleted.
    fn delete(&self, key: &SubscriptionKey) -> Result<bool>;

    /// Up to `take` subscriptions in key order, strictly after `after`,
    /// restricted to one partition when given.
    fn scan(
        &self,
        partition: Option<&str>,
        after: Option<&SubscriptionKey>,
        take: usize,
    ) -> Result<Page<Subscription>>;
}

/// Blocked email addresses.
pub trait BlockList: Send + Sync {
    fn is_blocked(&self, email: &EmailAddress) -> Result<bool>;

    fn block(&self, email: &EmailAddress, at: Timestamp) -> Result<()>;

    fn unblock(&self, email: &EmailAddress) -> Result<bool>;
}

/// Named, overwritable blobs.
pub trait BlobStore: Send + Sync {
    fn put(&self, name: &str, content: &[u8]) -> Result<()>;

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    fn delete(&self, name: &str) -> Result<bool>;

    fn exists(&self, name: &str) -> Result<bool>;
}

pub trait AuditLog: Send + Sync {
    fn track(&self, entry: AuditEntry) -> Result<()>;

    fn entries(&self) -> Result<Vec<AuditEntry>>;
}

/// Everything the service and the engine persist to.
#[derive(Clone)]
pub struct Repositories {
    pub subscriptions: Arc<dyn SubscriptionTable>,
    pub blocked: Arc<dyn BlockList>,
    /// Last observed content per subscription.
    pub snapshots: Arc<dyn BlobStore>,
    /// Change summaries, named by id.
    pub changes: Arc<dyn BlobStore>,
    pub audit: Arc<dyn AuditLog>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            subscriptions: Arc::new(KeyedTable::<SubscriptionKey, Subscription>::in_memory()),
            blocked: Arc::new(KeyedTable::<EmailAddress, Timestamp>::in_memory()),
            snapshots: Arc::new(MemoryBlobStore::new()),
            changes: Arc::new(MemoryBlobStore::new()),
            audit: Arc::new(MemoryAuditLog::new()),
        }
    }

    /// Audit text recorded for `email`, oldest first.
    pub fn audit_trail(&self, email: &EmailAddress) -> Result<Vec<String>> {
        Ok(self
            .audit
            .entries()?
            .into_iter()
            .filter(|e| &e.email == email)
            .map(|e| e.text)
            .collect())
    }
}
