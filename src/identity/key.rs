//! Subscription keys.

use crate::error::DomainError;
use crate::types::{EmailAddress, Topic};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Separator between the two parts of a serialized key.
pub const KEY_SEPARATOR: char = '$';

/// Identity of a subscription: `(hash(email), hash(topic))`.
///
/// The partition groups one user's subscriptions; the row identifies the topic.
/// `Display`/`FromStr` give the public id `partition$row`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    partition: String,
    row: String,
}

impl SubscriptionKey {
    pub fn new(partition: impl Into<String>, row: impl Into<String>) -> Result<Self, DomainError> {
        let partition = partition.into();
        let row = row.into();
        let valid = |part: &str| !part.is_empty() && !part.contains(KEY_SEPARATOR);
        if valid(&partition) && valid(&row) {
            Ok(Self { partition, row })
        } else {
            Err(DomainError::InvalidSubscriptionId(format!(
                "{partition}{KEY_SEPARATOR}{row}"
            )))
        }
    }

    /// Derive the key for `(email, topic)`. Search topics must carry a canonical query.
    pub fn derive(email: &EmailAddress, topic: &Topic) -> Self {
        match topic {
            Topic::Search { query, .. } => Self::for_search(email, query),
            Topic::Record { id, .. } => Self::for_record(email, *id),
        }
    }

    pub fn for_search(email: &EmailAddress, canonical_query: &str) -> Self {
        Self {
            partition: Self::partition_for(email),
            row: digest_hex(canonical_query),
        }
    }

    pub fn for_record(email: &EmailAddress, record_id: Uuid) -> Self {
        Self {
            partition: Self::partition_for(email),
            row: record_id.to_string(),
        }
    }

    pub fn partition_for(email: &EmailAddress) -> String {
        digest_hex(email.as_str())
    }

    /// Same topic, different owner.
    pub fn with_email(&self, email: &EmailAddress) -> Self {
        Self {
            partition: Self::partition_for(email),
            row: self.row.clone(),
        }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Sorts before every valid key in `partition` (rows are never empty).
    pub(crate) fn partition_floor(partition: &str) -> Self {
        Self {
            partition: partition.to_string(),
            row: String::new(),
        }
    }

    pub fn row(&self) -> &str {
        &self.row
    }
}

fn digest_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.partition, KEY_SEPARATOR, self.row)
    }
}

impl fmt::Debug for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionKey({self})")
    }
}

impl FromStr for SubscriptionKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (partition, row) = s
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| DomainError::InvalidSubscriptionId(s.to_string()))?;
        Self::new(partition, row).map_err(|_| DomainError::InvalidSubscriptionId(s.to_string()))
    }
}
