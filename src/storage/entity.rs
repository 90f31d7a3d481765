//! The persisted subscription entity.

use crate::identity::SubscriptionKey;
use crate::types::{EmailAddress, Frequency, Thumbprint, Timestamp, Topic};
use serde::{Deserialize, Serialize};

/// One subscription per (email, topic).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub key: SubscriptionKey,
    pub email: EmailAddress,
    pub topic: Topic,
    pub frequency: Frequency,

    /// Thumbprint of the last observed content. `None` until initialised.
    pub last_thumbprint: Option<Thumbprint>,

    /// Anchor the next due date is computed from.
    pub due_base: Option<Timestamp>,

    /// Name of the blob holding the last observed content.
    pub snapshot_blob: Option<String>,

    pub created: Timestamp,
}

impl Subscription {
    /// A fresh, uninitialised subscription. `topic` must already be canonical.
    pub fn new(email: EmailAddress, topic: Topic, frequency: Frequency, created: Timestamp) -> Self {
        Self {
            key: SubscriptionKey::derive(&email, &topic),
            email,
            topic,
            frequency,
            last_thumbprint: None,
            due_base: None,
            snapshot_blob: None,
            created,
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.last_thumbprint.is_some()
    }

    /// `None` for realtime subscriptions or when there is no anchor yet.
    pub fn next_due(&self) -> Option<Timestamp> {
        self.due_base.and_then(|base| self.frequency.next_due(base))
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.next_due().map_or(true, |due| now >= due)
    }

    /// Snapshot names embed the thumbprint, so a new snapshot never
    /// overwrites the one the entity currently points at.
    pub fn snapshot_blob_name(&self, thumbprint: &Thumbprint) -> String {
        format!(
            "{}/{}/{}.json",
            self.key.partition(),
            self.key.row(),
            thumbprint.to_hex()
        )
    }

    /// Move to a new owner. The key is re-derived from the new address.
    pub fn with_email(&self, email: EmailAddress) -> Self {
        Self {
            key: self.key.with_email(&email),
            email,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn subscription(frequency: Frequency) -> Subscription {
        Subscription::new(
            EmailAddress::parse("a@b.com").unwrap(),
            Topic::Record { id: Uuid::new_v4(), name: None },
            frequency,
            Timestamp::from_secs(0),
        )
    }

    #[test]
    fn test_due_dates() {
        let base = Timestamp::from_secs(10_000);

        let mut daily = subscription(Frequency::Daily);
        assert!(daily.is_due(base));
        daily.due_base = Some(base);
        assert!(!daily.is_due(base.plus_hours(23)));
        assert!(daily.is_due(base.plus_hours(24)));

        let mut weekly = subscription(Frequency::Weekly);
        weekly.due_base = Some(base);
        assert!(!weekly.is_due(base.plus_days(6)));
        assert!(weekly.is_due(base.plus_days(7)));

        let mut realtime = subscription(Frequency::Realtime);
        realtime.due_base = Some(base);
        assert!(realtime.is_due(base));
    }

    #[test]
    fn test_snapshot_name_per_thumbprint() {
        let sub = subscription(Frequency::Realtime);
        let a = sub.snapshot_blob_name(&Thumbprint::from_bytes(b"a"));
        let b = sub.snapshot_blob_name(&Thumbprint::from_bytes(b"b"));
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("{}/{}/", sub.key.partition(), sub.key.row())));
    }

    #[test]
    fn test_with_email_keeps_topic_row() {
        let sub = subscription(Frequency::Weekly);
        let moved = sub.with_email(EmailAddress::parse("c@d.com").unwrap());
        assert_eq!(moved.key.row(), sub.key.row());
        assert_ne!(moved.key.partition(), sub.key.partition());
        assert_eq!(moved.frequency, Frequency::Weekly);
    }
}
