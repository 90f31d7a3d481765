//! Request-facing subscription service.
//!
//! Nothing is written on request: a validated request is sealed into a
//! confirmation token and mailed out. The subscription only comes into
//! existence when the token comes back through one of the `confirm_*` calls,
//! which validate everything again.

use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::detect::ChangeSummary;
use crate::email::{record_name, EmailComposer, OutboundEmailSender};
use crate::error::{DomainError, Result, StoreError};
use crate::identity::{canonicalize_query, SubscriptionKey};
use crate::storage::{change_summary_blob_name, AuditEntry, Repositories, Subscription};
use crate::tokens::TokenSealer;
use crate::types::{EmailAddress, Frequency, Topic, TopicKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of validating a subscription request. Not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    Success,
    /// The same (email, topic) pair already exists.
    AlreadySubscribed,
    /// The address is on the block list.
    EmailBlocked,
}

/// What a confirmation token carries for a new subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Recipient of the notifications
    pub email: EmailAddress,
    /// What to watch
    pub topic: Topic,
    /// How often to notify
    pub frequency: Frequency,
}

/// Result of a subscription request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOutcome {
    pub validation: ValidationResult,
    /// Set only on success.
    pub token: Option<String>,
}

/// Result of confirming a request token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub validation: ValidationResult,
    /// Set only on success.
    pub subscription_id: Option<SubscriptionKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EmailChangeRequest {
    subscription_id: String,
    new_email: EmailAddress,
}

/// Public view of a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Public subscription id
    pub id: SubscriptionKey,
    /// Search or record
    pub kind: TopicKind,
    /// Watched topic, with the latest known display name
    pub topic: Topic,
    /// Notification frequency
    pub frequency: Frequency,
}

impl From<Subscription> for SubscriptionInfo {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.key,
            kind: s.topic.kind(),
            topic: s.topic,
            frequency: s.frequency,
        }
    }
}

/// One page of a user's subscriptions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionList {
    /// Subscriptions on this page, in id order
    pub subscriptions: Vec<SubscriptionInfo>,
    /// Page token for the next call, `None` on the last page.
    pub continuation: Option<String>,
}

/// Request, confirmation and management operations over shared repositories.
pub struct SubscriptionService {
    config: ServiceConfig,
    repositories: Repositories,
    sender: Arc<dyn OutboundEmailSender>,
    clock: Arc<dyn Clock>,
    sealer: TokenSealer,
    composer: EmailComposer,
}

impl SubscriptionService {
    /// Build the service. Fails if `config` does not validate or the secret is unusable.
    pub fn new(
        config: ServiceConfig,
        repositories: Repositories,
        sender: Arc<dyn OutboundEmailSender>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let sealer = TokenSealer::new(&config.encryption_secret)?;
        let composer = EmailComposer::from_config(&config)?;

        Ok(Self {
            config,
            repositories,
            sender,
            clock,
            sealer,
            composer,
        })
    }

    /// A search topic keyed on the canonical form of `raw_query`.
    pub fn search_topic(&self, raw_query: &str, keywords: Option<&str>) -> Topic {
        Topic::Search {
            query: canonicalize_query(raw_query, &self.config.search_query_remove_keys),
            label: keywords.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string),
        }
    }

    fn canonical_topic(&self, topic: Topic) -> Topic {
        match topic {
            Topic::Search { query, label } => self.search_topic(&query, label.as_deref()),
            record => record,
        }
    }

    /// Whether `email` is subscribed to `topic`. Search queries are canonicalised first.
    pub fn is_subscribed(&self, email: &EmailAddress, topic: &Topic) -> Result<bool> {
        let topic = self.canonical_topic(topic.clone());
        self.repositories
            .subscriptions
            .exists(&SubscriptionKey::derive(email, &topic))
    }

    fn validate(&self, request: &SubscriptionRequest) -> Result<ValidationResult> {
        if self.repositories.blocked.is_blocked(&request.email)? {
            return Ok(ValidationResult::EmailBlocked);
        }
        let key = SubscriptionKey::derive(&request.email, &request.topic);
        if self.repositories.subscriptions.exists(&key)? {
            return Ok(ValidationResult::AlreadySubscribed);
        }
        Ok(ValidationResult::Success)
    }

    /// Validate and mail a confirmation link. Writes nothing but the audit trail.
    pub fn request_subscription(&self, request: SubscriptionRequest) -> Result<RequestOutcome> {
        let request = SubscriptionRequest {
            topic: self.canonical_topic(request.topic),
            ..request
        };

        // Validate
        let validation = self.validate(&request)?;
        if validation != ValidationResult::Success {
            tracing::debug!(email = %request.email, ?validation, "Subscription request rejected");
            return Ok(RequestOutcome { validation, token: None });
        }

        // Seal and mail
        let token = self.sealer.enclose(
            &request,
            self.clock.now(),
            self.config.token_validity_hours,
        )?;

        let (email, text) = match &request.topic {
            Topic::Search { label, .. } => (
                self.composer
                    .confirm_search_subscription(&request.email, &token, label.as_deref())?,
                "Requested search subscription".to_string(),
            ),
            Topic::Record { id, name } => (
                self.composer.confirm_record_subscription(
                    &request.email,
                    &token,
                    &record_name(*id, name.as_deref()),
                )?,
                format!("Requested record subscription (record={id})"),
            ),
        };

        self.sender.send(&email)?;
        self.track(&request.email, None, text)?;
        tracing::info!(email = %request.email, kind = %request.topic.kind(), "Subscription requested");

        Ok(RequestOutcome {
            validation,
            token: Some(token),
        })
    }

    /// Request a subscription to the results of `raw_query`.
    pub fn request_search_subscription(
        &self,
        email: EmailAddress,
        raw_query: &str,
        keywords: Option<&str>,
        frequency: Frequency,
    ) -> Result<RequestOutcome> {
        self.request_subscription(SubscriptionRequest {
            email,
            topic: self.search_topic(raw_query, keywords),
            frequency,
        })
    }

    /// Request a subscription to one record.
    pub fn request_record_subscription(
        &self,
        email: EmailAddress,
        record_id: Uuid,
        record_name: Option<&str>,
        frequency: Frequency,
    ) -> Result<RequestOutcome> {
        self.request_subscription(SubscriptionRequest {
            email,
            topic: Topic::Record {
                id: record_id,
                name: record_name.map(str::to_string),
            },
            frequency,
        })
    }

    /// Confirm either kind of subscription request.
    pub fn confirm_subscription(&self, token: &str) -> Result<ConfirmOutcome> {
        let request: SubscriptionRequest = self.sealer.disclose(token, self.clock.now())?;
        self.confirm(request)
    }

    /// Confirm a search request. A record token fails with `TopicKindMismatch`.
    pub fn confirm_search_subscription(&self, token: &str) -> Result<ConfirmOutcome> {
        self.confirm_kind(token, TopicKind::Search)
    }

    /// Confirm a record request. A search token fails with `TopicKindMismatch`.
    pub fn confirm_record_subscription(&self, token: &str) -> Result<ConfirmOutcome> {
        self.confirm_kind(token, TopicKind::Record)
    }

    fn confirm_kind(&self, token: &str, expected: TopicKind) -> Result<ConfirmOutcome> {
        let request: SubscriptionRequest = self.sealer.disclose(token, self.clock.now())?;
        let got = request.topic.kind();
        if got != expected {
            return Err(DomainError::TopicKindMismatch {
                expected: expected.to_string(),
                got: got.to_string(),
            }
            .into());
        }
        self.confirm(request)
    }

    fn confirm(&self, request: SubscriptionRequest) -> Result<ConfirmOutcome> {
        let validation = self.validate(&request)?;
        if validation != ValidationResult::Success {
            return Ok(ConfirmOutcome {
                validation,
                subscription_id: None,
            });
        }

        let subscription = Subscription::new(
            request.email,
            request.topic,
            request.frequency,
            self.clock.now(),
        );
        self.repositories.subscriptions.upsert(&subscription)?;

        let key = subscription.key.clone();
        self.track(
            &subscription.email,
            Some(&key),
            format!("Confirmed {} subscription ({key})", subscription.topic.kind()),
        )?;
        tracing::info!(subscription = %key, "Subscription confirmed");

        Ok(ConfirmOutcome {
            validation,
            subscription_id: Some(key),
        })
    }

    fn load(&self, subscription_id: &str) -> Result<Subscription> {
        let key: SubscriptionKey = subscription_id.parse()?;
        self.repositories
            .subscriptions
            .get(&key)?
            .ok_or_else(|| DomainError::SubscriptionNotFound(subscription_id.to_string()).into())
    }

    fn validate_email_change(&self, subscription: &Subscription, new_email: &EmailAddress) -> Result<()> {
        if &subscription.email == new_email {
            return Err(DomainError::EmailNotDifferent.into());
        }
        if self.repositories.blocked.is_blocked(new_email)? {
            return Err(DomainError::EmailBlocked.into());
        }
        if self
            .repositories
            .subscriptions
            .exists(&subscription.key.with_email(new_email))?
        {
            return Err(DomainError::AlreadySubscribedUnderNewEmail.into());
        }
        Ok(())
    }

    /// Mail a confirmation link to `new_email` and return its token.
    pub fn request_email_change(&self, subscription_id: &str, new_email: EmailAddress) -> Result<String> {
        let subscription = self.load(subscription_id)?;
        self.validate_email_change(&subscription, &new_email)?;

        let token = self.sealer.enclose(
            &EmailChangeRequest {
                subscription_id: subscription.key.to_string(),
                new_email: new_email.clone(),
            },
            self.clock.now(),
            self.config.token_validity_hours,
        )?;

        self.sender
            .send(&self.composer.confirm_update_email_address(&new_email, &token)?)?;

        let text = format!("Requested email address change for subscription ({})", subscription.key);
        self.track(&new_email, Some(&subscription.key), text.clone())?;
        self.track(&subscription.email, Some(&subscription.key), text)?;

        Ok(token)
    }

    /// Move the subscription to the new address. Returns the new subscription id.
    pub fn confirm_email_change(&self, token: &str) -> Result<SubscriptionKey> {
        let change: EmailChangeRequest = self.sealer.disclose(token, self.clock.now())?;
        let subscription = self.load(&change.subscription_id)?;
        self.validate_email_change(&subscription, &change.new_email)?;

        // Write the new key before removing the old one
        let moved = subscription.with_email(change.new_email);
        self.repositories.subscriptions.upsert(&moved)?;
        self.repositories.subscriptions.delete(&subscription.key)?;

        let old_key = &subscription.key;
        let new_key = &moved.key;
        self.track(
            &moved.email,
            Some(new_key),
            format!(
                "Confirmed email address change to '{}' (old: {old_key}, new: {new_key})",
                moved.email
            ),
        )?;
        self.track(
            &subscription.email,
            Some(old_key),
            format!(
                "Confirmed email address change from '{}' to '{}' (old: {old_key}, new: {new_key})",
                subscription.email, moved.email
            ),
        )?;
        tracing::info!(old = %old_key, new = %new_key, "Subscription email changed");

        Ok(moved.key)
    }

    /// Change how often the subscription is notified.
    pub fn update_frequency(&self, subscription_id: &str, frequency: Frequency) -> Result<()> {
        let mut subscription = self.load(subscription_id)?;
        let previous = subscription.frequency;
        subscription.frequency = frequency;
        self.repositories.subscriptions.upsert(&subscription)?;
        self.track(
            &subscription.email,
            Some(&subscription.key),
            format!("Changed frequency from {previous:?} to {frequency:?}"),
        )
    }

    /// Look up a subscription by its public id.
    pub fn get_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionInfo>> {
        let key: SubscriptionKey = subscription_id.parse()?;
        Ok(self.repositories.subscriptions.get(&key)?.map(SubscriptionInfo::from))
    }

    /// Delete one subscription and its snapshot. Returns false when there was nothing to delete.
    pub fn unsubscribe(&self, subscription_id: &str) -> Result<bool> {
        let key: SubscriptionKey = subscription_id.parse()?;
        let Some(subscription) = self.repositories.subscriptions.get(&key)? else {
            return Ok(false);
        };

        self.remove(&subscription)?;
        self.track(
            &subscription.email,
            Some(&key),
            format!("Unsubscribed ({key})"),
        )?;
        Ok(true)
    }

    /// Delete every subscription of `email`. Returns how many were deleted.
    pub fn unsubscribe_all(&self, email: &EmailAddress) -> Result<usize> {
        let partition = SubscriptionKey::partition_for(email);
        let page_size = self.config.list_page_size;
        let mut count = 0;

        // Deleted keys drop out, so every pass starts at the partition head
        loop {
            let page = self
                .repositories
                .subscriptions
                .scan(Some(&partition), None, page_size)?;
            if page.items.is_empty() {
                break;
            }
            for subscription in &page.items {
                self.remove(subscription)?;
                count += 1;
            }
        }

        self.track(email, None, format!("Unsubscribed all ({count})"))?;
        tracing::info!(email = %email, count, "Unsubscribed all");
        Ok(count)
    }

    fn remove(&self, subscription: &Subscription) -> Result<()> {
        self.repositories.subscriptions.delete(&subscription.key)?;
        if let Some(blob) = &subscription.snapshot_blob {
            self.repositories.snapshots.delete(blob)?;
        }
        Ok(())
    }

    /// Unsubscribe everything, then block. Returns false if already blocked.
    pub fn block(&self, email: &EmailAddress) -> Result<bool> {
        self.unsubscribe_all(email)?;

        if self.repositories.blocked.is_blocked(email)? {
            return Ok(false);
        }
        self.repositories.blocked.block(email, self.clock.now())?;
        self.track(email, None, "Blocked")?;
        tracing::info!(email = %email, "Email blocked");
        Ok(true)
    }

    /// Returns false if the address was not blocked.
    pub fn unblock(&self, email: &EmailAddress) -> Result<bool> {
        if !self.repositories.blocked.unblock(email)? {
            return Ok(false);
        }
        self.track(email, None, "Unblocked")?;
        Ok(true)
    }

    /// Whether `email` is on the block list.
    pub fn is_blocked(&self, email: &EmailAddress) -> Result<bool> {
        self.repositories.blocked.is_blocked(email)
    }

    /// One page of `email`'s subscriptions. `page_token` is the `continuation`
    /// of the previous page.
    pub fn list_subscriptions(
        &self,
        email: &EmailAddress,
        page_token: Option<&str>,
        take: Option<usize>,
    ) -> Result<SubscriptionList> {
        let after = page_token.map(str::parse::<SubscriptionKey>).transpose()?;
        let take = take.unwrap_or(self.config.list_page_size).max(1);
        let partition = SubscriptionKey::partition_for(email);

        let page = self
            .repositories
            .subscriptions
            .scan(Some(&partition), after.as_ref(), take)?;

        Ok(SubscriptionList {
            subscriptions: page.items.into_iter().map(SubscriptionInfo::from).collect(),
            continuation: page.continuation.map(|k| k.to_string()),
        })
    }

    /// The change summary a "search updated" email links to, if it still exists.
    pub fn get_change_summary(&self, id: Uuid) -> Result<Option<ChangeSummary>> {
        let Some(bytes) = self.repositories.changes.get(&change_summary_blob_name(id))? else {
            return Ok(None);
        };
        let summary = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Deserialization(format!("change summary {id}: {e}")))?;
        Ok(Some(summary))
    }

    fn track(
        &self,
        email: &EmailAddress,
        subscription: Option<&SubscriptionKey>,
        text: impl Into<String>,
    ) -> Result<()> {
        self.repositories.audit.track(AuditEntry::new(
            self.clock.now(),
            email,
            subscription.map(ToString::to_string),
            text,
        ))
    }
}
