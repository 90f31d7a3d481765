//! Subscription lifecycle engine.
//!
//! One call to [`SubscriptionEngine::run_cycle`] walks every subscription once:
//!
//! - not yet initialised: observe the topic, store the snapshot, send "subscribed",
//! - initialised but not due: nothing,
//! - due: observe again and, if the thumbprint moved, notify.
//!
//! On a change the new snapshot (and, for searches, the change summary) is
//! written first, then the email is sent, then the entity is committed in a
//! single upsert. A failed send leaves the entity pointing at the previous
//! snapshot, so the next cycle detects and diffs the same change again.
//!
//! Nothing that goes wrong during a cycle aborts it: a subscription that
//! fails, or a page that cannot be read, is counted in [`CycleTally::errors`].

use crate::clock::Clock;
use crate::config::{EngineConfig, ServiceConfig};
use crate::detect::{fetch, parse_search_snapshot, ChangeSummary, TopicContent, TopicSource};
use crate::email::{EmailComposer, EmailDefinition, OutboundEmailSender};
use crate::error::Result;
use crate::storage::{change_summary_blob_name, AuditEntry, Repositories, Subscription};
use crate::types::{Timestamp, Topic};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// What happened to one subscription during a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A change was detected and the notification sent.
    Notified,
    /// First observation stored and the "subscribed" email sent.
    Initialised,
    /// Due, but the topic is unchanged or has vanished upstream.
    NoChange,
    NotDue,
    /// Processing failed; the stored baseline is untouched.
    Error,
}

/// Per-outcome counts for one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleTally {
    /// Subscriptions that were sent a change notification
    pub notified: usize,
    /// Subscriptions observed for the first time
    pub initialised: usize,
    /// Due subscriptions whose topic had not changed
    pub no_change: usize,
    /// Subscriptions skipped because they were not due
    pub not_due: usize,
    /// Failed subscriptions plus unreadable pages
    pub errors: usize,
}

impl CycleTally {
    /// Count one outcome.
    pub fn accept(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Notified => self.notified += 1,
            CycleOutcome::Initialised => self.initialised += 1,
            CycleOutcome::NoChange => self.no_change += 1,
            CycleOutcome::NotDue => self.not_due += 1,
            CycleOutcome::Error => self.errors += 1,
        }
    }

    /// Add another tally's counts to this one.
    pub fn merge(&mut self, other: &CycleTally) {
        self.notified += other.notified;
        self.initialised += other.initialised;
        self.no_change += other.no_change;
        self.not_due += other.not_due;
        self.errors += other.errors;
    }

    /// Number of outcomes counted.
    pub fn total(&self) -> usize {
        self.notified + self.initialised + self.no_change + self.not_due + self.errors
    }
}

/// Cooperative cancellation, checked between pages and between subscriptions.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Work already started on a subscription finishes.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Periodic change detection over every stored subscription.
pub struct SubscriptionEngine {
    config: EngineConfig,
    repositories: Repositories,
    source: Arc<dyn TopicSource>,
    sender: Arc<dyn OutboundEmailSender>,
    clock: Arc<dyn Clock>,
    composer: EmailComposer,
}

impl SubscriptionEngine {
    /// Build an engine over `repositories`. Fails if `config` does not validate.
    pub fn new(
        config: &ServiceConfig,
        repositories: Repositories,
        source: Arc<dyn TopicSource>,
        sender: Arc<dyn OutboundEmailSender>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.engine.clone(),
            repositories,
            source,
            sender,
            clock,
            composer: EmailComposer::from_config(config)?,
        })
    }

    /// Process every subscription once and return the tally.
    ///
    /// A page that cannot be read ends the cycle early with one more error
    /// counted; the tally of what was already processed is still returned.
    pub fn run_cycle(&self, signal: &CancellationSignal) -> Result<CycleTally> {
        let mut tally = CycleTally::default();
        let mut after = None;

        tracing::info!(page_size = self.config.page_size, workers = self.config.workers, "Subscription cycle started");

        while !signal.is_cancelled() {
            let page = match self
                .repositories
                .subscriptions
                .scan(None, after.as_ref(), self.config.page_size)
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(
                        after = ?after.as_ref().map(ToString::to_string),
                        error = %e,
                        "Failed to read subscription page"
                    );
                    tally.accept(CycleOutcome::Error);
                    break;
                }
            };

            self.process_page(&page.items, signal, &mut tally);

            match page.continuation {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        tracing::info!(
            notified = tally.notified,
            initialised = tally.initialised,
            no_change = tally.no_change,
            not_due = tally.not_due,
            errors = tally.errors,
            cancelled = signal.is_cancelled(),
            "Subscription cycle finished"
        );

        Ok(tally)
    }

    fn process_page(&self, page: &[Subscription], signal: &CancellationSignal, tally: &mut CycleTally) {
        let workers = self.config.workers.min(page.len());
        if workers <= 1 {
            for subscription in page {
                if signal.is_cancelled() {
                    break;
                }
                tally.accept(self.process(subscription));
            }
            return;
        }

        let (tx, rx) = bounded::<&Subscription>(workers);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let rx = rx.clone();
                    scope.spawn(move || {
                        let mut local = CycleTally::default();
                        for subscription in rx.iter() {
                            if signal.is_cancelled() {
                                break;
                            }
                            local.accept(self.process(subscription));
                        }
                        local
                    })
                })
                .collect();
            drop(rx);

            for subscription in page {
                if signal.is_cancelled() || tx.send(subscription).is_err() {
                    break;
                }
            }
            drop(tx);

            for handle in handles {
                match handle.join() {
                    Ok(local) => tally.merge(&local),
                    Err(_) => {
                        tracing::error!("Subscription worker panicked");
                        tally.accept(CycleOutcome::Error);
                    }
                }
            }
        });
    }

    /// Run one subscription through the state machine. Never fails: errors
    /// are logged, audited and reported as [`CycleOutcome::Error`].
    pub fn process(&self, subscription: &Subscription) -> CycleOutcome {
        let outcome = match self.evaluate(subscription) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(subscription = %subscription.key, error = %e, "Subscription processing failed");
                self.track(subscription, format!("Failed to process subscription; error: {e}"));
                CycleOutcome::Error
            }
        };
        tracing::debug!(subscription = %subscription.key, ?outcome, "Subscription processed");
        outcome
    }

    fn evaluate(&self, subscription: &Subscription) -> Result<CycleOutcome> {
        let now = self.clock.now();

        if !subscription.is_initialised() {
            return self.initialise(subscription, now);
        }
        if !subscription.is_due(now) {
            return Ok(CycleOutcome::NotDue);
        }
        self.check_for_changes(subscription, now)
    }

    fn initialise(&self, subscription: &Subscription, now: Timestamp) -> Result<CycleOutcome> {
        let Some(content) = fetch(self.source.as_ref(), &subscription.topic)? else {
            return Ok(CycleOutcome::NoChange);
        };

        let blob = subscription.snapshot_blob_name(&content.thumbprint);
        self.repositories.snapshots.put(&blob, content.json.as_bytes())?;

        let mut updated = subscription.clone();
        adopt_display_name(&mut updated.topic, &content);
        updated.last_thumbprint = Some(content.thumbprint);
        updated.due_base = Some(now);
        updated.snapshot_blob = Some(blob.clone());
        self.repositories.subscriptions.upsert(&updated)?;

        self.track(
            &updated,
            format!(
                "Initialised subscription with thumbprint '{}' and blob '{blob}'",
                content.thumbprint
            ),
        );

        let email = self.composer.subscribed(&updated.email, &updated.key, &updated.topic)?;
        self.sender.send(&email)?;

        Ok(CycleOutcome::Initialised)
    }

    fn check_for_changes(&self, subscription: &Subscription, now: Timestamp) -> Result<CycleOutcome> {
        let Some(content) = fetch(self.source.as_ref(), &subscription.topic)? else {
            return Ok(CycleOutcome::NoChange);
        };

        if subscription.last_thumbprint == Some(content.thumbprint) {
            return Ok(CycleOutcome::NoChange);
        }

        let mut updated = subscription.clone();
        adopt_display_name(&mut updated.topic, &content);

        let email = self.change_email(subscription, &updated.topic, &content)?;

        // Write the new snapshot under its own name; the old one stays referenced
        let new_blob = subscription.snapshot_blob_name(&content.thumbprint);
        self.repositories.snapshots.put(&new_blob, content.json.as_bytes())?;

        let transition = format!(
            "old: {}, {}; new: {}, {new_blob}",
            display_opt(subscription.last_thumbprint.map(|t| t.to_hex())),
            display_opt(subscription.snapshot_blob.clone()),
            content.thumbprint,
        );

        if let Err(e) = self.sender.send(&email) {
            tracing::warn!(subscription = %subscription.key, error = %e, "Change notification failed");
            self.track(
                subscription,
                format!("Failed to notify change on subscription ({transition}); error: {e}"),
            );
            return Ok(CycleOutcome::Error);
        }

        // Commit
        updated.last_thumbprint = Some(content.thumbprint);
        updated.due_base = Some(now);
        updated.snapshot_blob = Some(new_blob.clone());
        self.repositories.subscriptions.upsert(&updated)?;

        if let Some(old_blob) = &subscription.snapshot_blob {
            if old_blob != &new_blob {
                self.repositories.snapshots.delete(old_blob)?;
            }
        }

        self.track(
            &updated,
            format!("Notified subscription: {} updated ({transition})", updated.topic.kind()),
        );

        Ok(CycleOutcome::Notified)
    }

    /// Build the notification. For searches this diffs against the stored
    /// snapshot and writes the change summary it links to.
    fn change_email(
        &self,
        subscription: &Subscription,
        topic: &Topic,
        content: &TopicContent,
    ) -> Result<EmailDefinition> {
        match topic {
            Topic::Search { query, label } => {
                let previous = match &subscription.snapshot_blob {
                    Some(name) => match self.repositories.snapshots.get(name)? {
                        Some(bytes) => parse_search_snapshot(&bytes)?,
                        None => {
                            tracing::warn!(subscription = %subscription.key, blob = %name, "Previous snapshot missing");
                            Vec::new()
                        }
                    },
                    None => Vec::new(),
                };
                let current = parse_search_snapshot(content.json.as_bytes())?;

                let summary = ChangeSummary::between(&previous, &current);
                let change_id = Uuid::new_v4();
                self.repositories
                    .changes
                    .put(&change_summary_blob_name(change_id), &serde_json::to_vec(&summary)?)?;
                tracing::debug!(subscription = %subscription.key, %change_id, %summary, "Change summary written");

                self.composer.search_updated(
                    &subscription.email,
                    &subscription.key,
                    query,
                    label.as_deref(),
                    change_id,
                )
            }
            Topic::Record { id, name } => {
                self.composer
                    .record_updated(&subscription.email, &subscription.key, *id, name.as_deref())
            }
        }
    }

    /// Audit failures are logged, never propagated.
    fn track(&self, subscription: &Subscription, text: String) {
        let entry = AuditEntry::new(
            self.clock.now(),
            &subscription.email,
            Some(subscription.key.to_string()),
            text,
        );
        if let Err(e) = self.repositories.audit.track(entry) {
            tracing::warn!(subscription = %subscription.key, error = %e, "Audit write failed");
        }
    }
}

fn adopt_display_name(topic: &mut Topic, content: &TopicContent) {
    if let (Topic::Record { name, .. }, Some(display)) = (topic, &content.display_name) {
        *name = Some(display.clone());
    }
}

fn display_opt(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_accept_and_merge() {
        let mut a = CycleTally::default();
        a.accept(CycleOutcome::Notified);
        a.accept(CycleOutcome::NotDue);
        a.accept(CycleOutcome::Error);

        let mut b = CycleTally::default();
        b.accept(CycleOutcome::Initialised);
        b.accept(CycleOutcome::NoChange);
        b.accept(CycleOutcome::NoChange);

        a.merge(&b);
        assert_eq!(
            a,
            CycleTally {
                notified: 1,
                initialised: 1,
                no_change: 2,
                not_due: 1,
                errors: 1,
            }
        );
        assert_eq!(a.total(), 6);
    }

    #[test]
    fn test_cancellation_is_shared() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_cancelled());
        clone.cancel();
        assert!(signal.is_cancelled());
    }
}
