//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use topicwatch::{
    CancellationSignal, CycleTally, EmailAddress, Error, Frequency, ManualClock, PretendEmailSender,
    Repositories, Result, SearchResultItem, SearchResults, ServiceConfig, SubscriptionEngine,
    SubscriptionKey, SubscriptionService, TemplateIds, Timestamp, TopicSource, TrackedRecord,
};
use uuid::Uuid;

/// In-memory stand-in for the upstream search/record API.
#[derive(Default)]
pub struct FakeTopicSource {
    searches: Mutex<HashMap<String, Vec<SearchResultItem>>>,
    records: Mutex<HashMap<Uuid, TrackedRecord>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeTopicSource {
    /// `query` is the canonical query the engine will ask for.
    pub fn set_search(&self, query: &str, results: Vec<SearchResultItem>) {
        self.searches.lock().insert(query.to_string(), results);
    }

    pub fn set_record(&self, record: TrackedRecord) {
        self.records.lock().insert(record.id, record);
    }

    pub fn remove_record(&self, id: Uuid) {
        self.records.lock().remove(&id);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Upstream("search api unavailable".into()));
        }
        Ok(())
    }
}

impl TopicSource for FakeTopicSource {
    fn search(&self, query: &str) -> Result<SearchResults> {
        self.check()?;
        let results = self.searches.lock().get(query).cloned().unwrap_or_default();
        Ok(SearchResults::new(results))
    }

    fn get_record(&self, id: Uuid) -> Result<Option<TrackedRecord>> {
        self.check()?;
        Ok(self.records.lock().get(&id).cloned())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn config() -> ServiceConfig {
    ServiceConfig {
        encryption_secret: "integration-test-secret".into(),
        templates: TemplateIds {
            confirm_search_subscription: "confirm-search".into(),
            confirm_record_subscription: "confirm-record".into(),
            confirm_update_email_address: "confirm-email".into(),
            search_updated: "search-updated".into(),
            record_updated: "record-updated".into(),
            subscribed_search: "subscribed-search".into(),
            subscribed_record: "subscribed-record".into(),
        },
        ..ServiceConfig::default()
    }
}

pub fn email(s: &str) -> EmailAddress {
    EmailAddress::parse(s).unwrap()
}

pub fn start_time() -> Timestamp {
    Timestamp::from_secs(1_700_000_000)
}

/// A service and an engine wired to the same repositories, clock and transport.
pub struct Harness {
    pub service: SubscriptionService,
    pub engine: SubscriptionEngine,
    pub repositories: Repositories,
    pub sender: Arc<PretendEmailSender>,
    pub clock: Arc<ManualClock>,
    pub source: Arc<FakeTopicSource>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Repositories::in_memory(), config())
    }

    pub fn with(repositories: Repositories, config: ServiceConfig) -> Self {
        init_tracing();

        let sender = Arc::new(PretendEmailSender::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let source = Arc::new(FakeTopicSource::default());

        let service = SubscriptionService::new(
            config.clone(),
            repositories.clone(),
            sender.clone(),
            clock.clone(),
        )
        .unwrap();
        let engine = SubscriptionEngine::new(
            &config,
            repositories.clone(),
            source.clone(),
            sender.clone(),
            clock.clone(),
        )
        .unwrap();

        Self {
            service,
            engine,
            repositories,
            sender,
            clock,
            source,
        }
    }

    /// Request and confirm a search subscription.
    pub fn subscribe_search(&self, to: &str, query: &str, keywords: Option<&str>, frequency: Frequency) -> SubscriptionKey {
        let outcome = self
            .service
            .request_search_subscription(email(to), query, keywords, frequency)
            .unwrap();
        let confirmed = self
            .service
            .confirm_search_subscription(&outcome.token.unwrap())
            .unwrap();
        confirmed.subscription_id.unwrap()
    }

    /// Request and confirm a record subscription.
    pub fn subscribe_record(&self, to: &str, id: Uuid, frequency: Frequency) -> SubscriptionKey {
        let outcome = self
            .service
            .request_record_subscription(email(to), id, None, frequency)
            .unwrap();
        let confirmed = self
            .service
            .confirm_record_subscription(&outcome.token.unwrap())
            .unwrap();
        confirmed.subscription_id.unwrap()
    }

    pub fn cycle(&self) -> CycleTally {
        self.engine.run_cycle(&CancellationSignal::new()).unwrap()
    }

    pub fn stored(&self, key: &SubscriptionKey) -> topicwatch::Subscription {
        self.repositories.subscriptions.get(key).unwrap().unwrap()
    }
}

pub fn item(id: Uuid, name: &str) -> SearchResultItem {
    SearchResultItem::new(id, name)
}
