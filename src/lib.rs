//! # topicwatch
//!
//! Email subscriptions to changing data: a saved search's result set or a
//! single tracked record.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: one per (email, topic), keyed deterministically
//! - **Tokens**: sealed, expiring confirmation requests; nothing is stored until confirmed
//! - **Thumbprints**: SHA-256 of a topic's canonical JSON; equal means unchanged
//! - **Cycles**: a scan over all subscriptions that initialises, skips or notifies each
//!
//! ## Example
//!
//! ```ignore
//! use topicwatch::*;
//! use std::sync::Arc;
//!
//! let store = DataStore::open_or_create(StoreConfig {
//!     path: "./subscriptions".into(),
//!     ..Default::default()
//! })?;
//! let config = ServiceConfig::from_json_file("topicwatch.json")?;
//! let sender = Arc::new(PretendEmailSender::new());
//! let clock = Arc::new(SystemClock);
//!
//! let service = SubscriptionService::new(config.clone(), store.repositories(), sender.clone(), clock.clone())?;
//! let email = EmailAddress::parse("someone@example.com")?;
//! let outcome = service.request_search_subscription(email, "?name=bob&pagenumber=2", Some("bob"), Frequency::Daily)?;
//!
//! // The token comes back through the confirmation link.
//! service.confirm_search_subscription(&outcome.token.unwrap())?;
//!
//! let engine = SubscriptionEngine::new(&config, store.repositories(), my_source, sender, clock)?;
//! let tally = engine.run_cycle(&CancellationSignal::new())?;
//! ```

pub mod clock;
pub mod config;
pub mod detect;
pub mod email;
pub mod engine;
pub mod error;
pub mod identity;
pub mod service;
pub mod storage;
pub mod tokens;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, ServiceConfig, StoreConfig, TemplateIds, UriTemplateOptions};
pub use detect::{
    ChangeSummary, ModifiedEntry, SearchResultItem, SearchResults, TopicContent, TopicSource,
    TrackedRecord,
};
pub use email::{
    EmailComposer, EmailDefinition, OutboundEmailSender, Placeholder, PretendEmailSender,
    TemplateKind, UriTemplates,
};
pub use engine::{CancellationSignal, CycleOutcome, CycleTally, SubscriptionEngine};
pub use error::{DomainError, Error, Result, StoreError};
pub use identity::{canonicalize_query, CanonicalQuery, SubscriptionKey};
pub use service::{
    ConfirmOutcome, RequestOutcome, SubscriptionInfo, SubscriptionList, SubscriptionRequest,
    SubscriptionService, ValidationResult,
};
pub use storage::{DataStore, Repositories, Subscription};
pub use tokens::{ExpiringToken, TokenSealer};
pub use types::*;
