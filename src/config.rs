//! Configuration for the store, the engine and the request-facing service.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File-backed store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Blob cache size (number of blobs).
    pub blob_cache_size: usize,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./subscriptions"),
            blob_cache_size: 1000,
            create_if_missing: true,
        }
    }
}

/// Scan loop tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Subscriptions fetched per page during a cycle.
    pub page_size: usize,

    /// Subscriptions processed concurrently within a page. 1 = sequential.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            workers: 1,
        }
    }
}

/// Email provider template ids, one per kind of outgoing email.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateIds {
    pub confirm_search_subscription: String,
    pub confirm_record_subscription: String,
    pub confirm_update_email_address: String,
    pub search_updated: String,
    pub record_updated: String,
    pub subscribed_search: String,
    pub subscribed_record: String,
}

impl TemplateIds {
    fn validate(&self) -> Result<()> {
        let ids = [
            ("confirm_search_subscription", &self.confirm_search_subscription),
            ("confirm_record_subscription", &self.confirm_record_subscription),
            ("confirm_update_email_address", &self.confirm_update_email_address),
            ("search_updated", &self.search_updated),
            ("record_updated", &self.record_updated),
            ("subscribed_search", &self.subscribed_search),
            ("subscribed_record", &self.subscribed_record),
        ];
        for (name, id) in ids {
            if id.trim().is_empty() {
                return Err(Error::Config(format!("template id `{name}` is not set")));
            }
        }
        Ok(())
    }
}

/// Link templates relative to `base_url`.
///
/// Placeholders: `@token`, `@subscriptionid`, `@emailaddress`, `@recordid`,
/// `@changesummaryid`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UriTemplateOptions {
    pub base_url: String,
    pub confirm_search_subscription: String,
    pub confirm_record_subscription: String,
    pub confirm_update_email_address: String,
    pub manage_subscription: String,
    pub search: String,
    pub record_details: String,
    pub unsubscribe: String,
    pub unsubscribe_all: String,
    pub search_changes_summary: String,
}

impl Default for UriTemplateOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
            confirm_search_subscription: "/subscriptions/confirm-search?tok=@token".to_string(),
            confirm_record_subscription: "/subscriptions/confirm-record?tok=@token".to_string(),
            confirm_update_email_address: "/subscriptions/confirm-email?tok=@token".to_string(),
            manage_subscription: "/subscriptions/manage/@subscriptionid".to_string(),
            search: "/search".to_string(),
            record_details: "/records/@recordid".to_string(),
            unsubscribe: "/subscriptions/unsubscribe/@subscriptionid".to_string(),
            unsubscribe_all: "/subscriptions/unsubscribe-all?email=@emailaddress".to_string(),
            search_changes_summary: "/subscriptions/manage/@subscriptionid/changes/@changesummaryid"
                .to_string(),
        }
    }
}

/// Everything the service and engine need besides their collaborators.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Secret the token key is derived from.
    pub encryption_secret: String,

    /// Query-string keys carrying paging/sorting data. Removed before a search is keyed.
    pub search_query_remove_keys: Vec<String>,

    /// How long a confirmation link stays valid.
    pub token_validity_hours: i64,

    /// Default page size for `list_subscriptions`.
    pub list_page_size: usize,

    /// Prefix of a search topic's display name.
    pub search_topic_prefix: String,

    pub templates: TemplateIds,
    pub uris: UriTemplateOptions,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            encryption_secret: String::new(),
            search_query_remove_keys: vec![
                "pagenumber".to_string(),
                "pagesize".to_string(),
                "sort".to_string(),
            ],
            token_validity_hours: 7 * 24,
            list_page_size: 20,
            search_topic_prefix: "Search results".to_string(),
            templates: TemplateIds::default(),
            uris: UriTemplateOptions::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ServiceConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.encryption_secret.trim().is_empty() {
            return Err(Error::Config("encryption_secret is not set".into()));
        }
        if self.token_validity_hours <= 0 {
            return Err(Error::Config("token_validity_hours must be positive".into()));
        }
        if self.list_page_size == 0 || self.engine.page_size == 0 {
            return Err(Error::Config("page sizes must be positive".into()));
        }
        if self.engine.workers == 0 {
            return Err(Error::Config("engine.workers must be at least 1".into()));
        }
        url::Url::parse(&self.uris.base_url)
            .map_err(|e| Error::Config(format!("uris.base_url: {e}")))?;
        self.templates.validate()
    }
}
