//! Absolute links embedded in emails.

use crate::config::UriTemplateOptions;
use crate::error::{Error, Result};
use crate::identity::SubscriptionKey;
use crate::types::EmailAddress;
use url::{form_urlencoded, Url};
use uuid::Uuid;

const TOKEN: &str = "@token";
const SUBSCRIPTION_ID: &str = "@subscriptionid";
const EMAIL_ADDRESS: &str = "@emailaddress";
const RECORD_ID: &str = "@recordid";
const CHANGE_SUMMARY_ID: &str = "@changesummaryid";

/// Resolves the configured relative link templates against the base url.
#[derive(Clone, Debug)]
pub struct UriTemplates {
    base: Url,
    options: UriTemplateOptions,
}

impl UriTemplates {
    pub fn new(options: UriTemplateOptions) -> Result<Self> {
        let base = Url::parse(&options.base_url)
            .map_err(|e| Error::Config(format!("uris.base_url: {e}")))?;
        Ok(Self { base, options })
    }

    fn make(&self, relative: &str) -> Result<String> {
        self.base
            .join(relative)
            .map(String::from)
            .map_err(|e| Error::Config(format!("link template `{relative}`: {e}")))
    }

    pub fn confirm_search_subscription(&self, token: &str) -> Result<String> {
        Ok(self.make(&self.options.confirm_search_subscription)?.replace(TOKEN, token))
    }

    pub fn confirm_record_subscription(&self, token: &str) -> Result<String> {
        Ok(self.make(&self.options.confirm_record_subscription)?.replace(TOKEN, token))
    }

    pub fn confirm_update_email_address(&self, token: &str) -> Result<String> {
        Ok(self.make(&self.options.confirm_update_email_address)?.replace(TOKEN, token))
    }

    pub fn manage_subscription(&self, key: &SubscriptionKey) -> Result<String> {
        Ok(self
            .make(&self.options.manage_subscription)?
            .replace(SUBSCRIPTION_ID, &key.to_string()))
    }

    pub fn search_changes_summary(&self, key: &SubscriptionKey, change_summary_id: Uuid) -> Result<String> {
        Ok(self
            .make(&self.options.search_changes_summary)?
            .replace(SUBSCRIPTION_ID, &key.to_string())
            .replace(CHANGE_SUMMARY_ID, &change_summary_id.to_string()))
    }

    /// The search page with `query` appended; a bare search page for an empty query.
    pub fn search(&self, query: &str) -> Result<String> {
        let url = self.make(&self.options.search)?;
        let url = url.trim_end_matches('?');
        let query = query.trim_start_matches('?');
        if query.is_empty() {
            Ok(url.to_string())
        } else {
            Ok(format!("{url}?{query}"))
        }
    }

    pub fn record_details(&self, record_id: Uuid) -> Result<String> {
        Ok(self
            .make(&self.options.record_details)?
            .replace(RECORD_ID, &record_id.to_string()))
    }

    pub fn unsubscribe(&self, key: &SubscriptionKey) -> Result<String> {
        Ok(self
            .make(&self.options.unsubscribe)?
            .replace(SUBSCRIPTION_ID, &key.to_string()))
    }

    pub fn unsubscribe_all(&self, email: &EmailAddress) -> Result<String> {
        let encoded: String = form_urlencoded::byte_serialize(email.as_str().as_bytes()).collect();
        Ok(self
            .make(&self.options.unsubscribe_all)?
            .replace(EMAIL_ADDRESS, &encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uris() -> UriTemplates {
        UriTemplates::new(UriTemplateOptions {
            base_url: "https://watch.example.org/".into(),
            ..UriTemplateOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn test_token_link() {
        let link = uris().confirm_search_subscription("abc_-1").unwrap();
        assert_eq!(link, "https://watch.example.org/subscriptions/confirm-search?tok=abc_-1");
    }

    #[test]
    fn test_unsubscribe_all_encodes_email() {
        let email = EmailAddress::parse("bob+news@example.com").unwrap();
        let link = uris().unsubscribe_all(&email).unwrap();
        assert_eq!(
            link,
            "https://watch.example.org/subscriptions/unsubscribe-all?email=bob%2Bnews%40example.com"
        );
    }

    #[test]
    fn test_search_link() {
        assert_eq!(uris().search("").unwrap(), "https://watch.example.org/search");
        assert_eq!(
            uris().search("name=bob&page=2").unwrap(),
            "https://watch.example.org/search?name=bob&page=2"
        );
    }

    #[test]
    fn test_changes_summary_link_uses_both_ids() {
        let key = SubscriptionKey::new("p", "r").unwrap();
        let change = Uuid::new_v4();
        let link = uris().search_changes_summary(&key, change).unwrap();
        assert!(link.ends_with(&format!("/subscriptions/manage/p$r/changes/{change}")));
    }

    #[test]
    fn test_bad_base_url() {
        let options = UriTemplateOptions {
            base_url: "not a url".into(),
            ..UriTemplateOptions::default()
        };
        assert!(matches!(UriTemplates::new(options), Err(Error::Config(_))));
    }
}
