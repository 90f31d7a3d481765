//! Builds each kind of outgoing email.

use super::template::{
    EmailDefinition, Placeholder, TemplateKind, META_CHANGE_SUMMARY_ID, META_SUBSCRIPTION_ID, META_TOKEN,
};
use super::uris::UriTemplates;
use crate::config::{ServiceConfig, TemplateIds};
use crate::error::Result;
use crate::identity::SubscriptionKey;
use crate::types::{EmailAddress, Topic};
use std::collections::BTreeMap;
use uuid::Uuid;

pub struct EmailComposer {
    templates: TemplateIds,
    uris: UriTemplates,
    search_topic_prefix: String,
}

impl EmailComposer {
    pub fn new(templates: TemplateIds, uris: UriTemplates, search_topic_prefix: impl Into<String>) -> Self {
        Self {
            templates,
            uris,
            search_topic_prefix: search_topic_prefix.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self::new(
            config.templates.clone(),
            UriTemplates::new(config.uris.clone())?,
            config.search_topic_prefix.clone(),
        ))
    }

    pub fn uris(&self) -> &UriTemplates {
        &self.uris
    }

    /// `"<prefix> for '<keywords>'"`, or the bare prefix without keywords.
    pub fn search_topic_name(&self, keywords: Option<&str>) -> String {
        match keywords.map(str::trim).filter(|k| !k.is_empty()) {
            Some(keywords) => format!("{} for '{}'", self.search_topic_prefix, keywords),
            None => self.search_topic_prefix.clone(),
        }
    }

    pub fn confirm_search_subscription(
        &self,
        recipient: &EmailAddress,
        token: &str,
        keywords: Option<&str>,
    ) -> Result<EmailDefinition> {
        let replacements = BTreeMap::from([
            (Placeholder::ConfirmLink, self.uris.confirm_search_subscription(token)?),
            (Placeholder::SearchTopicName, self.search_topic_name(keywords)),
        ]);
        Ok(EmailDefinition::new(
            TemplateKind::ConfirmSearchSubscription,
            &self.templates.confirm_search_subscription,
            recipient.clone(),
            replacements,
        )?
        .with_metadata(META_TOKEN, token))
    }

    pub fn confirm_record_subscription(
        &self,
        recipient: &EmailAddress,
        token: &str,
        record_name: &str,
    ) -> Result<EmailDefinition> {
        let replacements = BTreeMap::from([
            (Placeholder::ConfirmLink, self.uris.confirm_record_subscription(token)?),
            (Placeholder::RecordName, record_name.to_string()),
        ]);
        Ok(EmailDefinition::new(
            TemplateKind::ConfirmRecordSubscription,
            &self.templates.confirm_record_subscription,
            recipient.clone(),
            replacements,
        )?
        .with_metadata(META_TOKEN, token))
    }

    pub fn confirm_update_email_address(&self, recipient: &EmailAddress, token: &str) -> Result<EmailDefinition> {
        let replacements = BTreeMap::from([(
            Placeholder::ConfirmLink,
            self.uris.confirm_update_email_address(token)?,
        )]);
        Ok(EmailDefinition::new(
            TemplateKind::ConfirmUpdateEmailAddress,
            &self.templates.confirm_update_email_address,
            recipient.clone(),
            replacements,
        )?
        .with_metadata(META_TOKEN, token))
    }

    /// "You are now subscribed", sent once a subscription has been initialised.
    pub fn subscribed(&self, recipient: &EmailAddress, key: &SubscriptionKey, topic: &Topic) -> Result<EmailDefinition> {
        let mut replacements = self.management_links(recipient, key)?;
        let (kind, template_id) = match topic {
            Topic::Search { query, label } => {
                replacements.insert(Placeholder::ViewSearchLink, self.uris.search(query)?);
                replacements.insert(Placeholder::SearchTopicName, self.search_topic_name(label.as_deref()));
                (TemplateKind::SubscribedSearch, &self.templates.subscribed_search)
            }
            Topic::Record { id, name } => {
                replacements.insert(Placeholder::ViewRecordLink, self.uris.record_details(*id)?);
                replacements.insert(Placeholder::RecordName, record_name(*id, name.as_deref()));
                (TemplateKind::SubscribedRecord, &self.templates.subscribed_record)
            }
        };
        Ok(EmailDefinition::new(kind, template_id, recipient.clone(), replacements)?
            .with_metadata(META_SUBSCRIPTION_ID, key.to_string()))
    }

    pub fn search_updated(
        &self,
        recipient: &EmailAddress,
        key: &SubscriptionKey,
        query: &str,
        keywords: Option<&str>,
        change_summary_id: Uuid,
    ) -> Result<EmailDefinition> {
        let mut replacements = self.management_links(recipient, key)?;
        replacements.insert(Placeholder::ViewSearchLink, self.uris.search(query)?);
        replacements.insert(
            Placeholder::ViewSearchChangesSummary,
            self.uris.search_changes_summary(key, change_summary_id)?,
        );
        replacements.insert(Placeholder::SearchTopicName, self.search_topic_name(keywords));

        Ok(EmailDefinition::new(
            TemplateKind::SearchUpdated,
            &self.templates.search_updated,
            recipient.clone(),
            replacements,
        )?
        .with_metadata(META_SUBSCRIPTION_ID, key.to_string())
        .with_metadata(META_CHANGE_SUMMARY_ID, change_summary_id.to_string()))
    }

    pub fn record_updated(
        &self,
        recipient: &EmailAddress,
        key: &SubscriptionKey,
        record_id: Uuid,
        name: Option<&str>,
    ) -> Result<EmailDefinition> {
        let mut replacements = self.management_links(recipient, key)?;
        replacements.insert(Placeholder::ViewRecordLink, self.uris.record_details(record_id)?);
        replacements.insert(Placeholder::RecordName, record_name(record_id, name));

        Ok(EmailDefinition::new(
            TemplateKind::RecordUpdated,
            &self.templates.record_updated,
            recipient.clone(),
            replacements,
        )?
        .with_metadata(META_SUBSCRIPTION_ID, key.to_string()))
    }

    fn management_links(
        &self,
        recipient: &EmailAddress,
        key: &SubscriptionKey,
    ) -> Result<BTreeMap<Placeholder, String>> {
        Ok(BTreeMap::from([
            (Placeholder::ManageSubscriptionLink, self.uris.manage_subscription(key)?),
            (Placeholder::UnsubscribeLink, self.uris.unsubscribe(key)?),
            (Placeholder::UnsubscribeAllLink, self.uris.unsubscribe_all(recipient)?),
        ]))
    }
}

/// Records without a known name are shown by id.
pub fn record_name(id: Uuid, name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UriTemplateOptions;

    fn composer() -> EmailComposer {
        let templates = TemplateIds {
            confirm_search_subscription: "t-confirm-search".into(),
            confirm_record_subscription: "t-confirm-record".into(),
            confirm_update_email_address: "t-confirm-email".into(),
            search_updated: "t-search-updated".into(),
            record_updated: "t-record-updated".into(),
            subscribed_search: "t-subscribed-search".into(),
            subscribed_record: "t-subscribed-record".into(),
        };
        let uris = UriTemplates::new(UriTemplateOptions::default()).unwrap();
        EmailComposer::new(templates, uris, "Search results")
    }

    fn email() -> EmailAddress {
        EmailAddress::parse("a@b.com").unwrap()
    }

    #[test]
    fn test_search_topic_name() {
        let c = composer();
        assert_eq!(c.search_topic_name(Some("bob")), "Search results for 'bob'");
        assert_eq!(c.search_topic_name(Some("  ")), "Search results");
        assert_eq!(c.search_topic_name(None), "Search results");
    }

    #[test]
    fn test_confirm_carries_token() {
        let def = composer()
            .confirm_search_subscription(&email(), "tok123", Some("bob"))
            .unwrap();
        assert_eq!(def.template_id(), "t-confirm-search");
        assert_eq!(def.metadata(META_TOKEN), Some("tok123"));
        assert!(def.replacement(Placeholder::ConfirmLink).unwrap().ends_with("tok=tok123"));
    }

    #[test]
    fn test_search_updated_links() {
        let key = SubscriptionKey::new("p", "r").unwrap();
        let change = Uuid::new_v4();
        let def = composer()
            .search_updated(&email(), &key, "name=bob", Some("bob"), change)
            .unwrap();

        assert_eq!(def.kind(), TemplateKind::SearchUpdated);
        assert_eq!(def.metadata(META_CHANGE_SUMMARY_ID), Some(change.to_string().as_str()));
        assert_eq!(def.metadata(META_SUBSCRIPTION_ID), Some("p$r"));
        assert_eq!(
            def.replacement(Placeholder::ViewSearchLink),
            Some("http://localhost/search?name=bob")
        );
    }

    #[test]
    fn test_subscribed_record_falls_back_to_id() {
        let id = Uuid::new_v4();
        let key = SubscriptionKey::new("p", id.to_string()).unwrap();
        let topic = Topic::Record { id, name: None };
        let def = composer().subscribed(&email(), &key, &topic).unwrap();

        assert_eq!(def.kind(), TemplateKind::SubscribedRecord);
        assert_eq!(def.replacement(Placeholder::RecordName), Some(id.to_string().as_str()));
    }
}
