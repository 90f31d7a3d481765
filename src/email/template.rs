//! Template kinds, placeholders and the outgoing email definition.

use crate::error::{Error, Result};
use crate::types::EmailAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key carrying the confirmation token.
pub const META_TOKEN: &str = "token";

/// Metadata key carrying the change summary id of a search notification.
pub const META_CHANGE_SUMMARY_ID: &str = "change_summary_id";

/// Metadata key carrying the public subscription id.
pub const META_SUBSCRIPTION_ID: &str = "subscription_id";

/// Every value an email template may have substituted into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
    ConfirmLink,
    ManageSubscriptionLink,
    UnsubscribeLink,
    UnsubscribeAllLink,
    ViewRecordLink,
    ViewSearchLink,
    ViewSearchChangesSummary,
    RecordName,
    SearchTopicName,
}

impl Placeholder {
    /// Name as it appears in the provider's template.
    pub fn as_str(self) -> &'static str {
        match self {
            Placeholder::ConfirmLink => "confirm_link",
            Placeholder::ManageSubscriptionLink => "manage_subscription_link",
            Placeholder::UnsubscribeLink => "unsubscribe_link",
            Placeholder::UnsubscribeAllLink => "unsubscribe_all_link",
            Placeholder::ViewRecordLink => "view_record_link",
            Placeholder::ViewSearchLink => "view_search_link",
            Placeholder::ViewSearchChangesSummary => "view_search_changes_summary",
            Placeholder::RecordName => "record_name",
            Placeholder::SearchTopicName => "search_topic_name",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kinds of email the system sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    ConfirmSearchSubscription,
    ConfirmRecordSubscription,
    ConfirmUpdateEmailAddress,
    SearchUpdated,
    RecordUpdated,
    SubscribedSearch,
    SubscribedRecord,
}

impl TemplateKind {
    /// Exactly the placeholders a definition of this kind must fill.
    pub fn required_placeholders(self) -> &'static [Placeholder] {
        use Placeholder::*;
        match self {
            TemplateKind::ConfirmSearchSubscription => &[ConfirmLink, SearchTopicName],
            TemplateKind::ConfirmRecordSubscription => &[ConfirmLink, RecordName],
            TemplateKind::ConfirmUpdateEmailAddress => &[ConfirmLink],
            TemplateKind::SearchUpdated => &[
                ViewSearchLink,
                ViewSearchChangesSummary,
                SearchTopicName,
                ManageSubscriptionLink,
                UnsubscribeLink,
                UnsubscribeAllLink,
            ],
            TemplateKind::RecordUpdated | TemplateKind::SubscribedRecord => &[
                ViewRecordLink,
                RecordName,
                ManageSubscriptionLink,
                UnsubscribeLink,
                UnsubscribeAllLink,
            ],
            TemplateKind::SubscribedSearch => &[
                ViewSearchLink,
                SearchTopicName,
                ManageSubscriptionLink,
                UnsubscribeLink,
                UnsubscribeAllLink,
            ],
        }
    }
}

/// A fully resolved outgoing email, ready for the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDefinition {
    kind: TemplateKind,
    template_id: String,
    recipient: EmailAddress,
    replacements: BTreeMap<Placeholder, String>,
    metadata: BTreeMap<String, String>,
}

impl EmailDefinition {
    /// Fails with [`Error::Template`] unless `replacements` fills exactly the
    /// placeholders `kind` requires.
    pub fn new(
        kind: TemplateKind,
        template_id: impl Into<String>,
        recipient: EmailAddress,
        replacements: BTreeMap<Placeholder, String>,
    ) -> Result<Self> {
        let required = kind.required_placeholders();

        if let Some(missing) = required.iter().find(|p| !replacements.contains_key(*p)) {
            return Err(Error::Template(format!("{kind:?} is missing `{missing}`")));
        }
        if let Some(extra) = replacements.keys().find(|p| !required.contains(*p)) {
            return Err(Error::Template(format!("{kind:?} does not use `{extra}`")));
        }

        Ok(Self {
            kind,
            template_id: template_id.into(),
            recipient,
            replacements,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn recipient(&self) -> &EmailAddress {
        &self.recipient
    }

    pub fn replacement(&self, placeholder: Placeholder) -> Option<&str> {
        self.replacements.get(&placeholder).map(String::as_str)
    }

    /// Replacements keyed by their template names, as a provider expects them.
    pub fn replacements(&self) -> BTreeMap<&'static str, &str> {
        self.replacements
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
