//! Outgoing email.
//!
//! Each email is an [`EmailDefinition`]: a provider template id, a recipient
//! and a closed set of [`Placeholder`] replacements checked against the
//! [`TemplateKind`]. Delivery goes through an [`OutboundEmailSender`].

mod composer;
mod sender;
mod template;
mod uris;

pub use composer::{record_name, EmailComposer};
pub use sender::{OutboundEmailSender, PretendEmailSender};
pub use template::{
    EmailDefinition, Placeholder, TemplateKind, META_CHANGE_SUMMARY_ID, META_SUBSCRIPTION_ID, META_TOKEN,
};
pub use uris::UriTemplates;
