//! Outbound email transport.

use super::template::{EmailDefinition, META_TOKEN};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Delivers one email. Implementations report any delivery problem as
/// [`Error::Transport`].
pub trait OutboundEmailSender: Send + Sync {
    fn send(&self, email: &EmailDefinition) -> Result<()>;
}

/// Records emails instead of sending them.
#[derive(Debug, Default)]
pub struct PretendEmailSender {
    sent: Mutex<Vec<EmailDefinition>>,
    failing: AtomicBool,
}

impl PretendEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send fails and nothing is recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailDefinition> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn last(&self) -> Option<EmailDefinition> {
        self.sent.lock().last().cloned()
    }

    /// Token of the most recent email that carried one.
    pub fn last_token(&self) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find_map(|e| e.metadata(META_TOKEN).map(str::to_string))
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl OutboundEmailSender for PretendEmailSender {
    fn send(&self, email: &EmailDefinition) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!(
                "pretend transport refused {:?} to {}",
                email.kind(),
                email.recipient()
            )));
        }

        tracing::debug!(
            template = email.template_id(),
            recipient = %email.recipient(),
            "Pretend email sent"
        );
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{Placeholder, TemplateKind};
    use crate::types::EmailAddress;
    use std::collections::BTreeMap;

    fn definition(token: &str) -> EmailDefinition {
        let replacements = BTreeMap::from([(Placeholder::ConfirmLink, format!("http://x/{token}"))]);
        EmailDefinition::new(
            TemplateKind::ConfirmUpdateEmailAddress,
            "t",
            EmailAddress::parse("a@b.com").unwrap(),
            replacements,
        )
        .unwrap()
        .with_metadata(META_TOKEN, token)
    }

    #[test]
    fn test_records_and_fails() {
        let sender = PretendEmailSender::new();
        sender.send(&definition("one")).unwrap();
        sender.send(&definition("two")).unwrap();
        assert_eq!(sender.count(), 2);
        assert_eq!(sender.last_token().as_deref(), Some("two"));

        sender.set_failing(true);
        assert!(matches!(sender.send(&definition("three")), Err(Error::Transport(_))));
        assert_eq!(sender.count(), 2);

        sender.clear();
        assert!(sender.last().is_none());
    }
}
