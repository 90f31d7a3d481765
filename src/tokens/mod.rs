//! Confirmation tokens.
//!
//! A request that needs the recipient's consent is wrapped in an
//! [`ExpiringToken`], sealed by [`TokenSealer`] and sent out in a link.
//! Nothing is persisted: the token itself carries the pending request.

mod envelope;
mod sealer;

pub use envelope::ExpiringToken;
pub use sealer::TokenSealer;
