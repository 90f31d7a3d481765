//! Time-boxed payload envelope.

use crate::error::DomainError;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// A payload that stops being acceptable at `expires_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringToken<T> {
    pub payload: T,
    pub expires_at: Timestamp,
}

impl<T> ExpiringToken<T> {
    pub fn new(payload: T, issued_at: Timestamp, validity_hours: i64) -> Self {
        Self {
            payload,
            expires_at: issued_at.plus_hours(validity_hours),
        }
    }

    pub fn is_valid(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }

    /// The payload, or `TokenExpired` once `now` reaches `expires_at`.
    pub fn into_valid_payload(self, now: Timestamp) -> Result<T, DomainError> {
        if self.is_valid(now) {
            Ok(self.payload)
        } else {
            Err(DomainError::TokenExpired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let issued = Timestamp::from_secs(0);
        let token = ExpiringToken::new("x", issued, 1);

        assert!(token.is_valid(issued.plus_minutes(59)));
        assert!(!token.is_valid(issued.plus_hours(1)));
        assert_eq!(
            token.into_valid_payload(issued.plus_hours(2)),
            Err(DomainError::TokenExpired)
        );
    }
}
