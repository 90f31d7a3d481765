//! Error types for the subscription engine.
//!
//! Three classes are kept apart:
//! - validation outcomes (`ValidationResult`) are plain values and never appear here,
//! - [`DomainError`] covers business-rule failures a caller is expected to handle,
//! - everything else is infrastructure (storage, upstream source, email transport).

use thiserror::Error;

/// Business-rule failures raised by the request-facing service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid subscription id: {0}")]
    InvalidSubscriptionId(String),

    #[error("Confirmation token is malformed or has been tampered with")]
    InvalidToken,

    #[error("Confirmation token has expired")]
    TokenExpired,

    #[error("Confirmation token was issued for a {expected} subscription, got {got}")]
    TopicKindMismatch { expected: String, got: String },

    #[error("The email address supplied is the same as the one on the subscription")]
    EmailNotDifferent,

    #[error("The requested email address is on the block list")]
    EmailBlocked,

    #[error("Already subscribed to this topic under the updated email address")]
    AlreadySubscribedUnderNewEmail,

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),
}

/// Storage backend failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,
}

/// Main error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Upstream source error: {0}")]
    Upstream(String),

    #[error("Email transport error: {0}")]
    Transport(String),

    #[error("Email template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl Error {
    /// True for business-rule failures, false for infrastructure failures.
    pub fn is_domain(&self) -> bool {
        matches!(self, Error::Domain(_))
    }

    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Error::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Store(StoreError::Io(e))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store(e.into())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Store(e.into())
    }
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_classification() {
        let domain: Error = DomainError::TokenExpired.into();
        assert!(domain.is_domain());
        assert_eq!(domain.as_domain(), Some(&DomainError::TokenExpired));

        let infra: Error = StoreError::Locked.into();
        assert!(!infra.is_domain());
        assert!(infra.as_domain().is_none());
    }

    #[test]
    fn test_io_maps_to_store() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(err, Error::Store(StoreError::Io(_))));
    }
}
