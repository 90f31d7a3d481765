//! Authenticated encryption of token payloads.

use super::ExpiringToken;
use crate::error::{DomainError, Error, Result};
use crate::types::Timestamp;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

const NONCE_SIZE: usize = 12;

/// Turns serializable payloads into opaque, URL-safe strings and back.
///
/// Layout: `base64url(nonce || ciphertext)`. The GCM tag makes any
/// modification of the string fail to open.
pub struct TokenSealer {
    cipher: Aes256Gcm,
}

impl TokenSealer {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(Error::Config("token secret is empty".into()));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(&derive_key(secret)),
        })
    }

    /// A fresh random secret suitable for `ServiceConfig::encryption_secret`.
    pub fn generate_secret() -> String {
        let key = Aes256Gcm::generate_key(OsRng);
        URL_SAFE_NO_PAD.encode(key)
    }

    pub fn seal<T: Serialize>(&self, value: &T) -> Result<String> {
        let plaintext = serde_json::to_vec(value)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| Error::Crypto(format!("Encryption failed: {e}")))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Every failure here is reported as `InvalidToken`: callers get no hint
    /// about which stage rejected the input.
    pub fn open<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let combined = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| DomainError::InvalidToken)?;

        if combined.len() <= NONCE_SIZE {
            return Err(DomainError::InvalidToken.into());
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| DomainError::InvalidToken)?;

        serde_json::from_slice(&plaintext).map_err(|_| DomainError::InvalidToken.into())
    }

    /// Seal `payload` in an envelope valid for `validity_hours` from `now`.
    pub fn enclose<T: Serialize>(&self, payload: T, now: Timestamp, validity_hours: i64) -> Result<String> {
        self.seal(&ExpiringToken::new(payload, now, validity_hours))
    }

    /// Open an envelope and return its payload if it has not expired at `now`.
    pub fn disclose<T: DeserializeOwned>(&self, token: &str, now: Timestamp) -> Result<T> {
        let envelope: ExpiringToken<T> = self.open(token)?;
        Ok(envelope.into_valid_payload(now)?)
    }
}

fn derive_key(secret: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(secret.as_bytes());
    let mut key = Key::<Aes256Gcm>::default();
    key.copy_from_slice(&digest);
    key
}
