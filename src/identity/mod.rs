//! Identity and key derivation.
//!
//! Keys are deterministic so that "already subscribed" is a point lookup:
//! the partition is the SHA-256 of the normalized email, the row is the
//! SHA-256 of the canonical search query or the record id itself.

mod key;
mod query;

pub use key::{SubscriptionKey, KEY_SEPARATOR};
pub use query::{canonicalize_query, CanonicalQuery};
