//! Cache key derivation.
//!
//! Every tier looks entries up by the same [`CacheKey`], and the disk tier uses
//! it verbatim as the filename. [`CacheKey::derive`] is the only place the
//! identifier and tag are combined.

use sha2::{Digest, Sha256};
use std::fmt;

/// Number of digest bytes kept in a key (128 bits).
const KEY_BYTES: usize = 16;

/// Fixed-length fingerprint of a (resource identifier, variant tag) pair.
///
/// Rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `identifier`, optionally qualified by a variant `tag`.
    ///
    /// The identifier and tag are concatenated (an absent tag contributes the
    /// empty string) and hashed with SHA-256, truncated to 128 bits.
    ///
    /// # Example
    ///
    /// ```
    /// use telescope::cache::CacheKey;
    ///
    /// let canonical = CacheKey::derive("https://example.com/cat.png", None);
    /// let edited = CacheKey::derive("https://example.com/cat.png", Some("crop"));
    ///
    /// assert_eq!(canonical.as_str().len(), 32);
    /// assert_ne!(canonical, edited);
    /// ```
    pub fn derive(identifier: &str, tag: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        hasher.update(tag.unwrap_or("").as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    /// Rebuild a key from its hex rendering, as stored in the index file.
    ///
    /// Returns `None` unless `hex` is exactly 32 lowercase hex characters.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == KEY_BYTES * 2
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex.to_string()))
    }

    /// The hex rendering of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
