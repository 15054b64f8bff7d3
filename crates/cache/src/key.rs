//! Build cache keys
//!
//! A [`CacheKey`] is a SHA-256 digest over everything that can influence the
//! outputs of a unit of work. Keys are assembled with a [`CacheKeyBuilder`],
//! which folds primitive values into the digest in call order:
//!
//! ```
//! use cairn_cache::CacheKeyBuilder;
//!
//! let key = CacheKeyBuilder::new()
//!     .put_string("compileJava")
//!     .put_bytes(b"input fingerprint")
//!     .put_boolean(true)
//!     .build();
//! assert_eq!(key.hash_code().len(), 64);
//! ```
//!
//! Reordering two `put_*` calls produces a different key.

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::trace;

/// Number of bytes in a cache key digest
pub const CACHE_KEY_LEN: usize = 32;

/// An immutable, content-derived cache key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; CACHE_KEY_LEN]);

impl CacheKey {
    /// Parse a key from its lowercase hex representation
    ///
    /// # Errors
    ///
    /// Returns error if the string is not 64 hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::configuration(format!("Invalid cache key '{hex_str}': {e}")))?;
        let digest: [u8; CACHE_KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::configuration(format!(
                "Cache key must be {} hex characters, got {}",
                CACHE_KEY_LEN * 2,
                hex_str.len()
            ))
        })?;
        Ok(Self(digest))
    }

    /// The digest rendered as lowercase hex; used as the storage name of the entry
    #[must_use]
    pub fn hash_code(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw digest bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CACHE_KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash_code())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.hash_code())
    }
}

/// Append-only builder for a [`CacheKey`]
///
/// Create a fresh builder for every key computation; [`CacheKeyBuilder::build`]
/// consumes it.
pub struct CacheKeyBuilder {
    hasher: Sha256,
}

impl CacheKeyBuilder {
    /// Start a new key computation
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Append a single byte
    #[must_use]
    pub fn put_byte(mut self, value: u8) -> Self {
        trace!(value, "Appending byte to cache key");
        self.hasher.update([value]);
        self
    }

    /// Append a length-prefixed byte array
    #[must_use]
    pub fn put_bytes(mut self, value: &[u8]) -> Self {
        trace!(value = %render_bytes(value), "Appending bytes to cache key");
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value);
        self
    }

    /// Append a 32-bit integer
    #[must_use]
    pub fn put_int(mut self, value: i32) -> Self {
        trace!(value, "Appending int to cache key");
        self.hasher.update(value.to_le_bytes());
        self
    }

    /// Append a 64-bit integer
    #[must_use]
    pub fn put_long(mut self, value: i64) -> Self {
        trace!(value, "Appending long to cache key");
        self.hasher.update(value.to_le_bytes());
        self
    }

    /// Append a double by its IEEE-754 bit pattern
    #[must_use]
    pub fn put_double(mut self, value: f64) -> Self {
        trace!(value, "Appending double to cache key");
        self.hasher.update(value.to_bits().to_le_bytes());
        self
    }

    /// Append a boolean as one byte
    #[must_use]
    pub fn put_boolean(mut self, value: bool) -> Self {
        trace!(value, "Appending boolean to cache key");
        self.hasher.update([u8::from(value)]);
        self
    }

    /// Append a length-prefixed UTF-8 string
    #[must_use]
    pub fn put_string(mut self, value: &str) -> Self {
        trace!(value, "Appending string to cache key");
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    /// Finish the computation
    #[must_use]
    pub fn build(self) -> CacheKey {
        let digest = self.hasher.finalize();
        let mut bytes = [0u8; CACHE_KEY_LEN];
        bytes.copy_from_slice(&digest);
        let key = CacheKey(bytes);
        trace!(key = %key, "Built cache key");
        key
    }
}

impl Default for CacheKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheKeyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheKeyBuilder").finish_non_exhaustive()
    }
}

/// Render bytes as colon separated hex, e.g. `0a:ff:10`
fn render_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Determinism
    // ==========================================================================

    #[test]
    fn test_same_sequence_same_key() {
        let build = || {
            CacheKeyBuilder::new()
                .put_string("task")
                .put_int(42)
                .put_long(-7)
                .put_double(1.5)
                .put_boolean(false)
                .put_byte(3)
                .put_bytes(&[1, 2, 3])
                .build()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_empty_builder_is_sha256_of_nothing() {
        let key = CacheKeyBuilder::new().build();
        assert_eq!(
            key.hash_code(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    // ==========================================================================
    // Sensitivity
    // ==========================================================================

    #[test]
    fn test_reordering_changes_key() {
        let a = CacheKeyBuilder::new().put_int(1).put_long(2).build();
        let b = CacheKeyBuilder::new().put_long(2).put_int(1).build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_strings_cannot_be_resplit() {
        let a = CacheKeyBuilder::new().put_string("ab").put_string("c").build();
        let b = CacheKeyBuilder::new().put_string("a").put_string("bc").build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_boolean_value_matters() {
        let a = CacheKeyBuilder::new().put_boolean(true).build();
        let b = CacheKeyBuilder::new().put_boolean(false).build();
        assert_ne!(a, b);
    }

    // ==========================================================================
    // Representation
    // ==========================================================================

    #[test]
    fn test_hex_round_trip() {
        let key = CacheKeyBuilder::new().put_string("round trip").build();
        let parsed = CacheKey::from_hex(&key.hash_code()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(key.to_string(), key.hash_code());
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(CacheKey::from_hex("abcd").is_err());
        assert!(CacheKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_render_bytes() {
        assert_eq!(render_bytes(&[0x0a, 0xff, 0x10]), "0a:ff:10");
        assert_eq!(render_bytes(&[]), "");
    }
}
