//! Map-based build cache store

use super::BuildCacheStore;
use crate::key::CacheKey;
use crate::Result;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{PoisonError, RwLock};

/// Keeps entries in memory, keyed by the hex form of the cache key
///
/// Useful as a remote stand-in and for tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry exists for `key`
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key.hash_code())
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the entry for `key`
    pub fn remove(&self, key: &CacheKey) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.hash_code());
    }
}

impl BuildCacheStore for InMemoryStore {
    fn load(
        &self,
        key: &CacheKey,
        reader: &mut dyn FnMut(&mut dyn Read) -> Result<()>,
    ) -> Result<bool> {
        // Copy out so the lock is not held while the reader runs
        let entry = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.hash_code())
            .cloned();
        match entry {
            Some(bytes) => {
                reader(&mut bytes.as_slice())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn store(
        &self,
        key: &CacheKey,
        writer: &mut dyn FnMut(&mut dyn Write) -> Result<()>,
    ) -> Result<()> {
        let mut bytes = Vec::new();
        writer(&mut bytes)?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.hash_code(), bytes);
        Ok(())
    }

    fn description(&self) -> String {
        "in-memory".to_string()
    }
}
