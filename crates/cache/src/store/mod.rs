//! Build cache stores
//!
//! A store is a plain key to blob map. It knows nothing about packers or
//! output trees; the controller decides what the bytes mean.

mod local;
mod memory;

pub use local::LocalDirectoryStore;
pub use memory::InMemoryStore;

use crate::Result;
use crate::key::CacheKey;
use std::io::{Read, Write};

/// Byte-addressed storage for packed cache entries
///
/// Implementations must tolerate concurrent `load` and `store` calls from
/// independent invocations. Concurrent stores of the same key may race; the
/// last writer wins.
pub trait BuildCacheStore: Send + Sync {
    /// Look up `key` and hand the entry to `reader`
    ///
    /// Returns `false` without calling `reader` when the entry is absent.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read or `reader` fails
    fn load(
        &self,
        key: &CacheKey,
        reader: &mut dyn FnMut(&mut dyn Read) -> Result<()>,
    ) -> Result<bool>;

    /// Persist the bytes produced by `writer` under `key`, replacing any
    /// existing entry
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be written or `writer` fails
    fn store(
        &self,
        key: &CacheKey,
        writer: &mut dyn FnMut(&mut dyn Write) -> Result<()>,
    ) -> Result<()>;

    /// Short name used in log messages
    fn description(&self) -> String;
}
