//! Build cache controller
//!
//! Ties a packer to up to two stores. Loading tries the local store first and
//! falls back to the remote store; a remote hit is copied into the local
//! store. Storing packs the outputs once and pushes the bytes to every store
//! configured for pushing.

use crate::key::CacheKey;
use crate::origin::OriginMetadata;
use crate::packer::{OutputPacker, UnpackResult, remove_existing};
use crate::store::BuildCacheStore;
use crate::tree::OutputTree;
use crate::{Error, Result};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What was restored by a cache hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMetadata {
    /// Origin recorded when the entry was stored
    pub origin: OriginMetadata,
    /// Number of archive entries unpacked
    pub entries: u64,
}

impl From<UnpackResult> for LoadMetadata {
    fn from(result: UnpackResult) -> Self {
        Self {
            origin: result.origin,
            entries: result.entries,
        }
    }
}

/// Outcome of a cache load
#[derive(Debug)]
pub enum CacheLoad {
    /// Outputs were restored from the cache
    Hit(LoadMetadata),
    /// No entry for the key
    Miss,
    /// The cache could not be read; execution can proceed without it
    Recoverable(Error),
    /// Outputs may have been partially overwritten; the build must stop
    Fatal(Error),
}

impl CacheLoad {
    /// Whether outputs were restored
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Everything needed to store the outputs of one execution
#[derive(Debug, Clone)]
pub struct StoreCommand {
    /// Key to store under
    pub key: CacheKey,
    /// Declared outputs, in any order
    pub trees: Vec<OutputTree>,
    /// Origin of the execution that produced the outputs
    pub origin: OriginMetadata,
}

impl StoreCommand {
    /// Create a store command
    #[must_use]
    pub fn new(key: CacheKey, trees: Vec<OutputTree>, origin: OriginMetadata) -> Self {
        Self { key, trees, origin }
    }
}

/// Loads and stores packed outputs
pub trait BuildCacheController: Send + Sync {
    /// Whether any store is configured
    fn is_enabled(&self) -> bool;

    /// Restore the outputs stored under `key` into `trees`
    fn load(&self, key: &CacheKey, trees: &[OutputTree]) -> CacheLoad;

    /// Pack the outputs described by `command` and store them
    ///
    /// # Errors
    ///
    /// Returns error if packing fails or a store rejects the entry
    fn store(&self, command: &StoreCommand) -> Result<()>;
}

/// Controller used when caching is turned off
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBuildCacheController;

impl BuildCacheController for DisabledBuildCacheController {
    fn is_enabled(&self) -> bool {
        false
    }

    fn load(&self, _key: &CacheKey, _trees: &[OutputTree]) -> CacheLoad {
        CacheLoad::Miss
    }

    fn store(&self, _command: &StoreCommand) -> Result<()> {
        Ok(())
    }
}

struct ConfiguredStore {
    store: Arc<dyn BuildCacheStore>,
    push: bool,
}

/// Controller backed by an optional local and an optional remote store
pub struct DefaultBuildCacheController {
    packer: Box<dyn OutputPacker>,
    local: Option<ConfiguredStore>,
    remote: Option<ConfiguredStore>,
}

impl DefaultBuildCacheController {
    /// Create a controller without stores
    #[must_use]
    pub fn new(packer: Box<dyn OutputPacker>) -> Self {
        Self {
            packer,
            local: None,
            remote: None,
        }
    }

    /// Use `store` as the local store
    #[must_use]
    pub fn with_local(mut self, store: Arc<dyn BuildCacheStore>, push: bool) -> Self {
        self.local = Some(ConfiguredStore { store, push });
        self
    }

    /// Use `store` as the remote store
    #[must_use]
    pub fn with_remote(mut self, store: Arc<dyn BuildCacheStore>, push: bool) -> Self {
        self.remote = Some(ConfiguredStore { store, push });
        self
    }

    fn load_local(
        &self,
        local: &ConfiguredStore,
        key: &CacheKey,
        trees: &[OutputTree],
    ) -> CacheLoad {
        let mut unpacked = None;
        let backend = local.store.load(key, &mut |input: &mut dyn Read| {
            unpacked = Some(self.packer.unpack(trees, input));
            Ok(())
        });
        finish_load(key, trees, unpacked, backend)
    }

    fn load_remote(
        &self,
        remote: &ConfiguredStore,
        key: &CacheKey,
        trees: &[OutputTree],
    ) -> CacheLoad {
        let mut buffer = Vec::new();
        let found = remote.store.load(key, &mut |input: &mut dyn Read| {
            input
                .read_to_end(&mut buffer)
                .map(|_| ())
                .map_err(|e| Error::io_no_path(e, "read remote entry"))
        });
        match found {
            Ok(true) => {}
            Ok(false) => return CacheLoad::Miss,
            Err(e) => return CacheLoad::Recoverable(e),
        }

        if let Some(local) = self.local.as_ref().filter(|l| l.push) {
            let copied = local.store.store(key, &mut |out: &mut dyn Write| {
                out.write_all(&buffer)
                    .map_err(|e| Error::io_no_path(e, "write local entry"))
            });
            if let Err(e) = copied {
                warn!(
                    key = %key,
                    store = %local.store.description(),
                    "Failed to copy remote cache entry: {e}"
                );
            }
        }

        let unpacked = self.packer.unpack(trees, &mut buffer.as_slice());
        finish_load(key, trees, Some(unpacked), Ok(true))
    }
}

fn finish_load(
    key: &CacheKey,
    trees: &[OutputTree],
    unpacked: Option<Result<UnpackResult>>,
    backend: Result<bool>,
) -> CacheLoad {
    match (unpacked, backend) {
        (Some(Ok(result)), _) => CacheLoad::Hit(result.into()),
        (Some(Err(e)), _) => CacheLoad::Fatal(cleanup_after_failed_unpack(key, trees, e)),
        (None, Ok(_)) => CacheLoad::Miss,
        (None, Err(e)) => CacheLoad::Recoverable(e),
    }
}

/// Remove every declared root after an unpack failed half way
fn cleanup_after_failed_unpack(key: &CacheKey, trees: &[OutputTree], source: Error) -> Error {
    let mut cleanup_failures = Vec::new();
    for tree in trees {
        if let Err(e) = remove_existing(&tree.root) {
            cleanup_failures.push(e.to_string());
        }
    }
    let message = if cleanup_failures.is_empty() {
        format!("{source}; outputs were removed")
    } else {
        format!(
            "{source}; removing outputs also failed: {}",
            cleanup_failures.join(", ")
        )
    };
    Error::unrecoverable_unpack(key.hash_code(), message, source)
}

impl BuildCacheController for DefaultBuildCacheController {
    fn is_enabled(&self) -> bool {
        self.local.is_some() || self.remote.is_some()
    }

    fn load(&self, key: &CacheKey, trees: &[OutputTree]) -> CacheLoad {
        let mut local_failure = None;
        if let Some(local) = &self.local {
            match self.load_local(local, key, trees) {
                CacheLoad::Miss => {}
                CacheLoad::Recoverable(e) => {
                    warn!(key = %key, "Failed to load from local build cache: {e}");
                    local_failure = Some(e);
                }
                hit_or_fatal => return hit_or_fatal,
            }
        }

        if let Some(remote) = &self.remote {
            let loaded = self.load_remote(remote, key, trees);
            if loaded.is_hit() {
                info!(
                    key = %key,
                    store = %remote.store.description(),
                    "Loaded outputs from remote build cache"
                );
            }
            if !matches!(loaded, CacheLoad::Miss) {
                return loaded;
            }
        }

        local_failure.map_or(CacheLoad::Miss, CacheLoad::Recoverable)
    }

    fn store(&self, command: &StoreCommand) -> Result<()> {
        let targets: Vec<&ConfiguredStore> = [&self.local, &self.remote]
            .into_iter()
            .flatten()
            .filter(|s| s.push)
            .collect();
        if targets.is_empty() {
            debug!(key = %command.key, "No build cache store accepts pushes");
            return Ok(());
        }

        let mut packed = Vec::new();
        let result = self
            .packer
            .pack(&command.trees, &command.origin, &mut packed)?;

        let mut first_error = None;
        for target in targets {
            let stored = target.store.store(&command.key, &mut |out: &mut dyn Write| {
                out.write_all(&packed)
                    .map_err(|e| Error::io_no_path(e, "write cache entry"))
            });
            match stored {
                Ok(()) => debug!(
                    key = %command.key,
                    store = %target.store.description(),
                    entries = result.entries,
                    bytes = packed.len(),
                    "Stored outputs in build cache"
                ),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for DefaultBuildCacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultBuildCacheController")
            .field("local", &self.local.as_ref().map(|s| s.store.description()))
            .field("remote", &self.remote.as_ref().map(|s| s.store.description()))
            .finish_non_exhaustive()
    }
}
