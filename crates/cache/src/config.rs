//! Build cache configuration

use crate::controller::{
    BuildCacheController, DefaultBuildCacheController, DisabledBuildCacheController,
};
use crate::packer::PackerFormat;
use crate::store::{BuildCacheStore, LocalDirectoryStore};
use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Environment variable overriding the local cache directory
pub const CACHE_DIR_ENV: &str = "CAIRN_CACHE_DIR";

const CACHE_SUBDIR: &str = "cairn/build-cache";

/// Top-level build cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Master switch for the build cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Archive format used for cache entries
    #[serde(default)]
    pub format: PackerFormat,

    /// Local directory cache
    #[serde(default)]
    pub local: LocalCacheConfig,

    /// Remote cache; the backend itself is supplied by the caller
    #[serde(default)]
    pub remote: RemoteCacheConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: PackerFormat::default(),
            local: LocalCacheConfig::default(),
            remote: RemoteCacheConfig::default(),
        }
    }
}

/// Local directory cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalCacheConfig {
    /// Use the local cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Store new results locally
    #[serde(default = "default_true")]
    pub push: bool,

    /// Cache directory; resolved from the environment when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            push: true,
            directory: None,
        }
    }
}

/// Remote cache settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteCacheConfig {
    /// Use the remote cache when a backend is supplied
    #[serde(default)]
    pub enabled: bool,

    /// Store new results remotely
    #[serde(default)]
    pub push: bool,
}

fn default_true() -> bool {
    true
}

impl CacheConfig {
    /// Parse configuration from TOML
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TOML is invalid
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Invalid build cache configuration: {e}")))
    }

    /// Read configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&content)
    }

    /// Open the local store, probing the default locations if no directory
    /// is configured
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no usable directory exists
    pub fn local_store(&self) -> Result<LocalDirectoryStore> {
        match &self.local.directory {
            Some(dir) => LocalDirectoryStore::new(dir),
            None => LocalDirectoryStore::open_first(default_directories(|name| {
                std::env::var(name).ok()
            })),
        }
    }

    /// Build the controller described by this configuration
    ///
    /// `remote` is only used when `remote.enabled` is set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the local cache directory is unusable
    pub fn build_controller(
        &self,
        remote: Option<Arc<dyn BuildCacheStore>>,
    ) -> Result<Arc<dyn BuildCacheController>> {
        if !self.enabled {
            debug!("Build cache disabled");
            return Ok(Arc::new(DisabledBuildCacheController));
        }

        let mut controller = DefaultBuildCacheController::new(self.format.packer());
        let mut any_store = false;

        if self.local.enabled {
            let store = self.local_store()?;
            controller = controller.with_local(Arc::new(store), self.local.push);
            any_store = true;
        }
        if self.remote.enabled {
            match remote {
                Some(store) => {
                    controller = controller.with_remote(store, self.remote.push);
                    any_store = true;
                }
                None => {
                    return Err(Error::configuration(
                        "Remote build cache is enabled but no backend was supplied",
                    ));
                }
            }
        }

        if !any_store {
            debug!("No build cache store enabled");
            return Ok(Arc::new(DisabledBuildCacheController));
        }
        debug!(?controller, format = ?self.format, "Configured build cache");
        Ok(Arc::new(controller))
    }
}

/// Default local cache locations, most specific first
fn default_directories(var: impl Fn(&str) -> Option<String>) -> Vec<PathBuf> {
    let env_path = |name: &str| {
        var(name)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    };
    env_path(CACHE_DIR_ENV)
        .into_iter()
        .chain(env_path("XDG_CACHE_HOME").map(|dir| dir.join(CACHE_SUBDIR)))
        .chain(cache_dir().map(|dir| dir.join(CACHE_SUBDIR)))
        .chain(home_dir().map(|dir| dir.join(".cairn/build-cache")))
        .chain(std::iter::once(std::env::temp_dir().join(CACHE_SUBDIR)))
        .collect()
}
