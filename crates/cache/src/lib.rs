//! Build cache for cairn
//!
//! This crate provides everything the execution pipeline needs to reuse the
//! outputs of a unit of work across builds:
//! - Deterministic, order-sensitive cache keys
//! - Output packers that turn declared output trees into one archive stream
//! - Byte-addressed cache stores (local directory, in-memory)
//! - A controller that combines a packer with local and remote stores
//!
//! # Archive layout
//!
//! Every packer writes a `METADATA` entry with the origin of the result,
//! followed by the output trees in name order. See [`packer`] for details.

mod config;
mod controller;
mod error;
mod key;
mod origin;
pub mod packer;
pub mod store;
mod tree;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use config::{CACHE_DIR_ENV, CacheConfig, LocalCacheConfig, RemoteCacheConfig};
pub use controller::{
    BuildCacheController, CacheLoad, DefaultBuildCacheController, DisabledBuildCacheController,
    LoadMetadata, StoreCommand,
};
pub use key::{CacheKey, CacheKeyBuilder};
pub use origin::{BuildInvocationId, OriginMetadata};
pub use packer::{
    GzipPacker, METADATA_PATH, OutputPacker, PackResult, PackerFormat, TarPacker, UnpackResult,
    ZipPacker,
};
pub use store::{BuildCacheStore, InMemoryStore, LocalDirectoryStore};
pub use tree::{OutputTree, TreeType};
