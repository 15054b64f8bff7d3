//! Per-invocation context threaded through the pipeline steps

use crate::interrupt::InterruptToken;
use crate::work::UnitOfWork;
use cairn_cache::{CacheKey, CacheLoad};

/// Decides whether and under which key a unit of work uses the build cache
pub trait CacheHandler: Send + Sync {
    /// Run `loader` with the cache key if loading is allowed
    ///
    /// Returns [`CacheLoad::Miss`] without calling `loader` otherwise.
    fn load(&self, loader: &mut dyn FnMut(&CacheKey) -> CacheLoad) -> CacheLoad;

    /// Run `storer` with the cache key if storing is allowed
    fn store(&self, storer: &mut dyn FnMut(&CacheKey));
}

/// Cache handler for a unit of work with a computed cache key
#[derive(Debug, Clone, Copy)]
pub struct KeyedCacheHandler {
    key: CacheKey,
    load: bool,
    store: bool,
}

impl KeyedCacheHandler {
    /// Load and store under `key`
    #[must_use]
    pub const fn new(key: CacheKey) -> Self {
        Self {
            key,
            load: true,
            store: true,
        }
    }

    /// Whether loading from the cache is allowed
    #[must_use]
    pub const fn with_load(mut self, load: bool) -> Self {
        self.load = load;
        self
    }

    /// Whether storing into the cache is allowed
    #[must_use]
    pub const fn with_store(mut self, store: bool) -> Self {
        self.store = store;
        self
    }

    /// The cache key
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl CacheHandler for KeyedCacheHandler {
    fn load(&self, loader: &mut dyn FnMut(&CacheKey) -> CacheLoad) -> CacheLoad {
        if self.load {
            loader(&self.key)
        } else {
            CacheLoad::Miss
        }
    }

    fn store(&self, storer: &mut dyn FnMut(&CacheKey)) {
        if self.store {
            storer(&self.key);
        }
    }
}

/// Cache handler for work that is not cacheable
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCacheHandler;

impl CacheHandler for NoCacheHandler {
    fn load(&self, _loader: &mut dyn FnMut(&CacheKey) -> CacheLoad) -> CacheLoad {
        CacheLoad::Miss
    }

    fn store(&self, _storer: &mut dyn FnMut(&CacheKey)) {}
}

/// Everything a step needs to know about the current invocation
#[derive(Clone)]
pub struct Context<'a> {
    /// The unit of work being executed
    pub work: &'a dyn UnitOfWork,
    /// Cache usage policy for this invocation
    pub cache_handler: &'a dyn CacheHandler,
    /// Interrupt raised by the timeout watchdog
    pub interrupt: InterruptToken,
}

impl<'a> Context<'a> {
    /// Create a context
    #[must_use]
    pub const fn new(
        work: &'a dyn UnitOfWork,
        cache_handler: &'a dyn CacheHandler,
        interrupt: InterruptToken,
    ) -> Self {
        Self {
            work,
            cache_handler,
            interrupt,
        }
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("work", &self.work.display_name())
            .field("interrupt", &self.interrupt)
            .finish_non_exhaustive()
    }
}
