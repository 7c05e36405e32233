use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::trace;

/// Default number of memoized responses kept per endpoint
pub const DEFAULT_CAPACITY: usize = 1024;

/// Ordered call arguments, stringified
pub type CallArgs = Vec<String>;

/// Memoizes single-entity lookups by `(endpoint, args)`.
///
/// Each endpoint gets its own LRU of fixed capacity. Entries never expire by
/// age: entity data is treated as immutable for the lifetime of the cache.
/// Failed fetches are not remembered.
pub struct ApiCallCache<V> {
    capacity: NonZeroUsize,
    endpoints: HashMap<&'static str, LruCache<CallArgs, V>>,
    hits: u64,
    misses: u64,
}

impl<V: Clone> ApiCallCache<V> {
    /// A zero capacity is bumped to one
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            endpoints: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the remembered response for `(endpoint, args)`, or run `fetch`
    /// and remember its successful result.
    pub fn call<F, E>(&mut self, endpoint: &'static str, args: CallArgs, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let capacity = self.capacity;
        let lru = self
            .endpoints
            .entry(endpoint)
            .or_insert_with(|| LruCache::new(capacity));

        if let Some(value) = lru.get(&args) {
            self.hits += 1;
            trace!(endpoint, ?args, "memo hit");
            return Ok(value.clone());
        }

        self.misses += 1;
        trace!(endpoint, ?args, "memo miss");
        let value = fetch()?;
        lru.put(args, value.clone());
        Ok(value)
    }

    /// Number of entries currently held for `endpoint`
    pub fn len(&self, endpoint: &str) -> usize {
        self.endpoints.get(endpoint).map(LruCache::len).unwrap_or(0)
    }

    pub fn contains(&self, endpoint: &str, args: &CallArgs) -> bool {
        self.endpoints
            .get(endpoint)
            .map(|lru| lru.contains(args))
            .unwrap_or(false)
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
