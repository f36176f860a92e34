use crate::router::RouteMatch;
use crate::router::method::RequestMethod;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub const DEFAULT_LOOKUP_CACHE_CAPACITY: usize = 2000;

/// Bounded least-recently-used cache of successful route resolutions.
///
/// # Behavior
/// Keys are `method|path`. Only matched lookups are stored; entries are never invalidated
/// one by one, the whole cache is cleared whenever the route table changes.
pub struct LookupCache {
    entries: Mutex<LruCache<String, Arc<RouteMatch>>>,
}

impl LookupCache {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(method: RequestMethod, path: &str) -> String {
        format!("{}|{}", method.as_str(), path)
    }

    /// Returns the cached resolution and marks it most recently used.
    pub fn get(&self, method: RequestMethod, path: &str) -> Option<Arc<RouteMatch>> {
        self.entries.lock().get(&Self::key(method, path)).cloned()
    }

    pub fn insert(&self, method: RequestMethod, path: &str, resolved: Arc<RouteMatch>) {
        self.entries.lock().put(Self::key(method, path), resolved);
    }

    pub fn contains(&self, method: RequestMethod, path: &str) -> bool {
        self.entries.lock().contains(&Self::key(method, path))
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_CACHE_CAPACITY)
    }
}
