mod handler;

pub use handler::{HandlerCache, HandlerCacheError};

use dashmap::{DashMap, Entry};
use fnv::FnvBuildHasher;
use std::hash::Hash;

pub trait CacheError
where
    Self: std::error::Error,
{
    fn handle(cache_id: &'static str, msg: impl Into<String>) -> Self;
}

/// A concurrent, write-once keyed cache.
///
/// Values are cloned out of the map, so `D` is usually an `Arc` or another cheap handle.
pub trait Cache<K, D>
where
    K: Eq + Hash + Clone,
    D: Clone,
{
    type Error: CacheError;

    fn inner(&self) -> &DashMap<K, D, FnvBuildHasher>;

    fn cache_id(&self) -> &'static str;

    fn get(&self, key: &K) -> Result<D, Self::Error> {
        match self.inner().get(key) {
            Some(found) => Ok(found.value().clone()),
            None => Err(Self::Error::handle(self.cache_id(), "Key not found")),
        }
    }

    /// Returns the cached value, running `resolver` and storing its result on a miss.
    ///
    /// A failing resolver stores nothing.
    fn get_or_resolve<F>(&self, key: K, resolver: F) -> Result<D, Self::Error>
    where
        F: FnOnce() -> Result<D, Self::Error>,
    {
        match self.inner().entry(key) {
            Entry::Occupied(found) => Ok(found.get().clone()),
            Entry::Vacant(vacant) => {
                let value = resolver()?;
                vacant.insert(value.clone());
                Ok(value)
            }
        }
    }

    fn init(&self, key: K, value: D) -> Result<(), Self::Error> {
        match self.inner().entry(key) {
            Entry::Occupied(_) => Err(Self::Error::handle(self.cache_id(), "Key already exists")),
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                Ok(())
            }
        }
    }

    fn clear(&self) {
        self.inner().clear();
    }
}
