use crate::cache::{Cache, CacheError};
use crate::handler::SharedHandler;
use crate::handler::config::HandlerId;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use thiserror::Error;

/// Resolved service-method handlers, keyed by the hash of their `"<service>.<method>"` id.
pub struct HandlerCache {
    handlers: DashMap<HandlerId, SharedHandler, FnvBuildHasher>,
}

impl HandlerCache {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::with_hasher(FnvBuildHasher::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache<HandlerId, SharedHandler> for HandlerCache {
    type Error = HandlerCacheError;

    fn inner(&self) -> &DashMap<HandlerId, SharedHandler, FnvBuildHasher> {
        &self.handlers
    }

    fn cache_id(&self) -> &'static str {
        "HandlerCache"
    }
}

#[derive(Error, Debug)]
#[error("[{cache_id}] {message}")]
pub struct HandlerCacheError {
    cache_id: &'static str,
    message: String,
}

impl CacheError for HandlerCacheError {
    fn handle(cache_id: &'static str, msg: impl Into<String>) -> Self {
        HandlerCacheError {
            cache_id,
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{FnHandler, HandlerOutput};
    use std::sync::Arc;

    fn handler(name: &'static str) -> SharedHandler {
        Arc::new(FnHandler::new(name, |_, _| Ok(HandlerOutput::Undefined)))
    }

    #[test]
    fn test_get_or_resolve_runs_resolver_once() {
        let cache = HandlerCache::new();
        let id = HandlerId::new("orders.list");
        let mut calls = 0;
        let first = cache
            .get_or_resolve(id.clone(), || {
                calls += 1;
                Ok(handler("orders.list"))
            })
            .unwrap();
        let second = cache
            .get_or_resolve(id.clone(), || Ok(handler("other")))
            .unwrap();
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_resolution_is_not_cached() {
        let cache = HandlerCache::new();
        let id = HandlerId::new("orders.missing");
        let result = cache.get_or_resolve(id.clone(), || {
            Err(HandlerCacheError::handle("HandlerCache", "unresolvable"))
        });
        assert!(result.is_err());
        assert!(cache.get(&id).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_init_conflict_reports_cache_id() {
        let cache = HandlerCache::new();
        let id = HandlerId::new("orders.list");
        cache.init(id.clone(), handler("a")).unwrap();
        let err = cache.init(id, handler("b")).unwrap_err();
        assert_eq!(err.to_string(), "[HandlerCache] Key already exists");
        cache.clear();
        assert!(cache.is_empty());
    }
}
