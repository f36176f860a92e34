use crate::cache::{Cache, CacheError, HandlerCache, HandlerCacheError};
use crate::exchange::RequestContext;
use crate::handler::config::{InvalidServiceMethod, ServiceMethodRef};
use crate::handler::{Handler, HandlerError, HandlerOutput, InjectedParam, SharedHandler};
use async_trait::async_trait;
use dashmap::{DashMap, Entry};
use fnv::FnvBuildHasher;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during service registry operations.
#[derive(Error, Debug)]
pub enum ServiceRegistryError {
    /// Indicates that no service with the specified name is registered.
    #[error("Service with name '{name}' not found.")]
    MissingService { name: String },

    /// Indicates that registration failed due to a name conflict.
    #[error("Service with name '{name}' already exists.")]
    ConflictingServiceName { name: String },
}

impl ServiceRegistryError {
    #[inline]
    pub(crate) fn missing_service(name: impl Into<String>) -> Self {
        Self::MissingService { name: name.into() }
    }

    #[inline]
    pub(crate) fn conflicting_service_name(name: impl Into<String>) -> Self {
        Self::ConflictingServiceName { name: name.into() }
    }
}

/// A named object exposing callable methods, the target of `"<service>.<method>"` handlers.
#[async_trait]
pub trait Service: Send + Sync {
    async fn invoke(
        &self,
        method: &str,
        ctx: &mut RequestContext,
        args: Vec<InjectedParam>,
    ) -> Result<HandlerOutput, HandlerError>;

    fn has_method(&self, method: &str) -> bool;
}

/// Turns a handler identifier into a callable. Supplied once to the router before routes
/// are registered; results may be cached indefinitely.
pub trait ServiceResolver: Send + Sync {
    fn resolve_service(&self, identifier: &str) -> Option<SharedHandler>;
}

type ServiceMap = DashMap<String, Arc<dyn Service>, FnvBuildHasher>;

/// A thread-safe registry of services plus the cache of handlers resolved from them.
///
/// # Behavior
/// Resolution is lazy: a resolved handler looks its service up again on every call, so a
/// service that disappears, or lacks the method, fails at call time with
/// `HandlerError::ServiceNotFound` rather than at registration time.
pub struct ServiceRegistry {
    services: Arc<ServiceMap>,
    resolved: HandlerCache,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: Arc::new(DashMap::with_hasher(FnvBuildHasher::default())),
            resolved: HandlerCache::new(),
        }
    }

    pub fn register_service(
        &self,
        name: impl Into<String>,
        service: impl Service + 'static,
    ) -> Result<(), ServiceRegistryError> {
        let name = name.into();
        match self.services.entry(name.clone()) {
            Entry::Occupied(_) => Err(ServiceRegistryError::conflicting_service_name(name)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(service));
                Ok(())
            }
        }
    }

    pub fn find_service(&self, name: &str) -> Result<Arc<dyn Service>, ServiceRegistryError> {
        match self.services.get(name) {
            None => Err(ServiceRegistryError::missing_service(name)),
            Some(service) => Ok(service.value().clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn clear(&self) {
        self.services.clear();
        self.resolved.clear();
    }

    fn resolve(&self, identifier: &str) -> Result<SharedHandler, HandlerCacheError> {
        let target: ServiceMethodRef = identifier
            .parse()
            .map_err(|e: InvalidServiceMethod| {
                HandlerCacheError::handle(self.resolved.cache_id(), e.to_string())
            })?;
        self.resolved.get_or_resolve(target.id(), || {
            log::debug!("Binding service handler '{}'", target);
            Ok(Arc::new(ServiceMethodHandler {
                name: target.to_string(),
                target: target.clone(),
                services: self.services.clone(),
            }) as SharedHandler)
        })
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceResolver for ServiceRegistry {
    fn resolve_service(&self, identifier: &str) -> Option<SharedHandler> {
        match self.resolve(identifier) {
            Ok(handler) => Some(handler),
            Err(e) => {
                log::warn!("Could not resolve handler '{}': {}", identifier, e);
                None
            }
        }
    }
}

/// Handler bound to one method of one named service.
struct ServiceMethodHandler {
    name: String,
    target: ServiceMethodRef,
    services: Arc<ServiceMap>,
}

#[async_trait]
impl Handler for ServiceMethodHandler {
    async fn exec(
        &self,
        ctx: &mut RequestContext,
        args: Vec<InjectedParam>,
    ) -> Result<HandlerOutput, HandlerError> {
        let service = self
            .services
            .get(self.target.service())
            .map(|entry| entry.value().clone())
            .filter(|service| service.has_method(self.target.method()))
            .ok_or_else(|| {
                HandlerError::service_not_found(self.target.service(), self.target.method())
            })?;
        service.invoke(self.target.method(), ctx, args).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct OrderService;

    #[async_trait]
    impl Service for OrderService {
        async fn invoke(
            &self,
            method: &str,
            ctx: &mut RequestContext,
            args: Vec<InjectedParam>,
        ) -> Result<HandlerOutput, HandlerError> {
            match method {
                "show" => Ok(HandlerOutput::Json(json!({
                    "path": ctx.path(),
                    "id": args.first().and_then(InjectedParam::as_f64),
                }))),
                "hello" => Ok(HandlerOutput::from("hello")),
                _ => Err(HandlerError::internal(method, "unreachable method")),
            }
        }

        fn has_method(&self, method: &str) -> bool {
            matches!(method, "show" | "hello")
        }
    }

    #[test]
    fn test_register_service_conflict() {
        let registry = ServiceRegistry::new();
        assert!(registry.register_service("orders", OrderService).is_ok());
        let result = registry.register_service("orders", OrderService);
        assert!(matches!(
            result,
            Err(ServiceRegistryError::ConflictingServiceName { .. })
        ));
        assert_eq!(registry.len(), 1);
        assert!(registry.find_service("orders").is_ok());
        assert!(registry.find_service("missing").is_err());
    }

    #[test]
    fn test_resolution_is_cached() {
        let registry = ServiceRegistry::new();
        let first = registry.resolve_service("orders.show").unwrap();
        let second = registry.resolve_service("orders.show").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "orders.show");
        assert!(registry.resolve_service("no_method").is_none());
    }

    #[tokio::test]
    async fn test_resolved_handler_invokes_service() {
        let registry = ServiceRegistry::new();
        registry.register_service("orders", OrderService).unwrap();
        let handler = registry.resolve_service("orders.show").unwrap();
        let mut ctx = RequestContext::new("get", "/orders/9");
        let output = handler
            .exec(&mut ctx, vec![InjectedParam::Value(json!(9))])
            .await
            .unwrap();
        assert_eq!(output, HandlerOutput::Json(json!({"path": "/orders/9", "id": 9.0})));
    }

    #[tokio::test]
    async fn test_missing_service_fails_at_call_time() {
        let registry = ServiceRegistry::new();
        let handler = registry.resolve_service("ghost.run").unwrap();
        let mut ctx = RequestContext::new("get", "/");
        let err = handler.exec(&mut ctx, Vec::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Request handler not found:ghost->run");

        registry.register_service("ghost", OrderService).unwrap();
        let err = handler.exec(&mut ctx, Vec::new()).await.unwrap_err();
        assert!(matches!(err, HandlerError::ServiceNotFound { .. }));
    }
}
