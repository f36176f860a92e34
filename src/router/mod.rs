pub mod cache;
pub mod config;
pub mod method;
pub mod pattern;
pub mod register;
mod tree;

use crate::handler::registry::ServiceResolver;
use crate::handler::{Handler, SharedHandler};
use crate::router::cache::{DEFAULT_LOOKUP_CACHE_CAPACITY, LookupCache};
use crate::router::config::RouteExtInfo;
use crate::router::method::RequestMethod;
use crate::router::pattern::{CompiledPattern, PatternError, RoutePattern};
use crate::router::tree::{RouteTree, TreeLookup};
use dashmap::{DashMap, Entry};
use fnv::FnvBuildHasher;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// What a route invokes: a handler object, or a `"<service>.<method>"` identifier that the
/// router's service resolver turns into one at registration time.
#[derive(Clone)]
pub enum RouteHandler {
    Callable(SharedHandler),
    Service(String),
}

impl RouteHandler {
    pub fn callable(handler: impl Handler + 'static) -> Self {
        RouteHandler::Callable(Arc::new(handler))
    }
}

impl From<SharedHandler> for RouteHandler {
    fn from(value: SharedHandler) -> Self {
        RouteHandler::Callable(value)
    }
}

impl From<&str> for RouteHandler {
    fn from(value: &str) -> Self {
        RouteHandler::Service(value.to_string())
    }
}

impl From<String> for RouteHandler {
    fn from(value: String) -> Self {
        RouteHandler::Service(value)
    }
}

/// A registered route. Immutable once the router has accepted it.
pub struct Route {
    name: String,
    method: RequestMethod,
    source: String,
    pattern: CompiledPattern,
    handler: SharedHandler,
    handler_name: String,
    ext_info: Arc<RouteExtInfo>,
}

impl Route {
    /// `method-signature-paramCount`, the key duplicates are detected by.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    /// The pattern as it was registered.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    /// The service identifier for resolved handlers, otherwise the handler's own name.
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn ext_info(&self) -> &Arc<RouteExtInfo> {
        &self.ext_info
    }

    pub fn param_count(&self) -> usize {
        self.pattern.param_count()
    }
}

impl Debug for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("source", &self.source)
            .field("handler", &self.handler_name)
            .finish()
    }
}

/// A successful resolution: the route plus its path parameters in string form.
#[derive(Debug)]
pub struct RouteMatch {
    route: Arc<Route>,
    params: Map<String, Value>,
}

impl RouteMatch {
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

/// Result of `Router::get_route`. Lookups never fail, they report one of three outcomes.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Matched(Arc<RouteMatch>),
    /// The path has the shape of a registered route, but not for this method.
    MethodNotAllowed,
    NotFound,
}

impl LookupOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, LookupOutcome::Matched(_))
    }
}

/// Configuration errors raised while registering routes. They are meant to stop startup.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("[router error][{router}]need string path")]
    EmptyPattern { router: String },

    #[error("[router error][{router}]need serviceHandler function, but none was initialised")]
    MissingServiceResolver { router: String },

    #[error("[router error][{router}]need function handler, '{handler}' could not be resolved")]
    UnresolvableHandler { router: String, handler: String },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("[router error][{router}]duplicate urlPattern : {pattern}")]
    DuplicateRoute { router: String, pattern: String },

    #[error("[RouteRegister init] service handler is already set.Please use force param to set a new one.")]
    ServiceResolverAlreadySet,
}

impl RouterError {
    #[inline]
    pub(crate) fn empty_pattern(router: impl Into<String>) -> Self {
        Self::EmptyPattern {
            router: router.into(),
        }
    }

    #[inline]
    pub(crate) fn missing_service_resolver(router: impl Into<String>) -> Self {
        Self::MissingServiceResolver {
            router: router.into(),
        }
    }

    #[inline]
    pub(crate) fn unresolvable_handler(router: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::UnresolvableHandler {
            router: router.into(),
            handler: handler.into(),
        }
    }

    #[inline]
    pub(crate) fn duplicate_route(router: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::DuplicateRoute {
            router: router.into(),
            pattern: pattern.into(),
        }
    }
}

/// The route table of one server context.
///
/// # Behavior
/// Registration happens at startup; lookups afterwards only read the tree and touch the
/// LRU cache. Any change to the table clears the whole cache.
pub struct Router {
    name: String,
    routes: DashMap<String, Arc<Route>, FnvBuildHasher>,
    tree: RwLock<RouteTree>,
    cache: LookupCache,
    resolver: RwLock<Option<Arc<dyn ServiceResolver>>>,
    tree_walks: AtomicU64,
}

impl Router {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_LOOKUP_CACHE_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, cache_capacity: usize) -> Self {
        Self {
            name: name.into(),
            routes: DashMap::with_hasher(FnvBuildHasher::default()),
            tree: RwLock::new(RouteTree::new()),
            cache: LookupCache::new(cache_capacity),
            resolver: RwLock::new(None),
            tree_walks: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs the callback that turns handler identifiers into handlers.
    ///
    /// # Errors
    /// A resolver is already installed and `force` is not set.
    pub fn set_service_resolver(
        &self,
        resolver: Arc<dyn ServiceResolver>,
        force: bool,
    ) -> Result<(), RouterError> {
        let mut current = self.resolver.write();
        if current.is_some() && !force {
            return Err(RouterError::ServiceResolverAlreadySet);
        }
        *current = Some(resolver);
        Ok(())
    }

    pub fn has_service_resolver(&self) -> bool {
        self.resolver.read().is_some()
    }

    /// Registers `handler` for `method` requests matching `pattern`.
    ///
    /// # Parameters
    /// - `method`: the request method
    /// - `pattern`: a path pattern such as `/users/:id/orders/:(\d+)order`, or a raw regex
    /// - `handler`: a handler, or a `"<service>.<method>"` identifier
    /// - `ext_info`: validator, middleware and parameter injectors for the route
    ///
    /// # Returns
    /// The registered route.
    ///
    /// # Errors
    /// In this order: an empty pattern, no service resolver installed, an identifier the
    /// resolver cannot resolve, a pattern that does not compile, and a route whose
    /// `method-signature-paramCount` name is already taken.
    pub fn register_url(
        &self,
        method: RequestMethod,
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
        ext_info: RouteExtInfo,
    ) -> Result<Arc<Route>, RouterError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(RouterError::empty_pattern(&self.name));
        }
        let resolver = self
            .resolver
            .read()
            .clone()
            .ok_or_else(|| RouterError::missing_service_resolver(&self.name))?;
        let (handler, handler_name) = match handler.into() {
            RouteHandler::Callable(handler) => {
                let name = handler.name().to_string();
                (handler, name)
            }
            RouteHandler::Service(identifier) => match resolver.resolve_service(&identifier) {
                Some(handler) => (handler, identifier),
                None => return Err(RouterError::unresolvable_handler(&self.name, identifier)),
            },
        };

        let compiled = CompiledPattern::compile(&pattern)?;
        let name = format!(
            "{}-{}-{}",
            method.as_str(),
            compiled.signature(),
            compiled.param_count()
        );
        let source = pattern.to_string();

        let route = match self.routes.entry(name.clone()) {
            Entry::Occupied(_) => {
                return Err(RouterError::duplicate_route(&self.name, source));
            }
            Entry::Vacant(entry) => {
                let route = Arc::new(Route {
                    name,
                    method,
                    source,
                    pattern: compiled,
                    handler,
                    handler_name,
                    ext_info: Arc::new(ext_info),
                });
                self.tree.write().insert(route.clone());
                entry.insert(route.clone());
                route
            }
        };
        self.cache.clear();

        log::info!(
            "[Route Mapping] route registration finished : {}  {} -> {}",
            route.method(),
            route.source(),
            route.handler_name()
        );
        Ok(route)
    }

    /// Resolves `path` for `method`, serving repeated successful lookups from the cache.
    ///
    /// Only matches are cached, so `MethodNotAllowed` and `NotFound` always walk the tree.
    pub fn get_route(&self, method: RequestMethod, path: &str) -> LookupOutcome {
        if let Some(hit) = self.cache.get(method, path) {
            log::debug!("Route cache hit for {} {}", method, path);
            return LookupOutcome::Matched(hit);
        }

        self.tree_walks.fetch_add(1, Ordering::Relaxed);
        let lookup = self.tree.read().lookup(method, path);
        match lookup {
            TreeLookup::Matched { route, params } => {
                let params = params
                    .into_iter()
                    .map(|(name, value)| (name, Value::String(value)))
                    .collect();
                let resolved = Arc::new(RouteMatch { route, params });
                self.cache.insert(method, path, resolved.clone());
                LookupOutcome::Matched(resolved)
            }
            TreeLookup::WrongMethod => LookupOutcome::MethodNotAllowed,
            TreeLookup::NotFound => LookupOutcome::NotFound,
        }
    }

    /// Looks a route up by its registered name.
    pub fn route(&self, name: &str) -> Option<Arc<Route>> {
        self.routes.get(name).map(|entry| entry.value().clone())
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// How many lookups had to walk the tree.
    pub fn tree_walk_count(&self) -> u64 {
        self.tree_walks.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Drops every route, the tree, the cache and the service resolver.
    pub fn reset(&self) {
        self.routes.clear();
        self.tree.write().clear();
        self.cache.clear();
        *self.resolver.write() = None;
        log::debug!("Router '{}' reset", self.name);
    }
}
