use crate::handler::registry::ServiceResolver;
use crate::router::config::{RouteDefinition, RouteExtInfo};
use crate::router::method::RequestMethod;
use crate::router::pattern::RoutePattern;
use crate::router::{Route, RouteHandler, Router, RouterError};
use std::sync::Arc;

pub const DEFAULT_CONTEXT_NAME: &str = "default";

/// Registration front of the router owned by one server context.
///
/// ```rust,ignore
/// let register = RouteRegister::new("default", 2000);
/// register.init_service_resolver(Arc::new(services), false)?;
/// register.get("/orders", "orders.list", RouteExtInfo::default())?;
/// register
///     .chain()
///     .pattern("/orders/:id")
///     .handler("orders.save")
///     .put()?
///     .patch()?;
/// ```
pub struct RouteRegister {
    router: Arc<Router>,
}

impl RouteRegister {
    pub fn new(context_name: impl Into<String>, cache_capacity: usize) -> Self {
        Self {
            router: Arc::new(Router::with_capacity(context_name, cache_capacity)),
        }
    }

    pub fn context_name(&self) -> &str {
        self.router.name()
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// # Errors
    /// `RouterError::ServiceResolverAlreadySet` when a resolver is installed and `force` is false.
    pub fn init_service_resolver(
        &self,
        resolver: Arc<dyn ServiceResolver>,
        force: bool,
    ) -> Result<(), RouterError> {
        self.router.set_service_resolver(resolver, force)
    }

    /// Forgets every route and the service resolver.
    pub fn reset(&self) {
        self.router.reset();
    }

    /// Registers every method of `definition`.
    pub fn register_definition(
        &self,
        definition: RouteDefinition,
    ) -> Result<Vec<Arc<Route>>, RouterError> {
        let RouteDefinition {
            methods,
            pattern,
            handler,
            ext_info,
        } = definition;
        methods
            .into_iter()
            .map(|method| {
                self.router
                    .register_url(method, pattern.clone(), handler.clone(), ext_info.clone())
            })
            .collect()
    }

    /// Starts an empty registration chain.
    pub fn chain(&self) -> RegisterChain<'_> {
        RegisterChain::new(&self.router)
    }

    pub fn get(
        &self,
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
        ext_info: RouteExtInfo,
    ) -> Result<RegisterChain<'_>, RouterError> {
        self.register_in_chain(RequestMethod::Get, pattern.into(), handler.into(), ext_info)
    }

    pub fn post(
        &self,
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
        ext_info: RouteExtInfo,
    ) -> Result<RegisterChain<'_>, RouterError> {
        self.register_in_chain(RequestMethod::Post, pattern.into(), handler.into(), ext_info)
    }

    pub fn put(
        &self,
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
        ext_info: RouteExtInfo,
    ) -> Result<RegisterChain<'_>, RouterError> {
        self.register_in_chain(RequestMethod::Put, pattern.into(), handler.into(), ext_info)
    }

    pub fn delete(
        &self,
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
        ext_info: RouteExtInfo,
    ) -> Result<RegisterChain<'_>, RouterError> {
        self.register_in_chain(RequestMethod::Delete, pattern.into(), handler.into(), ext_info)
    }

    pub fn patch(
        &self,
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
        ext_info: RouteExtInfo,
    ) -> Result<RegisterChain<'_>, RouterError> {
        self.register_in_chain(RequestMethod::Patch, pattern.into(), handler.into(), ext_info)
    }

    pub fn head(
        &self,
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
        ext_info: RouteExtInfo,
    ) -> Result<RegisterChain<'_>, RouterError> {
        self.register_in_chain(RequestMethod::Head, pattern.into(), handler.into(), ext_info)
    }

    pub fn options(
        &self,
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
        ext_info: RouteExtInfo,
    ) -> Result<RegisterChain<'_>, RouterError> {
        self.register_in_chain(RequestMethod::Options, pattern.into(), handler.into(), ext_info)
    }

    fn register_in_chain(
        &self,
        method: RequestMethod,
        pattern: RoutePattern,
        handler: RouteHandler,
        ext_info: RouteExtInfo,
    ) -> Result<RegisterChain<'_>, RouterError> {
        self.router
            .register_url(method, pattern.clone(), handler.clone(), ext_info.clone())?;
        let mut chain = RegisterChain::new(&self.router);
        chain.used.push(method);
        chain.pattern = Some(pattern);
        chain.handler = Some(handler);
        chain.ext_info = Some(ext_info);
        Ok(chain)
    }
}

impl Default for RouteRegister {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONTEXT_NAME,
            crate::router::cache::DEFAULT_LOOKUP_CACHE_CAPACITY,
        )
    }
}

/// Registers one pattern and handler for several methods.
///
/// # Behavior
/// Methods are collected until both a pattern and a handler are known, then every pending
/// method is registered at once. A method that was already registered by this chain is
/// ignored. The first pattern, handler and extension info given are the ones used.
pub struct RegisterChain<'a> {
    router: &'a Router,
    methods: Vec<RequestMethod>,
    used: Vec<RequestMethod>,
    pattern: Option<RoutePattern>,
    handler: Option<RouteHandler>,
    ext_info: Option<RouteExtInfo>,
}

impl<'a> RegisterChain<'a> {
    fn new(router: &'a Router) -> Self {
        Self {
            router,
            methods: Vec::new(),
            used: Vec::new(),
            pattern: None,
            handler: None,
            ext_info: None,
        }
    }

    pub fn pattern(mut self, pattern: impl Into<RoutePattern>) -> Self {
        if self.pattern.is_none() {
            self.pattern = Some(pattern.into());
        }
        self
    }

    pub fn handler(mut self, handler: impl Into<RouteHandler>) -> Self {
        if self.handler.is_none() {
            self.handler = Some(handler.into());
        }
        self
    }

    pub fn ext_info(mut self, ext_info: RouteExtInfo) -> Self {
        if self.ext_info.is_none() {
            self.ext_info = Some(ext_info);
        }
        self
    }

    /// Queues `method` and registers the queue when pattern and handler are known.
    ///
    /// # Errors
    /// The first registration the router rejects.
    pub fn method(mut self, method: RequestMethod) -> Result<Self, RouterError> {
        if self.used.contains(&method) {
            return Ok(self);
        }
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self.commit()
    }

    /// Registers the queued methods if pattern and handler are known.
    pub fn commit(mut self) -> Result<Self, RouterError> {
        let (Some(pattern), Some(handler)) = (&self.pattern, &self.handler) else {
            return Ok(self);
        };
        let ext_info = self.ext_info.clone().unwrap_or_default();
        for method in std::mem::take(&mut self.methods) {
            self.router
                .register_url(method, pattern.clone(), handler.clone(), ext_info.clone())?;
            self.used.push(method);
        }
        Ok(self)
    }

    pub fn get(self) -> Result<Self, RouterError> {
        self.method(RequestMethod::Get)
    }

    pub fn post(self) -> Result<Self, RouterError> {
        self.method(RequestMethod::Post)
    }

    pub fn put(self) -> Result<Self, RouterError> {
        self.method(RequestMethod::Put)
    }

    pub fn delete(self) -> Result<Self, RouterError> {
        self.method(RequestMethod::Delete)
    }

    pub fn patch(self) -> Result<Self, RouterError> {
        self.method(RequestMethod::Patch)
    }

    pub fn head(self) -> Result<Self, RouterError> {
        self.method(RequestMethod::Head)
    }

    pub fn options(self) -> Result<Self, RouterError> {
        self.method(RequestMethod::Options)
    }

    /// Methods still waiting for a pattern or handler.
    pub fn pending(&self) -> &[RequestMethod] {
        &self.methods
    }

    pub fn registered(&self) -> &[RequestMethod] {
        &self.used
    }

    /// Clears the chain so it can register a different pattern.
    pub fn reset_chain(mut self) -> Self {
        self.methods.clear();
        self.used.clear();
        self.pattern = None;
        self.handler = None;
        self.ext_info = None;
        self
    }
}
