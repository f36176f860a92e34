use crate::config::{Config, ConfigProvider, ConfigProviderError, ServerConfig};
use crate::dispatcher::{DispatchOutcome, RequestDispatcher};
use crate::exchange::RequestContext;
use crate::handler::params::ParamInjectionError;
use crate::handler::registry::{Service, ServiceRegistry, ServiceRegistryError};
use crate::logger::init_logger;
use crate::middleware::{Middleware, MiddlewareError, MiddlewareManager, MiddlewareSettings};
use crate::router::config::{ControllerConfig, RouteDefinition};
use crate::router::register::RouteRegister;
use crate::router::{Route, RouterError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerContextError {
    #[error(transparent)]
    Config(#[from] ConfigProviderError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Params(#[from] ParamInjectionError),

    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error(transparent)]
    Service(#[from] ServiceRegistryError),
}

/// One independent server: its configuration plus the router, middleware manager, service
/// registry and dispatcher built from it.
///
/// Several contexts can live side by side; nothing here is process global apart from the
/// `log` backend, which the first context installs.
pub struct ServerContext {
    config: ServerConfig,
    register: Arc<RouteRegister>,
    middleware: Arc<MiddlewareManager>,
    services: Arc<ServiceRegistry>,
    dispatcher: RequestDispatcher,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Result<Self, ServerContextError> {
        init_logger(&config.logger);
        let register = Arc::new(RouteRegister::new(
            config.router_name.clone(),
            config.lookup_cache_capacity,
        ));
        let services = Arc::new(ServiceRegistry::new());
        register.init_service_resolver(services.clone(), false)?;
        let middleware = Arc::new(MiddlewareManager::new(config.env.clone()));
        let dispatcher = RequestDispatcher::new(register.clone(), middleware.clone())
            .with_request_logger(config.request_logger);
        log::info!(
            "Server context '{}' created for env '{}'",
            config.router_name,
            config.env
        );
        Ok(Self {
            config,
            register,
            middleware,
            services,
            dispatcher,
        })
    }

    pub fn from_provider(
        provider: impl ConfigProvider<ServerConfig>,
    ) -> Result<Self, ServerContextError> {
        let config = Config::new(provider)?;
        Self::new(config.into_inner())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn register(&self) -> &Arc<RouteRegister> {
        &self.register
    }

    pub fn middleware(&self) -> &Arc<MiddlewareManager> {
        &self.middleware
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn register_service(
        &self,
        name: impl Into<String>,
        service: impl Service + 'static,
    ) -> Result<(), ServerContextError> {
        Ok(self.services.register_service(name, service)?)
    }

    pub fn register_middleware(
        &self,
        name: impl Into<String>,
        middleware: impl Middleware + 'static,
        settings: MiddlewareSettings,
    ) -> Result<(), ServerContextError> {
        Ok(self
            .middleware
            .register_middleware(name, middleware, settings)?)
    }

    /// Registers every route of `controller` against the controller's service.
    ///
    /// # Errors
    /// The first parameter or router error. Routes registered before it stay registered.
    pub fn register_controller(
        &self,
        controller: &ControllerConfig,
    ) -> Result<Vec<Arc<Route>>, ServerContextError> {
        let mut routes = Vec::new();
        for definition in controller.route_definitions()? {
            routes.extend(self.register.register_definition(definition)?);
        }
        Ok(routes)
    }

    pub fn register_definition(
        &self,
        definition: RouteDefinition,
    ) -> Result<Vec<Arc<Route>>, ServerContextError> {
        Ok(self.register.register_definition(definition)?)
    }

    pub async fn dispatch(&self, ctx: &mut RequestContext) -> DispatchOutcome {
        self.dispatcher.dispatch(ctx).await
    }

    /// Forgets routes, the service resolver and middleware.
    pub fn on_server_close(&self) {
        log::info!("Server context '{}' closing", self.config.router_name);
        self.register.reset();
        self.middleware.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProgrammaticConfigProvider;
    use crate::handler::{HandlerError, HandlerOutput, InjectedParam};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Users;

    #[async_trait]
    impl Service for Users {
        async fn invoke(
            &self,
            method: &str,
            ctx: &mut RequestContext,
            args: Vec<InjectedParam>,
        ) -> Result<HandlerOutput, HandlerError> {
            match method {
                "show" => Ok(HandlerOutput::Json(json!({
                    "id": args[0].as_value().cloned().unwrap_or(Value::Null),
                    "user": ctx.attribute("user").cloned(),
                }))),
                "create" => Ok(HandlerOutput::Json(args[0].as_value().cloned().unwrap_or_default())),
                _ => Err(HandlerError::internal(method, "unknown method")),
            }
        }

        fn has_method(&self, method: &str) -> bool {
            matches!(method, "show" | "create")
        }
    }

    struct Session;

    impl Middleware for Session {
        fn before_processing(&self, ctx: &mut RequestContext, args: &[Value]) -> bool {
            let role = args.first().cloned().unwrap_or(Value::Null);
            ctx.set_attribute("user", json!({"name": "ada", "role": role}));
            true
        }

        fn after_processing(&self, _ctx: &mut RequestContext, _args: &[Value]) -> bool {
            true
        }
    }

    fn controller() -> ControllerConfig {
        serde_json::from_value(json!({
            "name": "users",
            "basePath": "/api/users/",
            "middleware": ["session"],
            "routes": [
                {
                    "handler": "show",
                    "methods": ["GET"],
                    "path": ":id",
                    "middleware": {"session": "admin"},
                    "params": [{"name": "id", "kind": "number"}]
                },
                {
                    "handler": "create",
                    "methods": ["post", "put"],
                    "validation": {"rules": {"email": "required|email"}},
                    "params": [{"name": "body", "kind": "object", "marker": "requestBody"}]
                }
            ]
        }))
        .unwrap()
    }

    fn server() -> ServerContext {
        let config = ServerConfig::builder()
            .env("test")
            .router_name("users-api")
            .build();
        let server = ServerContext::from_provider(ProgrammaticConfigProvider { config }).unwrap();
        server.register_service("users", Users).unwrap();
        server
            .register_middleware("session", Session, MiddlewareSettings::default())
            .unwrap();
        server
    }

    #[tokio::test]
    async fn test_controller_routes_dispatch() {
        let server = server();
        let routes = server.register_controller(&controller()).unwrap();
        let names: Vec<&str> = routes.iter().map(|route| route.name()).collect();
        assert_eq!(
            names,
            vec!["get-api-users-:-1", "post-api-users-create-0", "put-api-users-create-0"]
        );
        assert_eq!(server.register().context_name(), "users-api");

        let mut ctx = RequestContext::new("get", "/api/users/42");
        assert_eq!(server.dispatch(&mut ctx).await, DispatchOutcome::Handled);
        assert_eq!(
            ctx.response().body(),
            Some(&json!({"id": 42, "user": {"name": "ada", "role": "admin"}}))
        );

        let mut ctx = RequestContext::new("put", "/api/users/create")
            .with_body(json!({"email": "not-an-email"}));
        server.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 422);
        assert!(ctx.response().body().unwrap().get("email").is_some());

        let mut ctx = RequestContext::new("post", "/api/users/create")
            .with_body(json!({"email": "ada@example.com"}));
        server.dispatch(&mut ctx).await;
        assert_eq!(
            ctx.response().body(),
            Some(&json!({"email": "ada@example.com"}))
        );
    }

    #[tokio::test]
    async fn test_duplicate_controller_fails() {
        let server = server();
        server.register_controller(&controller()).unwrap();
        let err = server.register_controller(&controller()).unwrap_err();
        assert!(matches!(
            err,
            ServerContextError::Router(RouterError::DuplicateRoute { .. })
        ));
    }

    #[tokio::test]
    async fn test_server_close_resets_state() {
        let server = server();
        server.register_controller(&controller()).unwrap();
        server.on_server_close();
        assert!(server.register().router().is_empty());
        assert!(server.middleware().is_empty());

        let mut ctx = RequestContext::new("get", "/api/users/42");
        server.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 404);
        assert!(matches!(
            server.register_controller(&controller()),
            Err(ServerContextError::Router(RouterError::MissingServiceResolver { .. }))
        ));
    }
}
