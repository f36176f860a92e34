use crate::handler::params::{ParamDecl, ParamInjectionError, ParamInjector};
use crate::middleware::{MiddlewareManager, RegisteredMiddleware};
use crate::router::RouteHandler;
use crate::router::method::RequestMethod;
use crate::router::pattern::RoutePattern;
use crate::validation::{FieldValidator, ValidationSchema};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Per-route extension data consumed by the dispatcher.
///
/// The active middleware list is resolved on first use and kept for the life of the route.
#[derive(Debug, Clone, Default)]
pub struct RouteExtInfo {
    validator: Option<Arc<FieldValidator>>,
    middleware_info: MiddlewareInfo,
    current_middleware: OnceCell<Vec<Arc<RegisteredMiddleware>>>,
    param_injectors: Vec<ParamInjector>,
}

impl RouteExtInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(mut self, validator: Arc<FieldValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Compiles `schema` and attaches it as the route's validator.
    pub fn with_schema(self, schema: &ValidationSchema) -> Self {
        self.with_validator(Arc::new(FieldValidator::compile(schema)))
    }

    pub fn with_middleware_info(mut self, info: MiddlewareInfo) -> Self {
        self.middleware_info = info;
        self
    }

    pub fn with_param_injectors(mut self, injectors: Vec<ParamInjector>) -> Self {
        self.param_injectors = injectors;
        self
    }

    pub fn validator(&self) -> Option<&Arc<FieldValidator>> {
        self.validator.as_ref()
    }

    pub fn middleware_info(&self) -> &MiddlewareInfo {
        &self.middleware_info
    }

    pub fn param_injectors(&self) -> &[ParamInjector] {
        &self.param_injectors
    }

    /// The ordered middleware for this route, resolved through `manager` once and memoised.
    pub fn current_middleware(&self, manager: &MiddlewareManager) -> &[Arc<RegisteredMiddleware>] {
        self.current_middleware.get_or_init(|| {
            let aliases: Vec<&str> = self.middleware_info.aliases().collect();
            let active = manager.get_active_middleware(&aliases);
            log::debug!(
                "Resolved {} middleware for aliases {:?}",
                active.len(),
                aliases
            );
            active
        })
    }
}

/// Middleware aliases named by a controller or route, each with the arguments handed to
/// its hooks. Insertion order is kept.
///
/// Deserializes from a list of aliases (no arguments) or an object mapping alias to an
/// argument array.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawMiddlewareInfo")]
pub struct MiddlewareInfo {
    entries: Vec<(String, Vec<Value>)>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMiddlewareInfo {
    Names(Vec<String>),
    Args(Map<String, Value>),
}

impl From<RawMiddlewareInfo> for MiddlewareInfo {
    fn from(raw: RawMiddlewareInfo) -> Self {
        match raw {
            RawMiddlewareInfo::Names(names) => MiddlewareInfo::from_names(names),
            RawMiddlewareInfo::Args(map) => {
                let entries = map
                    .into_iter()
                    .map(|(alias, args)| {
                        let args = match args {
                            Value::Array(items) => items,
                            Value::Null => Vec::new(),
                            single => vec![single],
                        };
                        (alias, args)
                    })
                    .collect();
                MiddlewareInfo { entries }
            }
        }
    }
}

impl MiddlewareInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        names
            .into_iter()
            .fold(Self::new(), |info, name| info.with(name, Vec::new()))
    }

    /// Adds `alias`, replacing the arguments in place when it is already present.
    pub fn with(mut self, alias: impl Into<String>, args: Vec<Value>) -> Self {
        let alias = alias.into();
        match self.entries.iter_mut().find(|(name, _)| *name == alias) {
            Some(entry) => entry.1 = args,
            None => self.entries.push((alias, args)),
        }
        self
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(alias, _)| alias.as_str())
    }

    /// Hook arguments for `alias`; empty for middleware the route does not name.
    pub fn args(&self, alias: &str) -> &[Value] {
        self.entries
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, args)| args.as_slice())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Controller entries first, then route entries; a route entry overrides the controller's.
    pub fn unify(controller: Option<&MiddlewareInfo>, route: Option<&MiddlewareInfo>) -> Option<Self> {
        if controller.is_none() && route.is_none() {
            return None;
        }
        let base = controller.cloned().unwrap_or_default();
        Some(
            route
                .into_iter()
                .flat_map(|info| info.entries.iter().cloned())
                .fold(base, |info, (alias, args)| info.with(alias, args)),
        )
    }
}

/// URL a controller method is mounted under.
///
/// # Behavior
/// - No base path and no route path: `/<controller>/<method>`.
/// - Otherwise `/<base>` (empty without a base path) followed by `/<route>`, where the route
///   path falls back to the method name. Surrounding slashes of both parts are trimmed.
pub fn join_route_path(
    base_path: Option<&str>,
    route_path: Option<&str>,
    controller: &str,
    method: &str,
) -> String {
    let route_path = route_path.filter(|path| !path.is_empty());
    let base = match base_path.filter(|path| !path.is_empty()) {
        None if route_path.is_none() => return format!("/{}/{}", controller, method),
        None => String::new(),
        Some(base) => format!("/{}", base.trim_matches('/')),
    };
    let route = match route_path.map(|path| path.trim_matches('/')) {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => method,
    };
    format!("{}/{}", base, route)
}

/// A controller as handed over by the component container.
///
/// ```text
/// ┌────────────────┐
/// │ControllerConfig├───┤ name, base path, controller middleware
/// └┬───────────────┘
///  │  ┌───────────┐
///  └─►│RouteConfig├───┤ one handler method mounted for one or more request methods
///     └┬──────────┘
///      │  ┌──────────┐
///      ├─►│Middleware├───┤ overrides the controller entries of the same alias
///      │  ├──────────┤
///      ├─►│Validation├───┤ compiled once, shared by every method of the route
///      │  ├──────────┤
///      └─►│  Params  ├───┤ declared handler parameters, turned into injectors
///         └──────────┘
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    pub name: String,
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default)]
    pub middleware: Option<MiddlewareInfo>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    /// Method of the controller service invoked for this route.
    pub handler: String,
    pub methods: Vec<RequestMethod>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub middleware: Option<MiddlewareInfo>,
    #[serde(default)]
    pub validation: Option<ValidationSchema>,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
}

impl ControllerConfig {
    /// Expands every configured route into definitions the router can register.
    ///
    /// # Errors
    /// A declared parameter that cannot be injected.
    pub fn route_definitions(&self) -> Result<Vec<RouteDefinition>, ParamInjectionError> {
        self.routes
            .iter()
            .map(|route| {
                let handler = format!("{}.{}", self.name, route.handler);
                let injectors = ParamInjector::derive(&handler, &route.params)?;
                let mut ext_info = RouteExtInfo::new().with_param_injectors(injectors);
                if let Some(schema) = &route.validation {
                    ext_info = ext_info.with_schema(schema);
                }
                if let Some(info) =
                    MiddlewareInfo::unify(self.middleware.as_ref(), route.middleware.as_ref())
                {
                    ext_info = ext_info.with_middleware_info(info);
                }
                let path = join_route_path(
                    self.base_path.as_deref(),
                    route.path.as_deref(),
                    &self.name,
                    &route.handler,
                );
                Ok(RouteDefinition {
                    methods: route.methods.clone(),
                    pattern: RoutePattern::Path(path),
                    handler: RouteHandler::Service(handler),
                    ext_info,
                })
            })
            .collect()
    }
}

/// One pattern and handler to register for a set of request methods.
pub struct RouteDefinition {
    pub(crate) methods: Vec<RequestMethod>,
    pub(crate) pattern: RoutePattern,
    pub(crate) handler: RouteHandler,
    pub(crate) ext_info: RouteExtInfo,
}

impl RouteDefinition {
    pub fn builder(
        pattern: impl Into<RoutePattern>,
        handler: impl Into<RouteHandler>,
    ) -> builder::RouteDefinitionBuilder {
        builder::RouteDefinitionBuilder::new(pattern.into(), handler.into())
    }

    pub fn methods(&self) -> &[RequestMethod] {
        &self.methods
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn ext_info(&self) -> &RouteExtInfo {
        &self.ext_info
    }
}

pub mod builder {
    use super::*;

    /// Shared request-method selection for the route builders.
    pub trait MethodSelector: Sized {
        fn add_method(&mut self, method: RequestMethod);

        fn methods(mut self, methods: &[RequestMethod]) -> Self {
            for method in methods {
                self.add_method(*method);
            }
            self
        }

        fn get(mut self) -> Self {
            self.add_method(RequestMethod::Get);
            self
        }

        fn post(mut self) -> Self {
            self.add_method(RequestMethod::Post);
            self
        }

        fn put(mut self) -> Self {
            self.add_method(RequestMethod::Put);
            self
        }

        fn delete(mut self) -> Self {
            self.add_method(RequestMethod::Delete);
            self
        }

        fn patch(mut self) -> Self {
            self.add_method(RequestMethod::Patch);
            self
        }

        fn head(mut self) -> Self {
            self.add_method(RequestMethod::Head);
            self
        }

        fn options(mut self) -> Self {
            self.add_method(RequestMethod::Options);
            self
        }
    }

    fn push_method(methods: &mut Vec<RequestMethod>, method: RequestMethod) {
        if !methods.contains(&method) {
            methods.push(method);
        }
    }

    pub struct RouteDefinitionBuilder {
        pattern: RoutePattern,
        handler: RouteHandler,
        methods: Vec<RequestMethod>,
        middleware: MiddlewareInfo,
        validator: Option<Arc<FieldValidator>>,
        params: Vec<ParamDecl>,
    }

    impl RouteDefinitionBuilder {
        pub(super) fn new(pattern: RoutePattern, handler: RouteHandler) -> Self {
            Self {
                pattern,
                handler,
                methods: Vec::new(),
                middleware: MiddlewareInfo::new(),
                validator: None,
                params: Vec::new(),
            }
        }

        pub fn middleware(mut self, alias: impl Into<String>) -> Self {
            self.middleware = self.middleware.with(alias, Vec::new());
            self
        }

        pub fn middleware_with_args(mut self, alias: impl Into<String>, args: Vec<Value>) -> Self {
            self.middleware = self.middleware.with(alias, args);
            self
        }

        pub fn validate(mut self, schema: &ValidationSchema) -> Self {
            self.validator = Some(Arc::new(FieldValidator::compile(schema)));
            self
        }

        pub fn param(mut self, param: ParamDecl) -> Self {
            self.params.push(param);
            self
        }

        /// # Errors
        /// A declared parameter that cannot be injected.
        pub fn build(self) -> Result<RouteDefinition, ParamInjectionError> {
            let function = match &self.handler {
                RouteHandler::Service(identifier) => identifier.clone(),
                RouteHandler::Callable(handler) => handler.name().to_string(),
            };
            let mut ext_info = RouteExtInfo::new()
                .with_param_injectors(ParamInjector::derive(&function, &self.params)?)
                .with_middleware_info(self.middleware);
            if let Some(validator) = self.validator {
                ext_info = ext_info.with_validator(validator);
            }
            Ok(RouteDefinition {
                methods: self.methods,
                pattern: self.pattern,
                handler: self.handler,
                ext_info,
            })
        }
    }

    impl MethodSelector for RouteDefinitionBuilder {
        fn add_method(&mut self, method: RequestMethod) {
            push_method(&mut self.methods, method);
        }
    }

    /// Builds a [`ControllerConfig`] without going through serde.
    pub struct ControllerConfigBuilder {
        config: ControllerConfig,
    }

    impl ControllerConfigBuilder {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                config: ControllerConfig {
                    name: name.into(),
                    base_path: None,
                    middleware: None,
                    routes: Vec::new(),
                },
            }
        }

        pub fn base_path(mut self, path: impl Into<String>) -> Self {
            self.config.base_path = Some(path.into());
            self
        }

        pub fn middleware(mut self, alias: impl Into<String>, args: Vec<Value>) -> Self {
            let info = self.config.middleware.take().unwrap_or_default();
            self.config.middleware = Some(info.with(alias, args));
            self
        }

        /// Starts a route invoking the controller method `handler`.
        pub fn route(self, handler: impl Into<String>) -> ControllerRouteBuilder {
            ControllerRouteBuilder {
                controller: self,
                route: RouteConfig {
                    handler: handler.into(),
                    methods: Vec::new(),
                    path: None,
                    middleware: None,
                    validation: None,
                    params: Vec::new(),
                },
            }
        }

        pub fn build(self) -> ControllerConfig {
            self.config
        }
    }

    pub struct ControllerRouteBuilder {
        controller: ControllerConfigBuilder,
        route: RouteConfig,
    }

    impl ControllerRouteBuilder {
        pub fn path(mut self, path: impl Into<String>) -> Self {
            self.route.path = Some(path.into());
            self
        }

        pub fn middleware(mut self, alias: impl Into<String>, args: Vec<Value>) -> Self {
            let info = self.route.middleware.take().unwrap_or_default();
            self.route.middleware = Some(info.with(alias, args));
            self
        }

        pub fn validate(mut self, schema: ValidationSchema) -> Self {
            self.route.validation = Some(schema);
            self
        }

        pub fn param(mut self, param: ParamDecl) -> Self {
            self.route.params.push(param);
            self
        }

        /// Return to the controller builder to configure other routes or complete the configuration
        pub fn end_route(self) -> ControllerConfigBuilder {
            let mut controller = self.controller;
            controller.config.routes.push(self.route);
            controller
        }
    }

    impl MethodSelector for ControllerRouteBuilder {
        fn add_method(&mut self, method: RequestMethod) {
            push_method(&mut self.route.methods, method);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::RequestContext;
    use crate::middleware::{Middleware, MiddlewareSettings};
    use serde_json::json;

    #[test]
    fn test_join_route_path() {
        assert_eq!(join_route_path(None, None, "orders", "list"), "/orders/list");
        assert_eq!(join_route_path(None, Some("/all/"), "orders", "list"), "/all");
        assert_eq!(join_route_path(Some("/api/"), None, "orders", "list"), "/api/list");
        assert_eq!(join_route_path(Some("api"), Some("//"), "orders", "list"), "/api/list");
        assert_eq!(
            join_route_path(Some("/api"), Some("items/:id"), "orders", "show"),
            "/api/items/:id"
        );
    }

    #[test]
    fn test_unify_middleware_info() {
        let controller: MiddlewareInfo = serde_json::from_value(json!(["auth", "trace"])).unwrap();
        let route: MiddlewareInfo =
            serde_json::from_value(json!({"auth": ["admin"], "audit": null})).unwrap();
        let unified = MiddlewareInfo::unify(Some(&controller), Some(&route)).unwrap();
        assert_eq!(unified.aliases().collect::<Vec<_>>(), vec!["auth", "trace", "audit"]);
        assert_eq!(unified.args("auth"), &[json!("admin")]);
        assert!(unified.args("audit").is_empty());
        assert!(unified.args("ghost").is_empty());
        assert!(MiddlewareInfo::unify(None, None).is_none());
        assert_eq!(MiddlewareInfo::unify(None, Some(&route)).unwrap().len(), 2);
    }

    #[test]
    fn test_controller_config_deserialize() {
        let config: ControllerConfig = serde_json::from_value(json!({
            "name": "users",
            "middleware": ["auth"],
            "routes": [{
                "handler": "create",
                "methods": ["post"],
                "validation": {"rules": {"name": "required"}},
                "params": [{"name": "body", "kind": "object", "marker": "requestBody"}]
            }]
        }))
        .unwrap();
        let definitions = config.route_definitions().unwrap();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].pattern().to_string(), "/users/create");
        assert_eq!(definitions[0].methods(), &[RequestMethod::Post]);
        assert!(definitions[0].ext_info().validator().is_some());
        assert_eq!(
            definitions[0].ext_info().param_injectors(),
            &[ParamInjector::RequestBody]
        );
    }

    struct Count;

    impl Middleware for Count {
        fn before_processing(&self, _ctx: &mut RequestContext, _args: &[Value]) -> bool {
            true
        }

        fn after_processing(&self, _ctx: &mut RequestContext, _args: &[Value]) -> bool {
            true
        }
    }

    #[test]
    fn test_current_middleware_is_memoised() {
        let manager = MiddlewareManager::new("development");
        manager
            .register_middleware("auth", Count, MiddlewareSettings::default())
            .unwrap();
        let ext = RouteExtInfo::new().with_middleware_info(MiddlewareInfo::from_names(["auth"]));
        assert_eq!(ext.current_middleware(&manager).len(), 1);

        manager
            .register_middleware("late", Count, MiddlewareSettings::default().global())
            .unwrap();
        assert_eq!(ext.current_middleware(&manager).len(), 1);
    }
}
