#[cfg(feature = "hyper")]
pub mod hyper;

use crate::error::HttpError;
use crate::exchange::RequestContext;
use crate::handler::{HandlerError, HandlerOutput, InjectedParam};
use crate::logger::{Component, LogEntry, LogLevel};
use crate::middleware::MiddlewareManager;
use crate::router::method::RequestMethod;
use crate::router::register::RouteRegister;
use crate::router::{LookupOutcome, RouteMatch};
use crate::status::DispatchState;
use crate::validation::validate_request;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;

const REDIRECT_PREFIX: &str = "redirect:";
const REDIRECT_PERMANENT_PREFIX: &str = "redirect-permanent:";
const PERMANENT_REDIRECT_BODY: &str = "Now forwarding ...";

/// How the surrounding HTTP pipeline should continue after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The context response is final.
    Handled,
    /// Not handled here; hand the request to the next HTTP-layer middleware.
    Next,
}

/// Drives one request through lookup, middleware, validation, injection, the handler and
/// response shaping.
///
/// # Behavior
/// `dispatch` never fails. Lookup misses, validation failures and handler errors are all
/// written into the context response:
/// - an unknown method string or a path served only under other methods renders 405
/// - a path with no matching route renders 404
/// - a rejected payload renders 422 with one member per failed field
/// - an [`HttpError`] raised by a handler renders with its own status and body
/// - anything else renders 500
pub struct RequestDispatcher {
    register: Arc<RouteRegister>,
    middleware: Arc<MiddlewareManager>,
    request_logger: bool,
}

impl RequestDispatcher {
    pub fn new(register: Arc<RouteRegister>, middleware: Arc<MiddlewareManager>) -> Self {
        Self {
            register,
            middleware,
            request_logger: false,
        }
    }

    /// Emits one JSON access-log line per dispatched request.
    pub fn with_request_logger(mut self, enabled: bool) -> Self {
        self.request_logger = enabled;
        self
    }

    pub fn register(&self) -> &Arc<RouteRegister> {
        &self.register
    }

    pub fn middleware(&self) -> &Arc<MiddlewareManager> {
        &self.middleware
    }

    pub async fn dispatch(&self, ctx: &mut RequestContext) -> DispatchOutcome {
        let started = Instant::now();
        let outcome = match self.process(ctx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                render_error(ctx, err);
                DispatchOutcome::Handled
            }
        };
        if self.request_logger {
            log_access(ctx, outcome, started);
        }
        outcome
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<DispatchOutcome, HandlerError> {
        let method: RequestMethod = ctx
            .method()
            .parse()
            .map_err(|_| HttpError::method_not_allowed(&ctx.method().to_uppercase()))?;

        let matched: Arc<RouteMatch> = match self.register.router().get_route(method, ctx.path()) {
            LookupOutcome::Matched(matched) => matched,
            LookupOutcome::MethodNotAllowed => {
                return Err(HttpError::method_not_allowed(&method.to_string()).into());
            }
            LookupOutcome::NotFound => {
                return Err(HttpError::not_found(ctx.original_url()).into());
            }
        };
        ctx.mark(DispatchState::ROUTED);
        populate_parameters(ctx, matched.params());

        let route = matched.route();
        let ext_info = route.ext_info();
        let middleware_info = ext_info.middleware_info();
        let chain = ext_info.current_middleware(&self.middleware);

        for middleware in chain {
            if !middleware.before_processing(ctx, middleware_info.args(middleware.alias())) {
                log::debug!(
                    "Middleware '{}' stopped {} {}",
                    middleware.alias(),
                    method,
                    ctx.path()
                );
                ctx.mark(DispatchState::MIDDLEWARE_STOPPED | DispatchState::FALL_THROUGH);
                return Ok(DispatchOutcome::Next);
            }
        }

        if let Some(validator) = ext_info.validator() {
            let data = ctx.take_body_object().unwrap_or_default();
            let filtered = validate_request(validator, data)?;
            ctx.set_body_object(filtered);
            ctx.mark(DispatchState::VALIDATED);
        }

        let args: Vec<InjectedParam> = ext_info
            .param_injectors()
            .iter()
            .map(|injector| injector.inject(ctx))
            .collect();
        let output = route.handler().exec(ctx, args).await?;
        ctx.mark(DispatchState::HANDLED);

        let outcome = shape_response(ctx, output);

        for middleware in chain.iter().rev() {
            if !middleware.after_processing(ctx, middleware_info.args(middleware.alias())) {
                break;
            }
        }
        Ok(outcome)
    }
}

/// Fills the request and route parameter bags and the merged body object.
///
/// Request parameters are the body members overlaid with the query; the body object is
/// the request parameters overlaid with the route parameters.
fn populate_parameters(ctx: &mut RequestContext, route_parameters: &Map<String, Value>) {
    let mut request_parameters = match ctx.body() {
        Some(Value::Object(body)) => body.clone(),
        _ => Map::new(),
    };
    for (key, value) in ctx.query() {
        request_parameters.insert(key.clone(), value.clone());
    }
    let mut body_object = request_parameters.clone();
    for (key, value) in route_parameters {
        body_object.insert(key.clone(), value.clone());
    }
    ctx.set_parameters(request_parameters, route_parameters.clone());
    ctx.set_body_object(Value::Object(body_object));
}

fn shape_response(ctx: &mut RequestContext, output: HandlerOutput) -> DispatchOutcome {
    match output {
        HandlerOutput::Undefined | HandlerOutput::Context => {
            if ctx.to_next() {
                ctx.mark(DispatchState::FALL_THROUGH);
                return DispatchOutcome::Next;
            }
        }
        HandlerOutput::Text(text) => {
            if let Some(url) = text.strip_prefix(REDIRECT_PREFIX) {
                ctx.response_mut().redirect(url);
                ctx.mark(DispatchState::REDIRECTED);
            } else if let Some(url) = text.strip_prefix(REDIRECT_PERMANENT_PREFIX) {
                let response = ctx.response_mut();
                response.set_status(301);
                response.redirect(url);
                response.set_body(Value::String(PERMANENT_REDIRECT_BODY.to_string()));
                ctx.mark(DispatchState::REDIRECTED);
            } else {
                ctx.response_mut()
                    .set_body(json!({"code": "SUCCESS", "msg": "OK", "body": text}));
            }
        }
        HandlerOutput::Response(response) => {
            ctx.set_status(response.status());
            ctx.response_mut().set_body(response.body().clone());
        }
        HandlerOutput::Json(value @ (Value::Object(_) | Value::Array(_))) => {
            ctx.response_mut().set_body(value);
        }
        HandlerOutput::Json(primitive) => {
            ctx.response_mut().set_body(json!({ "body": primitive }));
        }
    }
    DispatchOutcome::Handled
}

fn render_error(ctx: &mut RequestContext, err: HandlerError) {
    let http_error = match err {
        HandlerError::Http(http_error) => http_error,
        other => {
            log::error!(
                "Unhandled error while dispatching {} {}: {}",
                ctx.method(),
                ctx.original_url(),
                other
            );
            HttpError::internal()
        }
    };
    ctx.mark(DispatchState::for_error_status(http_error.status()));
    ctx.set_status(http_error.status());
    ctx.response_mut().set_body(http_error.response_body());
}

fn log_access(ctx: &RequestContext, outcome: DispatchOutcome, started: Instant) {
    let level = if ctx.state().any_flags(DispatchState::SERVER_ERROR) {
        LogLevel::ERROR
    } else {
        LogLevel::INFO
    };
    LogEntry::new(level, Component::Dispatcher, "request dispatched")
        .request_id(ctx.uuid())
        .field("method", ctx.method().to_uppercase())
        .field("url", ctx.original_url())
        .field("status", ctx.response().status())
        .field("state", ctx.state().to_string())
        .field("next", outcome == DispatchOutcome::Next)
        .field("elapsed_us", started.elapsed().as_micros() as u64)
        .emit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::params::{ParamDecl, ParamInjector, ParamKind};
    use crate::handler::registry::{Service, ServiceRegistry};
    use crate::handler::{BaseResponse, FnHandler};
    use crate::middleware::{Middleware, MiddlewareSettings};
    use crate::router::RouteHandler;
    use crate::router::config::{MiddlewareInfo, RouteExtInfo};
    use crate::validation::ValidationSchema;
    use async_trait::async_trait;

    struct Fixture {
        register: Arc<RouteRegister>,
        services: Arc<ServiceRegistry>,
        middleware: Arc<MiddlewareManager>,
        dispatcher: RequestDispatcher,
    }

    fn fixture() -> Fixture {
        let register = Arc::new(RouteRegister::new("test", 16));
        let services = Arc::new(ServiceRegistry::new());
        register
            .init_service_resolver(services.clone(), false)
            .unwrap();
        let middleware = Arc::new(MiddlewareManager::new("test"));
        let dispatcher = RequestDispatcher::new(register.clone(), middleware.clone())
            .with_request_logger(true);
        Fixture {
            register,
            services,
            middleware,
            dispatcher,
        }
    }

    fn callable<F>(func: F) -> RouteHandler
    where
        F: Fn(&mut RequestContext, Vec<InjectedParam>) -> Result<HandlerOutput, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        RouteHandler::callable(FnHandler::new("test", func))
    }

    fn injectors(params: &[ParamDecl]) -> RouteExtInfo {
        RouteExtInfo::default().with_param_injectors(ParamInjector::derive("test", params).unwrap())
    }

    fn push_trail(ctx: &mut RequestContext, entry: String) {
        let mut trail = match ctx.attribute("trail") {
            Some(Value::Array(trail)) => trail.clone(),
            _ => Vec::new(),
        };
        trail.push(Value::String(entry));
        ctx.set_attribute("trail", Value::Array(trail));
    }

    struct Recorder {
        name: &'static str,
        pass: bool,
    }

    impl Middleware for Recorder {
        fn before_processing(&self, ctx: &mut RequestContext, args: &[Value]) -> bool {
            let args: Vec<&str> = args.iter().filter_map(Value::as_str).collect();
            push_trail(ctx, format!("before:{}({})", self.name, args.join(",")));
            self.pass
        }

        fn after_processing(&self, ctx: &mut RequestContext, _args: &[Value]) -> bool {
            push_trail(ctx, format!("after:{}", self.name));
            true
        }
    }

    #[tokio::test]
    async fn test_plain_string_is_wrapped() {
        let f = fixture();
        f.register
            .get("/a/b/c", callable(|_, _| Ok("handlerX".into())), RouteExtInfo::default())
            .unwrap();
        let mut ctx = RequestContext::new("get", "/a/b/c");
        assert_eq!(f.dispatcher.dispatch(&mut ctx).await, DispatchOutcome::Handled);
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(
            ctx.response().body(),
            Some(&json!({"code": "SUCCESS", "msg": "OK", "body": "handlerX"}))
        );
        assert!(ctx.state().all_flags(DispatchState::ROUTED | DispatchState::HANDLED));
    }

    #[tokio::test]
    async fn test_path_parameters_and_injection() {
        let f = fixture();
        let ext = injectors(&[
            ParamDecl::new("id", ParamKind::Number),
            ParamDecl::new("name", ParamKind::String),
            ParamDecl::new("page", ParamKind::Any),
            ParamDecl::request_body("payload"),
        ]);
        f.register
            .put(
                "/a/check/param/:id/sec/:name",
                callable(|_, args| {
                    let args: Vec<Value> = args
                        .into_iter()
                        .map(|arg| arg.into_value().unwrap_or(Value::Null))
                        .collect();
                    Ok(HandlerOutput::Json(Value::Array(args)))
                }),
                ext,
            )
            .unwrap();
        let mut ctx = RequestContext::new("PUT", "/a/check/param/123/sec/abc?page=2")
            .with_body(json!({"page": "1", "note": "hi"}));
        f.dispatcher.dispatch(&mut ctx).await;

        assert_eq!(
            ctx.route_parameters(),
            json!({"id": "123", "name": "abc"}).as_object().unwrap()
        );
        assert_eq!(ctx.request_parameters()["page"], json!("2"));
        assert_eq!(
            ctx.response().body(),
            Some(&json!([
                123,
                "abc",
                "2",
                {"page": "2", "note": "hi", "id": "123", "name": "abc"}
            ]))
        );
    }

    #[tokio::test]
    async fn test_validation_failure_and_success() {
        let f = fixture();
        let schema: ValidationSchema =
            serde_json::from_value(json!({"rules": {"name": "required"}})).unwrap();
        f.register
            .post(
                "/users",
                callable(|ctx, _| Ok(HandlerOutput::Json(ctx.body_object().unwrap().clone()))),
                RouteExtInfo::default().with_schema(&schema),
            )
            .unwrap();

        let mut ctx = RequestContext::new("post", "/users").with_body(json!({}));
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 422);
        let body = ctx.response().body().unwrap();
        assert_eq!(body["code"], "request.validation.error");
        assert_eq!(body["name"], "Field 'name' is mandatory.");
        assert!(ctx.state().any_flags(DispatchState::CLIENT_ERROR));
        assert!(!ctx.state().any_flags(DispatchState::HANDLED));

        let mut ctx = RequestContext::new("post", "/users").with_body(json!({"name": "x"}));
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(ctx.response().body(), Some(&json!({"name": "x"})));
        assert!(ctx.state().any_flags(DispatchState::VALIDATED));
    }

    #[tokio::test]
    async fn test_lookup_failures() {
        let f = fixture();
        f.register
            .get("/orders/:id", callable(|_, _| Ok("order".into())), RouteExtInfo::default())
            .unwrap();

        let mut ctx = RequestContext::new("get", "/missing?x=1");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 404);
        assert_eq!(
            ctx.response().body(),
            Some(&json!({"code": 404, "message": "Resource not found for [/missing?x=1]"}))
        );

        let mut ctx = RequestContext::new("delete", "/orders/1");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 405);
        assert_eq!(
            ctx.response().body().unwrap()["message"],
            "Invalid request method: DELETE"
        );

        let mut ctx = RequestContext::new("brew", "/orders/1");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 405);
        assert_eq!(
            ctx.response().body().unwrap()["message"],
            "Invalid request method: BREW"
        );
        assert!(!ctx.state().any_flags(DispatchState::ROUTED));
    }

    #[tokio::test]
    async fn test_middleware_order_args_and_reverse_after_hooks() {
        let f = fixture();
        f.middleware
            .register_middleware(
                "audit",
                Recorder { name: "audit", pass: true },
                MiddlewareSettings::default().global().order(1),
            )
            .unwrap();
        f.middleware
            .register_middleware(
                "auth",
                Recorder { name: "auth", pass: true },
                MiddlewareSettings::default().order(5),
            )
            .unwrap();
        let info = MiddlewareInfo::new().with("auth", vec![json!("admin")]);
        f.register
            .get(
                "/admin",
                callable(|ctx, _| {
                    push_trail(ctx, "handler".to_string());
                    Ok(HandlerOutput::Undefined)
                }),
                RouteExtInfo::default().with_middleware_info(info),
            )
            .unwrap();

        let mut ctx = RequestContext::new("get", "/admin");
        assert_eq!(f.dispatcher.dispatch(&mut ctx).await, DispatchOutcome::Handled);
        assert_eq!(
            ctx.attribute("trail"),
            Some(&json!([
                "before:audit()",
                "before:auth(admin)",
                "handler",
                "after:auth",
                "after:audit"
            ]))
        );
        assert_eq!(ctx.response().status(), 404);
    }

    #[tokio::test]
    async fn test_stopping_middleware_falls_through() {
        let f = fixture();
        f.middleware
            .register_middleware(
                "gate",
                Recorder { name: "gate", pass: false },
                MiddlewareSettings::default(),
            )
            .unwrap();
        f.register
            .get(
                "/closed",
                callable(|ctx, _| {
                    push_trail(ctx, "handler".to_string());
                    Ok("unreachable".into())
                }),
                RouteExtInfo::default().with_middleware_info(MiddlewareInfo::from_names(["gate"])),
            )
            .unwrap();

        let mut ctx = RequestContext::new("get", "/closed");
        assert_eq!(f.dispatcher.dispatch(&mut ctx).await, DispatchOutcome::Next);
        assert_eq!(ctx.attribute("trail"), Some(&json!(["before:gate()"])));
        assert!(ctx.state().any_flags(DispatchState::MIDDLEWARE_STOPPED));
        assert!(ctx.response().body().is_none());
    }

    #[tokio::test]
    async fn test_response_shaping() {
        let f = fixture();
        f.register
            .get("/temp", callable(|_, _| Ok("redirect:/elsewhere".into())), RouteExtInfo::default())
            .unwrap();
        f.register
            .get(
                "/moved",
                callable(|_, _| Ok("redirect-permanent:/new-home".into())),
                RouteExtInfo::default(),
            )
            .unwrap();
        f.register
            .get("/count", callable(|_, _| Ok(json!(5).into())), RouteExtInfo::default())
            .unwrap();
        f.register
            .get(
                "/created",
                callable(|_, _| Ok(BaseResponse::new(json!({"id": 1})).with_status(201).into())),
                RouteExtInfo::default(),
            )
            .unwrap();
        f.register
            .get(
                "/pass",
                callable(|ctx, _| {
                    ctx.set_to_next(true);
                    Ok(HandlerOutput::Context)
                }),
                RouteExtInfo::default(),
            )
            .unwrap();

        let mut ctx = RequestContext::new("get", "/temp");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 302);
        assert_eq!(ctx.response().header("location"), Some("/elsewhere"));

        let mut ctx = RequestContext::new("get", "/moved");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 301);
        assert_eq!(ctx.response().header("Location"), Some("/new-home"));
        assert_eq!(ctx.response().body(), Some(&json!("Now forwarding ...")));
        assert!(ctx.state().any_flags(DispatchState::REDIRECTED));

        let mut ctx = RequestContext::new("get", "/count");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().body(), Some(&json!({"body": 5})));

        let mut ctx = RequestContext::new("get", "/created");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 201);
        assert_eq!(ctx.response().body(), Some(&json!({"id": 1})));

        let mut ctx = RequestContext::new("get", "/pass");
        assert_eq!(f.dispatcher.dispatch(&mut ctx).await, DispatchOutcome::Next);
        assert!(ctx.state().any_flags(DispatchState::FALL_THROUGH));
    }

    #[tokio::test]
    async fn test_handler_errors() {
        let f = fixture();
        f.register
            .post(
                "/orders",
                callable(|_, _| {
                    Err(HttpError::new(409, "order.exists", "Order already exists")
                        .with_extra("orderId", json!(7))
                        .into())
                }),
                RouteExtInfo::default(),
            )
            .unwrap();
        f.register
            .get(
                "/orders",
                callable(|_, _| Err(HandlerError::internal("orders.list", "database offline"))),
                RouteExtInfo::default(),
            )
            .unwrap();

        let mut ctx = RequestContext::new("post", "/orders");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 409);
        assert_eq!(
            ctx.response().body(),
            Some(&json!({"code": "order.exists", "message": "Order already exists", "orderId": 7}))
        );

        let mut ctx = RequestContext::new("get", "/orders");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 500);
        assert_eq!(
            ctx.response().body(),
            Some(&json!({"code": 500, "message": "Internal Server Error"}))
        );
        assert!(ctx.state().any_flags(DispatchState::SERVER_ERROR));
    }

    struct Greeter;

    #[async_trait]
    impl Service for Greeter {
        async fn invoke(
            &self,
            _method: &str,
            _ctx: &mut RequestContext,
            args: Vec<InjectedParam>,
        ) -> Result<HandlerOutput, HandlerError> {
            let name = args.first().and_then(InjectedParam::as_str).unwrap_or("stranger");
            Ok(format!("hello {}", name).into())
        }

        fn has_method(&self, method: &str) -> bool {
            method == "greet"
        }
    }

    #[tokio::test]
    async fn test_service_handlers() {
        let f = fixture();
        f.services.register_service("greeter", Greeter).unwrap();
        let ext = injectors(&[ParamDecl::new("name", ParamKind::String)]);
        f.register.get("/greet/:name", "greeter.greet", ext).unwrap();
        f.register
            .get("/wave", "greeter.wave", RouteExtInfo::default())
            .unwrap();

        let mut ctx = RequestContext::new("get", "/greet/ada");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().body().unwrap()["body"], "hello ada");

        let mut ctx = RequestContext::new("get", "/wave");
        f.dispatcher.dispatch(&mut ctx).await;
        assert_eq!(ctx.response().status(), 500);
    }
}
