pub mod config;
pub mod params;
pub mod registry;

use crate::error::HttpError;
use crate::exchange::RequestContext;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

pub type SharedHandler = Arc<dyn Handler>;

/// A route handler.
///
/// `args` holds one entry per declared handler parameter, produced by the route's
/// parameter injectors in declaration order.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn exec(
        &self,
        ctx: &mut RequestContext,
        args: Vec<InjectedParam>,
    ) -> Result<HandlerOutput, HandlerError>;

    fn name(&self) -> &str;
}

/// One injected handler argument.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectedParam {
    Value(Value),
    /// The parameter had nothing to bind to.
    Undefined,
    /// Position of the request context; the handler already receives it as `ctx`.
    Context,
    /// Position of the `next` continuation; calling it means `ctx.set_to_next(true)`.
    Next,
}

impl InjectedParam {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            InjectedParam::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            InjectedParam::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, InjectedParam::Undefined)
    }
}

/// The recognised response wrapper: an explicit status plus body.
///
/// Bodies that are not objects or arrays are wrapped as `{"body": value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseResponse {
    status: u16,
    body: Value,
}

impl BaseResponse {
    pub fn new(body: Value) -> Self {
        let body = match body {
            Value::Object(_) | Value::Array(_) => body,
            primitive => {
                let mut wrapped = Map::new();
                wrapped.insert("body".to_string(), primitive);
                Value::Object(wrapped)
            }
        };
        Self { status: 200, body }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// What a handler hands back to the dispatcher for response shaping.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// Nothing was returned.
    Undefined,
    /// The handler returned the context itself, treated like `Undefined`.
    Context,
    /// A string; `redirect:` and `redirect-permanent:` prefixes are honoured.
    Text(String),
    Json(Value),
    Response(BaseResponse),
}

impl From<()> for HandlerOutput {
    fn from(_: ()) -> Self {
        HandlerOutput::Undefined
    }
}

impl From<&str> for HandlerOutput {
    fn from(value: &str) -> Self {
        HandlerOutput::Text(value.to_string())
    }
}

impl From<String> for HandlerOutput {
    fn from(value: String) -> Self {
        HandlerOutput::Text(value)
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => HandlerOutput::Text(text),
            other => HandlerOutput::Json(other),
        }
    }
}

impl From<BaseResponse> for HandlerOutput {
    fn from(value: BaseResponse) -> Self {
        HandlerOutput::Response(value)
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    /// An error that renders with its own status and body.
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Request handler not found:{service}->{method}")]
    ServiceNotFound { service: String, method: String },

    #[error("Handler '{handler}' failed: {message}")]
    Internal { handler: String, message: String },
}

impl HandlerError {
    #[inline]
    pub(crate) fn service_not_found(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self::ServiceNotFound {
            service: service.into(),
            method: method.into(),
        }
    }

    #[inline]
    pub fn internal(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

type SyncHandlerFn =
    dyn Fn(&mut RequestContext, Vec<InjectedParam>) -> Result<HandlerOutput, HandlerError>
        + Send
        + Sync;

/// A handler backed by a plain closure.
pub struct FnHandler {
    name: String,
    func: Box<SyncHandlerFn>,
}

impl FnHandler {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut RequestContext, Vec<InjectedParam>) -> Result<HandlerOutput, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Handler for FnHandler {
    async fn exec(
        &self,
        ctx: &mut RequestContext,
        args: Vec<InjectedParam>,
    ) -> Result<HandlerOutput, HandlerError> {
        (self.func)(ctx, args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

type AsyncHandlerFn = dyn for<'a> Fn(
        &'a mut RequestContext,
        Vec<InjectedParam>,
    ) -> BoxFuture<'a, Result<HandlerOutput, HandlerError>>
    + Send
    + Sync;

/// A handler backed by a closure returning a boxed future.
///
/// ```rust,ignore
/// let handler = AsyncFnHandler::new("slow", |ctx, _args| {
///     Box::pin(async move {
///         tokio::time::sleep(Duration::from_millis(5)).await;
///         Ok(HandlerOutput::from(ctx.path().to_string()))
///     })
/// });
/// ```
pub struct AsyncFnHandler {
    name: String,
    func: Box<AsyncHandlerFn>,
}

impl AsyncFnHandler {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: for<'a> Fn(
                &'a mut RequestContext,
                Vec<InjectedParam>,
            ) -> BoxFuture<'a, Result<HandlerOutput, HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Handler for AsyncFnHandler {
    async fn exec(
        &self,
        ctx: &mut RequestContext,
        args: Vec<InjectedParam>,
    ) -> Result<HandlerOutput, HandlerError> {
        (self.func)(ctx, args).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
