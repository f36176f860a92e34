use crate::dispatcher::{DispatchOutcome, RequestDispatcher};
use crate::error::HttpError;
use crate::exchange::RequestContext;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};
use serde_json::{Map, Value};
use std::fmt::Display;

/// Builds request contexts from hyper requests.
pub struct HyperExchangeFactory;

impl HyperExchangeFactory {
    /// Collects the request body and builds a context from it.
    ///
    /// # Behavior
    /// Headers whose value is not visible ASCII are skipped. An empty body becomes `{}`.
    ///
    /// # Errors
    /// A 400 [`HttpError`] when the body cannot be read or is not valid JSON.
    pub async fn create_context<B>(&self, request: Request<B>) -> Result<RequestContext, HttpError>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = request.into_parts();
        let original_url = parts
            .uri
            .path_and_query()
            .map(|target| target.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let mut ctx = RequestContext::new(parts.method.as_str(), original_url);
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                ctx.set_header(name.as_str(), value);
            }
        }

        let bytes = body
            .collect()
            .await
            .map_err(|e| HttpError::bad_request(format!("Could not read request body: {}", e)))?
            .to_bytes();
        let parsed = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| HttpError::bad_request(format!("Invalid JSON body: {}", e)))?
        };
        Ok(ctx.with_body(parsed))
    }
}

/// Renders the context response, running its response listeners first.
///
/// String bodies are sent as `text/plain`, everything else as JSON.
pub fn into_hyper_response(ctx: &mut RequestContext) -> Response<Full<Bytes>> {
    let response = ctx.finish();
    let status = StatusCode::from_u16(response.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (content_type, payload) = match response.body() {
        None => ("text/plain; charset=utf-8", Bytes::new()),
        Some(Value::String(text)) => ("text/plain; charset=utf-8", Bytes::from(text.clone())),
        Some(json) => (
            "application/json; charset=utf-8",
            Bytes::from(serde_json::to_vec(json).unwrap_or_default()),
        ),
    };

    let mut rendered = Response::new(Full::new(payload));
    *rendered.status_mut() = status;
    let headers = rendered.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    for (name, value) in response.headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => log::warn!("Dropping invalid response header '{}'", name),
        }
    }
    rendered
}

/// Serves one hyper request end to end.
///
/// A request the dispatcher hands on ([`DispatchOutcome::Next`]) has nothing downstream
/// here, so its response is rendered as it stands.
pub async fn handle<B>(dispatcher: &RequestDispatcher, request: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let mut ctx = match HyperExchangeFactory.create_context(request).await {
        Ok(ctx) => ctx,
        Err(err) => {
            let mut ctx = RequestContext::new("GET", "/");
            ctx.set_status(err.status());
            ctx.response_mut().set_body(err.response_body());
            return into_hyper_response(&mut ctx);
        }
    };
    if dispatcher.dispatch(&mut ctx).await == DispatchOutcome::Next {
        log::debug!("No downstream middleware for {}", ctx.original_url());
    }
    into_hyper_response(&mut ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareManager;
    use crate::router::config::RouteExtInfo;
    use crate::router::register::RouteRegister;
    use crate::router::RouteHandler;
    use crate::handler::{FnHandler, HandlerOutput};
    use crate::handler::registry::ServiceRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn request(method: &str, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Trace", "abc")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_context() {
        let ctx = HyperExchangeFactory
            .create_context(request("POST", "/a%20b/c?x=1&x=2", r#"{"name": "x"}"#))
            .await
            .unwrap();
        assert_eq!(ctx.method(), "POST");
        assert_eq!(ctx.path(), "/a b/c");
        assert_eq!(ctx.original_url(), "/a%20b/c?x=1&x=2");
        assert_eq!(ctx.query()["x"], json!(["1", "2"]));
        assert_eq!(ctx.body(), Some(&json!({"name": "x"})));
        assert_eq!(ctx.header("x-trace"), Some("abc"));

        let ctx = HyperExchangeFactory
            .create_context(request("GET", "/", ""))
            .await
            .unwrap();
        assert_eq!(ctx.body(), Some(&json!({})));

        let err = HyperExchangeFactory
            .create_context(request("POST", "/", "{oops"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_handle_renders_dispatch_result() {
        let register = Arc::new(RouteRegister::new("hyper", 8));
        register
            .init_service_resolver(Arc::new(ServiceRegistry::new()), false)
            .unwrap();
        register
            .post(
                "/echo",
                RouteHandler::callable(FnHandler::new("echo", |ctx, _| {
                    Ok(HandlerOutput::Json(ctx.body_object().unwrap().clone()))
                })),
                RouteExtInfo::default(),
            )
            .unwrap();
        register
            .get(
                "/old",
                RouteHandler::callable(FnHandler::new("old", |_, _| Ok("redirect:/new".into()))),
                RouteExtInfo::default(),
            )
            .unwrap();
        let dispatcher = RequestDispatcher::new(register, Arc::new(MiddlewareManager::default()));

        let response = handle(&dispatcher, request("POST", "/echo?q=1", r#"{"a": 1}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(body_json(response).await, json!({"a": 1, "q": "1"}));

        let response = handle(&dispatcher, request("GET", "/old", "")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["location"], "/new");

        let response = handle(&dispatcher, request("GET", "/nothing", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], 404);

        let response = handle(&dispatcher, request("POST", "/echo", "not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
