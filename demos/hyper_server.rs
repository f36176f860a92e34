use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tyber::config::{Config, ProgrammaticConfigProvider, ServerConfig};
use tyber::context::ServerContext;
use tyber::dispatcher::hyper::handle;
use tyber::exchange::RequestContext;
use tyber::handler::registry::Service;
use tyber::handler::{BaseResponse, HandlerError, HandlerOutput, InjectedParam};
use tyber::logger::LoggerConfig;
use tyber::middleware::{Middleware, MiddlewareSettings};
use tyber::router::config::ControllerConfig;

struct GreetingService;

#[async_trait]
impl Service for GreetingService {
    async fn invoke(
        &self,
        method: &str,
        _ctx: &mut RequestContext,
        args: Vec<InjectedParam>,
    ) -> Result<HandlerOutput, HandlerError> {
        match method {
            "hello" => {
                let name = args.first().and_then(InjectedParam::as_str).unwrap_or("World");
                Ok(format!("Hello, {}!", name).into())
            }
            "create" => {
                let body = args
                    .into_iter()
                    .next()
                    .and_then(InjectedParam::into_value)
                    .unwrap_or(Value::Null);
                Ok(BaseResponse::new(json!({"created": body})).with_status(201).into())
            }
            "legacy" => Ok("redirect-permanent:/greetings/hello/legacy".into()),
            _ => Err(HandlerError::internal(method, "no such greeting")),
        }
    }

    fn has_method(&self, method: &str) -> bool {
        matches!(method, "hello" | "create" | "legacy")
    }
}

/// Rejects requests without an `x-api-key` header by handing them on unhandled.
struct ApiKey;

impl Middleware for ApiKey {
    fn before_processing(&self, ctx: &mut RequestContext, _args: &[Value]) -> bool {
        ctx.header("x-api-key").is_some()
    }

    fn after_processing(&self, ctx: &mut RequestContext, _args: &[Value]) -> bool {
        ctx.response_mut().set_header("x-served-by", "tyber");
        true
    }
}

fn create_server() -> ServerContext {
    let config = Config::new(ProgrammaticConfigProvider {
        config: ServerConfig::builder()
            .router_name("demo")
            .request_logger(true)
            .logger(LoggerConfig {
                level: "info".to_string(),
            })
            .build(),
    })
    .unwrap();
    let server = ServerContext::new(config.into_inner()).unwrap();
    server.register_service("greetings", GreetingService).unwrap();
    server
        .register_middleware("apiKey", ApiKey, MiddlewareSettings::default().order(1))
        .unwrap();

    let controller: ControllerConfig = serde_json::from_value(json!({
        "name": "greetings",
        "basePath": "/greetings",
        "routes": [
            {
                "handler": "hello",
                "methods": ["GET"],
                "path": "/hello/:name",
                "params": [{"name": "name", "kind": "string"}]
            },
            {
                "handler": "create",
                "methods": ["POST"],
                "middleware": ["apiKey"],
                "validation": {
                    "rules": {"message": "required|maxLength:140"},
                    "filters": {"before": {"message": "trim"}}
                },
                "params": [{"name": "body", "kind": "object", "marker": "requestBody"}]
            },
            {"handler": "legacy", "methods": ["GET"]}
        ]
    }))
    .unwrap();
    server.register_controller(&controller).unwrap();
    server
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Arc::new(create_server());
    // This address is localhost
    let addr = SocketAddr::from(([127, 0, 0, 1], server.config().port));

    let listener = TcpListener::bind(addr).await?;

    println!("Tyber demo running on http://{}", addr);
    println!("  curl http://{}/greetings/hello/ada", addr);
    println!(
        "  curl -X POST -H 'x-api-key: k' -d '{{\"message\": \"hi\"}}' http://{}/greetings/create",
        addr
    );
    println!("  curl -i http://{}/greetings/legacy", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let server = server.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(
                    io,
                    service_fn(move |req| {
                        let server = server.clone();
                        async move {
                            Ok::<_, std::convert::Infallible>(
                                handle(server.dispatcher(), req).await,
                            )
                        }
                    }),
                )
                .await
            {
                eprintln!("Error serving connection: {}", err);
            }
        });
    }
}
