use crate::exchange::RequestContext;
use crate::handler::InjectedParam;
use crate::value::{js_number, number_value};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Declared type of a handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Object,
    Number,
    String,
    Boolean,
    #[default]
    Any,
}

/// How a parameter was annotated, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamMarker {
    #[default]
    None,
    RequestBody,
    ContextAttribute,
}

/// One declared handler parameter, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default)]
    pub kind: ParamKind,
    #[serde(default)]
    pub marker: ParamMarker,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            marker: ParamMarker::None,
        }
    }

    pub fn request_body(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Object,
            marker: ParamMarker::RequestBody,
        }
    }

    pub fn context_attribute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Any,
            marker: ParamMarker::ContextAttribute,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ParamInjectionError {
    #[error("[route error]requestBody argument can not be a non object type, function: {function}")]
    RequestBodyNotObject { function: String },

    #[error("[route error]context argument can not be a non object type, function: {function}")]
    ContextNotObject { function: String },

    #[error("[route error]next argument can not be a non object type, function: {function}")]
    NextNotObject { function: String },
}

impl ParamInjectionError {
    #[inline]
    pub(crate) fn request_body_not_object(function: impl Into<String>) -> Self {
        Self::RequestBodyNotObject {
            function: function.into(),
        }
    }

    #[inline]
    pub(crate) fn context_not_object(function: impl Into<String>) -> Self {
        Self::ContextNotObject {
            function: function.into(),
        }
    }

    #[inline]
    pub(crate) fn next_not_object(function: impl Into<String>) -> Self {
        Self::NextNotObject {
            function: function.into(),
        }
    }
}

const CONTEXT_NAMES: [&str; 3] = ["ctx", "context", "koacontext"];
const NEXT_NAMES: [&str; 2] = ["next", "koanext"];

/// Produces one handler argument from the request context.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamInjector {
    /// The merged body object (request parameters plus route parameters).
    RequestBody,
    ContextAttribute(String),
    Context,
    Next,
    /// A single named field, coerced to a number when `numeric`.
    RouteParameter { name: String, numeric: bool },
}

impl ParamInjector {
    /// Derives the injectors for a handler's declared parameters.
    ///
    /// # Parameters
    /// - `function`: display name of the handler, used in error messages
    /// - `params`: the declared parameters in order
    ///
    /// # Returns
    /// One injector per parameter, in the same order.
    ///
    /// # Errors
    /// A request-body, context or next parameter whose kind is not `Object`.
    pub fn derive(
        function: &str,
        params: &[ParamDecl],
    ) -> Result<Vec<ParamInjector>, ParamInjectionError> {
        params
            .iter()
            .map(|param| Self::derive_one(function, param))
            .collect()
    }

    fn derive_one(function: &str, param: &ParamDecl) -> Result<ParamInjector, ParamInjectionError> {
        match param.marker {
            ParamMarker::RequestBody => {
                if param.kind != ParamKind::Object {
                    return Err(ParamInjectionError::request_body_not_object(function));
                }
                return Ok(ParamInjector::RequestBody);
            }
            ParamMarker::ContextAttribute => {
                return Ok(ParamInjector::ContextAttribute(param.name.clone()));
            }
            ParamMarker::None => {}
        }

        let lowered = param.name.to_lowercase();
        if CONTEXT_NAMES.contains(&lowered.as_str()) {
            if param.kind != ParamKind::Object {
                return Err(ParamInjectionError::context_not_object(function));
            }
            return Ok(ParamInjector::Context);
        }
        if NEXT_NAMES.contains(&lowered.as_str()) {
            if param.kind != ParamKind::Object {
                return Err(ParamInjectionError::next_not_object(function));
            }
            return Ok(ParamInjector::Next);
        }
        Ok(ParamInjector::RouteParameter {
            name: param.name.clone(),
            numeric: param.kind == ParamKind::Number,
        })
    }

    /// Resolves this injector against a routed request.
    ///
    /// # Behavior
    /// - `RequestBody` yields the populated body object, or the merge of request and route
    ///   parameters when none was populated.
    /// - `RouteParameter` reads route parameters first and request parameters second. A
    ///   `null` or missing value yields `Undefined`; a numeric parameter that does not parse
    ///   becomes `null`.
    pub fn inject(&self, ctx: &RequestContext) -> InjectedParam {
        match self {
            ParamInjector::RequestBody => match ctx.body_object() {
                Ok(body) if !body.is_null() => InjectedParam::Value(body.clone()),
                _ => {
                    let mut merged = ctx.request_parameters().clone();
                    for (key, value) in ctx.route_parameters() {
                        merged.insert(key.clone(), value.clone());
                    }
                    InjectedParam::Value(Value::Object(merged))
                }
            },
            ParamInjector::ContextAttribute(name) => ctx
                .attribute(name)
                .cloned()
                .map_or(InjectedParam::Undefined, InjectedParam::Value),
            ParamInjector::Context => InjectedParam::Context,
            ParamInjector::Next => InjectedParam::Next,
            ParamInjector::RouteParameter { name, numeric } => {
                let found = ctx
                    .route_parameters()
                    .get(name)
                    .filter(|value| !value.is_null())
                    .or_else(|| {
                        ctx.request_parameters()
                            .get(name)
                            .filter(|value| !value.is_null())
                    });
                match found {
                    None => InjectedParam::Undefined,
                    Some(value) if *numeric => InjectedParam::Value(
                        js_number(value).map_or(Value::Null, number_value),
                    ),
                    Some(value) => InjectedParam::Value(value.clone()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn routed_context() -> RequestContext {
        let mut ctx = RequestContext::new("put", "/a/check/param/123/sec/abc?page=2");
        let mut route = Map::new();
        route.insert("id".into(), json!("123"));
        route.insert("name".into(), json!("abc"));
        let mut request = Map::new();
        request.insert("page".into(), json!("2"));
        ctx.set_parameters(request, route);
        ctx
    }

    #[test]
    fn test_derive_by_name_and_marker() {
        let injectors = ParamInjector::derive(
            "orders.update",
            &[
                ParamDecl::new("id", ParamKind::Number),
                ParamDecl::new("ctx", ParamKind::Object),
                ParamDecl::new("KoaNext", ParamKind::Object),
                ParamDecl::request_body("payload"),
                ParamDecl::context_attribute("user"),
            ],
        )
        .unwrap();
        assert_eq!(
            injectors,
            vec![
                ParamInjector::RouteParameter {
                    name: "id".into(),
                    numeric: true
                },
                ParamInjector::Context,
                ParamInjector::Next,
                ParamInjector::RequestBody,
                ParamInjector::ContextAttribute("user".into()),
            ]
        );
    }

    #[test]
    fn test_derive_rejects_non_object_context() {
        let err = ParamInjector::derive("orders.update", &[ParamDecl::new("context", ParamKind::String)])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "[route error]context argument can not be a non object type, function: orders.update"
        );
        let body = ParamDecl {
            name: "payload".into(),
            kind: ParamKind::Any,
            marker: ParamMarker::RequestBody,
        };
        assert!(matches!(
            ParamInjector::derive("orders.update", &[body]),
            Err(ParamInjectionError::RequestBodyNotObject { .. })
        ));
    }

    #[test]
    fn test_inject_route_parameters() {
        let ctx = routed_context();
        let id = ParamInjector::RouteParameter {
            name: "id".into(),
            numeric: true,
        };
        assert_eq!(id.inject(&ctx), InjectedParam::Value(json!(123)));

        let name = ParamInjector::RouteParameter {
            name: "name".into(),
            numeric: true,
        };
        assert_eq!(name.inject(&ctx), InjectedParam::Value(json!(null)));

        let page = ParamInjector::RouteParameter {
            name: "page".into(),
            numeric: false,
        };
        assert_eq!(page.inject(&ctx), InjectedParam::Value(json!("2")));

        let missing = ParamInjector::RouteParameter {
            name: "missing".into(),
            numeric: false,
        };
        assert!(missing.inject(&ctx).is_undefined());
    }

    #[test]
    fn test_inject_request_body() {
        let mut ctx = routed_context();
        assert_eq!(
            ParamInjector::RequestBody.inject(&ctx),
            InjectedParam::Value(json!({"page": "2", "id": "123", "name": "abc"}))
        );
        ctx.set_body_object(json!({"name": "filtered"}));
        assert_eq!(
            ParamInjector::RequestBody.inject(&ctx),
            InjectedParam::Value(json!({"name": "filtered"}))
        );
    }

    #[test]
    fn test_inject_context_attribute() {
        let mut ctx = routed_context();
        let injector = ParamInjector::ContextAttribute("user".into());
        assert!(injector.inject(&ctx).is_undefined());
        ctx.set_attribute("user", json!({"id": 1}));
        assert_eq!(injector.inject(&ctx), InjectedParam::Value(json!({"id": 1})));
    }
}
