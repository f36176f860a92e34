use crate::status::DispatchState;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Per-request state shared by the dispatcher, middleware, injectors and handlers.
///
/// # Behavior
/// A context is created by the transport adapter from the raw request, owned exclusively
/// by one request and dropped when the response has been written. It carries:
/// - the request line (method, original url, decoded path, parsed query)
/// - the parsed body and headers
/// - the parameter bags populated by the dispatcher after routing
/// - named context attributes that middleware can publish for handlers
/// - a Koa-like `Response` that handlers and middleware write into
/// - response listeners run once before the response is written
pub struct RequestContext {
    uuid: Uuid,
    method: String,
    original_url: String,
    path: String,
    query: Map<String, Value>,
    body: Option<Value>,
    headers: HashMap<String, String, fnv::FnvBuildHasher>,
    request_parameters: Map<String, Value>,
    route_parameters: Map<String, Value>,
    body_object: Option<Value>,
    attributes: Map<String, Value>,
    response: Response,
    to_next: bool,
    state: DispatchState,
    response_listeners: Vec<ResponseListener>,
}

impl RequestContext {
    /// Creates a context for `method` and the raw request target `original_url`.
    ///
    /// # Parameters
    /// - `method`: the request method exactly as received (e.g. `"get"`, `"POST"`)
    /// - `original_url`: path plus optional query string (e.g. `/a/b?x=1&x=2`)
    ///
    /// # Behavior
    /// The path is percent-decoded and an empty path becomes `/`. Query pairs are
    /// form-decoded; a key that repeats collects its values into an array.
    pub fn new(method: impl Into<String>, original_url: impl Into<String>) -> Self {
        let original_url = original_url.into();
        let (raw_path, raw_query) = match original_url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (original_url.as_str(), None),
        };
        let raw_path = raw_path.split('#').next().unwrap_or_default();
        let path = match percent_decode_path(raw_path) {
            decoded if decoded.is_empty() => String::from("/"),
            decoded => decoded.into_owned(),
        };
        let query = raw_query.map(parse_query).unwrap_or_default();
        Self {
            uuid: Uuid::new_v4(),
            method: method.into(),
            original_url,
            path,
            query,
            body: None,
            headers: HashMap::with_hasher(fnv::FnvBuildHasher::default()),
            request_parameters: Map::new(),
            route_parameters: Map::new(),
            body_object: None,
            attributes: Map::new(),
            response: Response::default(),
            to_next: false,
            state: DispatchState::NONE,
            response_listeners: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: Value) {
        self.body = Some(body);
    }

    /// Header names are stored lower-cased.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(&name.as_ref().to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn request_parameters(&self) -> &Map<String, Value> {
        &self.request_parameters
    }

    pub fn route_parameters(&self) -> &Map<String, Value> {
        &self.route_parameters
    }

    pub(crate) fn set_parameters(
        &mut self,
        request_parameters: Map<String, Value>,
        route_parameters: Map<String, Value>,
    ) {
        self.request_parameters = request_parameters;
        self.route_parameters = route_parameters;
    }

    /// The merged request parameters and route parameters, after any validation filters ran.
    ///
    /// # Errors
    /// Returns `ExchangeError::Read` when the dispatcher has not populated it yet.
    pub fn body_object(&self) -> Result<&Value, ExchangeError> {
        match &self.body_object {
            Some(value) => Ok(value),
            None => Err(ExchangeError::read_error(
                &self.uuid,
                "Request body object has not been populated",
            )),
        }
    }

    pub(crate) fn set_body_object(&mut self, value: Value) {
        self.body_object = Some(value);
    }

    pub(crate) fn take_body_object(&mut self) -> Result<Value, ExchangeError> {
        match self.body_object.take() {
            Some(value) => Ok(value),
            None => Err(ExchangeError::take_error(
                &self.uuid,
                "No request body object available to take",
            )),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Shortcut for `response_mut().set_status(status)`.
    pub fn set_status(&mut self, status: u16) {
        self.response.set_status(status);
    }

    /// Asks the dispatcher to hand the request on to the next HTTP-layer middleware
    /// when the handler produced no value.
    pub fn set_to_next(&mut self, to_next: bool) {
        self.to_next = to_next;
    }

    pub fn to_next(&self) -> bool {
        self.to_next
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub(crate) fn mark(&mut self, flags: DispatchState) {
        self.state |= flags;
    }

    /// Registers a callback that may amend the response right before it is written.
    pub fn add_response_listener(
        &mut self,
        listener: impl FnOnce(&mut Response) + Send + Sync + 'static,
    ) {
        self.response_listeners.push(Box::new(listener));
    }

    /// Runs the response listeners in registration order and hands back the final response.
    pub fn finish(&mut self) -> &Response {
        for listener in self.response_listeners.drain(..) {
            listener(&mut self.response);
        }
        &self.response
    }
}

/// A Koa-like mutable response.
///
/// # Behavior
/// Until a status is explicitly set the effective status is derived: `404` while no body
/// has been set, `200` once one has. An explicit status always wins.
#[derive(Debug, Default, Clone)]
pub struct Response {
    status: Option<u16>,
    body: Option<Value>,
    headers: Vec<(String, String)>,
}

impl Response {
    pub fn status(&self) -> u16 {
        match (self.status, &self.body) {
            (Some(status), _) => status,
            (None, Some(_)) => 200,
            (None, None) => 404,
        }
    }

    pub fn has_explicit_status(&self) -> bool {
        self.status.is_some()
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: Value) {
        self.body = Some(body);
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Points the client at `url`, keeping an already chosen 3xx status and using 302 otherwise.
    pub fn redirect(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !matches!(self.status, Some(300..=399)) {
            self.status = Some(302);
        }
        self.body = Some(Value::String(format!("Redirecting to {}.", url)));
        self.set_header("Location", url);
    }
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Read error occurred for request '{uuid}'. {message}")]
    Read { uuid: Uuid, message: String },

    #[error("Take error occurred for request '{uuid}'. {message}")]
    Take { uuid: Uuid, message: String },
}

impl ExchangeError {
    #[inline]
    pub fn read_error(uuid: &Uuid, msg: impl Into<String>) -> Self {
        ExchangeError::Read {
            uuid: *uuid,
            message: msg.into(),
        }
    }

    #[inline]
    pub(crate) fn take_error(uuid: &Uuid, msg: impl Into<String>) -> Self {
        ExchangeError::Take {
            uuid: *uuid,
            message: msg.into(),
        }
    }
}

type ResponseListener = Box<dyn FnOnce(&mut Response) + Send + Sync>;

/// Percent-decodes a request path. Plus signs are kept and invalid escapes are left as-is.
fn percent_decode_path(path: &str) -> Cow<'_, str> {
    if !path.contains('%') {
        return Cow::Borrowed(path);
    }
    let bytes = path.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 16).ok());
            if let Some(byte) = hex {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    Cow::Owned(String::from_utf8_lossy(&decoded).into_owned())
}

fn parse_query(query: &str) -> Map<String, Value> {
    let mut parsed = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match parsed.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                parsed.insert(key.into_owned(), value);
            }
        }
    }
    parsed
}
