use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const VALIDATION_ERROR_CODE: &str = "request.validation.error";
pub const VALIDATION_ERROR_MESSAGE: &str = "Some fields validate failed in this request.";

/// The `code` member of an error response body. Business errors use string codes,
/// transport errors reuse the numeric HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(i64),
    Text(String),
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Number(code) => write!(f, "{}", code),
            ErrorCode::Text(code) => write!(f, "{}", code),
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(value: &str) -> Self {
        ErrorCode::Text(value.to_string())
    }
}

impl From<String> for ErrorCode {
    fn from(value: String) -> Self {
        ErrorCode::Text(value)
    }
}

impl From<i64> for ErrorCode {
    fn from(value: i64) -> Self {
        ErrorCode::Number(value)
    }
}

/// An error that knows which HTTP status it renders as and what its body looks like.
///
/// # Behavior
/// The dispatcher surfaces these verbatim: the response status is `status()` and the
/// body is `{code, message, ...extra}`. Extra members are spread after `code` and
/// `message`, which is how the validation error reports one key per failed field.
#[derive(Debug, Clone, Error)]
#[error("[{status}] {code}: {message}")]
pub struct HttpError {
    status: u16,
    code: ErrorCode,
    message: String,
    extra: Map<String, Value>,
}

impl HttpError {
    pub fn new(status: u16, code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// An error whose code mirrors its status, the shape used for transport level failures.
    pub fn status_only(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, ErrorCode::Number(status as i64), message)
    }

    #[inline]
    pub fn not_found(original_url: &str) -> Self {
        Self::status_only(404, format!("Resource not found for [{}]", original_url))
    }

    #[inline]
    pub fn method_not_allowed(method: &str) -> Self {
        Self::status_only(405, format!("Invalid request method: {}", method))
    }

    #[inline]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status_only(400, message)
    }

    #[inline]
    pub fn internal() -> Self {
        Self::status_only(500, "Internal Server Error")
    }

    /// The 422 error raised when a route's validator rejects the request.
    pub fn validation(field_errors: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut error = Self::new(422, VALIDATION_ERROR_CODE, VALIDATION_ERROR_MESSAGE);
        for (field, message) in field_errors {
            error.extra.insert(field, Value::String(message));
        }
        error
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn response_body(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            "code".to_string(),
            serde_json::to_value(&self.code).unwrap_or(Value::Null),
        );
        body.insert("message".to_string(), Value::String(self.message.clone()));
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}
