use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::panic::Location;
use uuid::Uuid;

/// Logging settings of a server context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default filter, e.g. `info` or `tyber::router=trace,info`. `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Installs `env_logger` as the `log` backend. Returns `false` when a logger was already
/// installed, in which case the existing one is left alone.
pub fn init_logger(config: &LoggerConfig) -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.level))
        .try_init()
        .is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    ERROR,
    WARN,
    INFO,
    DEBUG,
    TRACE,
}

impl From<LogLevel> for log::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::ERROR => log::Level::Error,
            LogLevel::WARN => log::Level::Warn,
            LogLevel::INFO => log::Level::Info,
            LogLevel::DEBUG => log::Level::Debug,
            LogLevel::TRACE => log::Level::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    Router,
    Dispatcher,
    Validation,
    Middleware,
    Config,
}

/// A structured log line, rendered as JSON.
#[derive(Debug, Serialize)]
pub struct LogEntry<'a> {
    timestamp: String,
    level: LogLevel,
    component: Component,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    message: &'a str,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl<'a> LogEntry<'a> {
    pub fn new(level: LogLevel, component: Component, message: &'a str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            component,
            request_id: None,
            file: None,
            line: None,
            message,
            fields: Map::new(),
        }
    }

    pub fn request_id(mut self, uuid: &Uuid) -> Self {
        self.request_id = Some(*uuid);
        self
    }

    /// Records the caller's source location.
    #[track_caller]
    pub fn located(mut self) -> Self {
        let location: &'static Location<'static> = Location::caller();
        self.file = Some(location.file());
        self.line = Some(location.line());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or(String::from("Error serializing log entry"))
    }

    /// Hands the JSON line to the `log` facade at the entry's level.
    pub fn emit(&self) {
        log::log!(log::Level::from(self.level), "{}", self.to_json());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_json() {
        let uuid = Uuid::new_v4();
        let entry = LogEntry::new(LogLevel::INFO, Component::Dispatcher, "request handled")
            .request_id(&uuid)
            .field("status", 200)
            .located();
        let json: Value = serde_json::from_str(&entry.to_json()).unwrap();
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["component"], "Dispatcher");
        assert_eq!(json["message"], "request handled");
        assert_eq!(json["status"], 200);
        assert_eq!(json["request_id"], uuid.to_string());
        assert!(json["file"].as_str().unwrap().ends_with("mod.rs"));
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_init_logger_is_idempotent() {
        let config = LoggerConfig::default();
        init_logger(&config);
        assert!(!init_logger(&config));
    }
}
