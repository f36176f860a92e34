use crate::logger::LoggerConfig;
use crate::router::cache::DEFAULT_LOOKUP_CACHE_CAPACITY;
use crate::router::register::DEFAULT_CONTEXT_NAME;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Environment used when none is configured. Middleware `match_env` lists are checked against it.
pub const DEFAULT_ENV: &str = "development";

pub const DEFAULT_PORT: u16 = 3000;

/// Settings of one server context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub env: String,
    pub port: u16,
    pub router_name: String,
    pub lookup_cache_capacity: usize,
    /// Emit one JSON access-log line per dispatched request.
    pub request_logger: bool,
    pub logger: LoggerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: DEFAULT_ENV.to_string(),
            port: DEFAULT_PORT,
            router_name: DEFAULT_CONTEXT_NAME.to_string(),
            lookup_cache_capacity: DEFAULT_LOOKUP_CACHE_CAPACITY,
            request_logger: false,
            logger: LoggerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }
}

pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        ServerConfigBuilder::new()
    }
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.config.env = env.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn router_name(mut self, name: impl Into<String>) -> Self {
        self.config.router_name = name.into();
        self
    }

    pub fn lookup_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.lookup_cache_capacity = capacity;
        self
    }

    pub fn request_logger(mut self, enabled: bool) -> Self {
        self.config.request_logger = enabled;
        self
    }

    pub fn logger(mut self, logger: LoggerConfig) -> Self {
        self.config.logger = logger;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// A loaded configuration value.
#[derive(Debug, Default)]
pub struct Config<C> {
    config: C,
}

impl<C> Config<C>
where
    C: Default + DeserializeOwned,
{
    pub fn new(provider: impl ConfigProvider<C>) -> Result<Self, ConfigProviderError> {
        provider.load().map(|config| Config { config })
    }

    pub fn get(&self) -> &C {
        &self.config
    }

    pub fn get_mut(&mut self) -> &mut C {
        &mut self.config
    }

    pub fn into_inner(self) -> C {
        self.config
    }
}

pub trait ConfigProvider<C>
where
    C: Default + DeserializeOwned,
{
    fn load(&self) -> Result<C, ConfigProviderError>;
}

pub struct DefaultConfigProvider;

impl<C> ConfigProvider<C> for DefaultConfigProvider
where
    C: Default + DeserializeOwned,
{
    fn load(&self) -> Result<C, ConfigProviderError> {
        Ok(C::default())
    }
}

/// Reads `<base_path>/<config_name>` as JSON.
pub struct FileConfigProvider {
    pub base_path: String,
    pub config_name: String,
}

impl FileConfigProvider {
    pub fn new(base_path: impl Into<String>, config_name: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            config_name: config_name.into(),
        }
    }
}

impl<C> ConfigProvider<C> for FileConfigProvider
where
    C: Default + DeserializeOwned,
{
    fn load(&self) -> Result<C, ConfigProviderError> {
        let config_path = Path::new(&self.base_path).join(&self.config_name);
        let file = File::open(&config_path).map_err(|e| {
            let msg = format!("Could not open config file {}: {}", config_path.display(), e);
            ConfigProviderError::load_error(msg)
        })?;
        serde_json::from_reader(file).map_err(|e| {
            let msg = format!("Could not load config file from reader: {}", e);
            ConfigProviderError::parse_error(msg)
        })
    }
}

pub struct ProgrammaticConfigProvider<C> {
    pub config: C,
}

impl<C> ConfigProvider<C> for ProgrammaticConfigProvider<C>
where
    C: Default + DeserializeOwned + Clone,
{
    fn load(&self) -> Result<C, ConfigProviderError> {
        Ok(self.config.clone())
    }
}

#[derive(Error, Debug)]
pub enum ConfigProviderError {
    #[error("Could not load config file. {message}")]
    Load { message: String },

    #[error("Config file is not valid. {message}")]
    Parse { message: String },
}

impl ConfigProviderError {
    #[inline]
    pub(crate) fn load_error(msg: impl Into<String>) -> Self {
        Self::Load {
            message: msg.into(),
        }
    }

    #[inline]
    pub(crate) fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: Config<ServerConfig> = Config::new(DefaultConfigProvider).unwrap();
        assert_eq!(config.get().env, "development");
        assert_eq!(config.get().router_name, "default");
        assert_eq!(config.get().lookup_cache_capacity, 2000);
        assert!(!config.get().request_logger);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"env": "production", "requestLogger": true}"#).unwrap();
        assert_eq!(config.env, "production");
        assert!(config.request_logger);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_file_provider() {
        let dir = std::env::temp_dir();
        let name = format!("tyber-config-{}.json", uuid::Uuid::new_v4());
        let mut file = File::create(dir.join(&name)).unwrap();
        file.write_all(br#"{"routerName": "api", "lookupCacheCapacity": 10}"#)
            .unwrap();

        let provider = FileConfigProvider::new(dir.to_string_lossy(), name.clone());
        let config: Config<ServerConfig> = Config::new(provider).unwrap();
        assert_eq!(config.get().router_name, "api");
        assert_eq!(config.get().lookup_cache_capacity, 10);
        std::fs::remove_file(dir.join(&name)).unwrap();

        let missing = FileConfigProvider::new(dir.to_string_lossy(), "missing-tyber.json");
        let result: Result<Config<ServerConfig>, _> = Config::new(missing);
        assert!(matches!(result, Err(ConfigProviderError::Load { .. })));
    }

    #[test]
    fn test_builder_and_programmatic_provider() {
        let built = ServerConfig::builder()
            .env("test")
            .router_name("admin")
            .request_logger(true)
            .build();
        let config = Config::new(ProgrammaticConfigProvider {
            config: built.clone(),
        })
        .unwrap();
        assert_eq!(config.into_inner(), built);
    }
}
