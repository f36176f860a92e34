use crate::exchange::RequestContext;
use dashmap::{DashMap, Entry};
use fnv::FnvBuildHasher;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;

pub const MIDDLEWARE_LOWEST_PRECEDENCE: u32 = 65535;
pub const MIDDLEWARE_HIGHEST_PRECEDENCE: u32 = 1;

/// A synchronous before/after hook around route handlers.
///
/// Returning `false` from either hook stops the chain. A stopped before-chain skips the
/// handler and hands the request on to the next HTTP-layer middleware.
pub trait Middleware: Send + Sync {
    fn before_processing(&self, ctx: &mut RequestContext, args: &[Value]) -> bool;

    fn after_processing(&self, ctx: &mut RequestContext, args: &[Value]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiddlewareScope {
    /// Active only on routes that name it.
    #[default]
    Route,
    /// Active on every route.
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareSettings {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_order")]
    pub order: u32,
    #[serde(default)]
    pub scope: MiddlewareScope,
    #[serde(default, rename = "matchEnv", deserialize_with = "one_or_many")]
    pub match_env: Option<Vec<String>>,
}

fn default_order() -> u32 {
    MIDDLEWARE_LOWEST_PRECEDENCE
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(env)) => Some(vec![env]),
        Some(OneOrMany::Many(envs)) => Some(envs),
    })
}

impl Default for MiddlewareSettings {
    fn default() -> Self {
        Self {
            alias: None,
            order: MIDDLEWARE_LOWEST_PRECEDENCE,
            scope: MiddlewareScope::Route,
            match_env: None,
        }
    }
}

impl MiddlewareSettings {
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// An order of zero falls back to the lowest precedence.
    pub fn order(mut self, order: u32) -> Self {
        self.order = if order == 0 {
            MIDDLEWARE_LOWEST_PRECEDENCE
        } else {
            order
        };
        self
    }

    pub fn global(mut self) -> Self {
        self.scope = MiddlewareScope::Global;
        self
    }

    pub fn match_env(mut self, envs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.match_env = Some(envs.into_iter().map(Into::into).collect());
        self
    }
}

/// A middleware together with the settings it was registered under.
pub struct RegisteredMiddleware {
    alias: String,
    order: u32,
    scope: MiddlewareScope,
    match_env: Option<Vec<String>>,
    inner: Arc<dyn Middleware>,
}

impl RegisteredMiddleware {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn scope(&self) -> MiddlewareScope {
        self.scope
    }

    pub fn match_env(&self) -> Option<&[String]> {
        self.match_env.as_deref()
    }

    fn active_in(&self, env: &str) -> bool {
        match &self.match_env {
            Some(envs) => envs.iter().any(|candidate| candidate == env),
            None => true,
        }
    }

    pub fn before_processing(&self, ctx: &mut RequestContext, args: &[Value]) -> bool {
        self.inner.before_processing(ctx, args)
    }

    pub fn after_processing(&self, ctx: &mut RequestContext, args: &[Value]) -> bool {
        self.inner.after_processing(ctx, args)
    }
}

impl Debug for RegisteredMiddleware {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredMiddleware")
            .field("alias", &self.alias)
            .field("order", &self.order)
            .field("scope", &self.scope)
            .field("match_env", &self.match_env)
            .finish()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum MiddlewareError {
    #[error("[middleware error] middleware name \"{alias}\" duplicated")]
    Duplicated { alias: String },
}

impl MiddlewareError {
    #[inline]
    pub(crate) fn duplicated(alias: impl Into<String>) -> Self {
        Self::Duplicated {
            alias: alias.into(),
        }
    }
}

/// Ranks and filters registered middleware for a route.
///
/// # Behavior
/// Global middleware is always considered; route middleware only when a route names its
/// alias. Middleware with a `match_env` list is dropped unless the manager's environment
/// is in the list. The result is sorted by `(order, alias)`.
pub struct MiddlewareManager {
    env: String,
    global: RwLock<Vec<Arc<RegisteredMiddleware>>>,
    route: DashMap<String, Arc<RegisteredMiddleware>, FnvBuildHasher>,
}

impl MiddlewareManager {
    pub fn new(env: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            global: RwLock::new(Vec::new()),
            route: DashMap::with_hasher(FnvBuildHasher::default()),
        }
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// Registers `middleware` under `settings.alias`, or `name` when no alias is set.
    ///
    /// # Errors
    /// A route-scoped alias that is already taken. Global middleware is never checked.
    pub fn register_middleware(
        &self,
        name: impl Into<String>,
        middleware: impl Middleware + 'static,
        settings: MiddlewareSettings,
    ) -> Result<(), MiddlewareError> {
        let alias = settings.alias.unwrap_or_else(|| name.into());
        let registered = Arc::new(RegisteredMiddleware {
            alias: alias.clone(),
            order: settings.order,
            scope: settings.scope,
            match_env: settings.match_env,
            inner: Arc::new(middleware),
        });
        match registered.scope {
            MiddlewareScope::Global => {
                log::debug!("Registered global middleware '{}'", alias);
                self.global.write().push(registered);
                Ok(())
            }
            MiddlewareScope::Route => match self.route.entry(alias.clone()) {
                Entry::Occupied(_) => Err(MiddlewareError::duplicated(alias)),
                Entry::Vacant(entry) => {
                    log::debug!("Registered route middleware '{}'", alias);
                    entry.insert(registered);
                    Ok(())
                }
            },
        }
    }

    /// The ordered middleware that applies to a route naming `aliases`.
    pub fn get_active_middleware<S: AsRef<str>>(
        &self,
        aliases: &[S],
    ) -> Vec<Arc<RegisteredMiddleware>> {
        let mut active: Vec<Arc<RegisteredMiddleware>> = self.global.read().clone();
        for alias in aliases {
            match self.route.get(alias.as_ref()) {
                Some(entry) => active.push(entry.value().clone()),
                None => log::warn!("Unknown middleware '{}' skipped", alias.as_ref()),
            }
        }
        active.retain(|middleware| middleware.active_in(&self.env));
        active.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.alias.cmp(&b.alias)));
        active
    }

    pub fn len(&self) -> usize {
        self.global.read().len() + self.route.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.global.write().clear();
        self.route.clear();
    }
}

impl Default for MiddlewareManager {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ENV)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Pass;

    impl Middleware for Pass {
        fn before_processing(&self, _ctx: &mut RequestContext, _args: &[Value]) -> bool {
            true
        }

        fn after_processing(&self, _ctx: &mut RequestContext, _args: &[Value]) -> bool {
            true
        }
    }

    fn aliases(list: &[Arc<RegisteredMiddleware>]) -> Vec<&str> {
        list.iter().map(|m| m.alias()).collect()
    }

    #[test]
    fn test_duplicate_route_alias() {
        let manager = MiddlewareManager::new("development");
        manager
            .register_middleware("auth", Pass, MiddlewareSettings::default())
            .unwrap();
        let err = manager
            .register_middleware("other", Pass, MiddlewareSettings::default().alias("auth"))
            .unwrap_err();
        assert_eq!(err.to_string(), "[middleware error] middleware name \"auth\" duplicated");

        manager
            .register_middleware("trace", Pass, MiddlewareSettings::default().global())
            .unwrap();
        manager
            .register_middleware("trace", Pass, MiddlewareSettings::default().global())
            .unwrap();
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_active_middleware_is_sorted_and_filtered() {
        let manager = MiddlewareManager::new("production");
        manager
            .register_middleware("zeta", Pass, MiddlewareSettings::default().order(5))
            .unwrap();
        manager
            .register_middleware("alpha", Pass, MiddlewareSettings::default().order(5))
            .unwrap();
        manager
            .register_middleware("first", Pass, MiddlewareSettings::default().order(1).global())
            .unwrap();
        manager
            .register_middleware("devOnly", Pass, MiddlewareSettings::default().match_env(["development"]))
            .unwrap();

        let active = manager.get_active_middleware(&["zeta", "alpha", "devOnly", "ghost"]);
        assert_eq!(aliases(&active), vec!["first", "alpha", "zeta"]);

        let active = manager.get_active_middleware::<&str>(&[]);
        assert_eq!(aliases(&active), vec!["first"]);

        manager.clear();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_settings_deserialize() {
        let settings: MiddlewareSettings =
            serde_json::from_value(json!({"alias": "auth", "scope": "global", "matchEnv": "test"}))
                .unwrap();
        assert_eq!(settings.alias.as_deref(), Some("auth"));
        assert_eq!(settings.order, MIDDLEWARE_LOWEST_PRECEDENCE);
        assert_eq!(settings.scope, MiddlewareScope::Global);
        assert_eq!(settings.match_env, Some(vec!["test".to_string()]));
    }
}
