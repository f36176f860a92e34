use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// FNV hash of a handler identifier, used as the key of the resolved-handler cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId {
    handler_hash: u64,
}

impl HandlerId {
    pub fn new(id: impl AsRef<str>) -> Self {
        let mut hasher = fnv::FnvHasher::default();
        id.as_ref().hash(&mut hasher);
        Self {
            handler_hash: hasher.finish(),
        }
    }
}

impl Display for HandlerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerId({})", self.handler_hash)
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Handler identifier '{identifier}' is not of the form '<service>.<method>'.")]
pub struct InvalidServiceMethod {
    pub identifier: String,
}

/// A `"<service>.<method>"` handler identifier split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceMethodRef {
    service: String,
    method: String,
}

impl ServiceMethodRef {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn id(&self) -> HandlerId {
        HandlerId::new(self.to_string())
    }
}

impl Display for ServiceMethodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

impl FromStr for ServiceMethodRef {
    type Err = InvalidServiceMethod;

    /// Splits on the first `.`; both halves must be non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((service, method)) if !service.is_empty() && !method.is_empty() => {
                Ok(Self::new(service, method))
            }
            _ => Err(InvalidServiceMethod {
                identifier: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_method() {
        let parsed: ServiceMethodRef = "orderController.list".parse().unwrap();
        assert_eq!(parsed.service(), "orderController");
        assert_eq!(parsed.method(), "list");
        assert_eq!(parsed.to_string(), "orderController.list");
        assert_eq!(parsed.id(), HandlerId::new("orderController.list"));
    }

    #[test]
    fn test_reject_identifiers_without_method() {
        assert!("orderController".parse::<ServiceMethodRef>().is_err());
        assert!(".list".parse::<ServiceMethodRef>().is_err());
        assert!("orders.".parse::<ServiceMethodRef>().is_err());
    }
}
