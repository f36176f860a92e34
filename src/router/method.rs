use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("Invalid request method: {method}")]
pub struct UnknownMethod {
    pub method: String,
}

/// The request methods a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    #[serde(alias = "GET", alias = "Get")]
    Get,
    #[serde(alias = "POST", alias = "Post")]
    Post,
    #[serde(alias = "PUT", alias = "Put")]
    Put,
    #[serde(alias = "DELETE", alias = "Delete")]
    Delete,
    #[serde(alias = "PATCH", alias = "Patch")]
    Patch,
    #[serde(alias = "HEAD", alias = "Head")]
    Head,
    #[serde(alias = "OPTIONS", alias = "Options")]
    Options,
}

impl RequestMethod {
    pub const ALL: [RequestMethod; 7] = [
        RequestMethod::Get,
        RequestMethod::Post,
        RequestMethod::Put,
        RequestMethod::Delete,
        RequestMethod::Patch,
        RequestMethod::Head,
        RequestMethod::Options,
    ];

    /// Lower-case name, the form used in route names and cache keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "get",
            RequestMethod::Post => "post",
            RequestMethod::Put => "put",
            RequestMethod::Delete => "delete",
            RequestMethod::Patch => "patch",
            RequestMethod::Head => "head",
            RequestMethod::Options => "options",
        }
    }
}

impl Display for RequestMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for RequestMethod {
    type Err = UnknownMethod;

    /// Case-insensitive parse, `"Get"`, `"get"` and `"GET"` are all accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMethod {
                method: s.to_string(),
            })
    }
}
