use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Default sub-pattern of a parameter segment that carries none: any run of non-slash characters.
pub const DEFAULT_PARAM_PATTERN: &str = "[^/]*";

/// Placeholder pushed into the static segment list for every parameter segment.
pub const PARAM_PLACEHOLDER: &str = ":";

static PARAM_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:(?:\(([^)]+)\))?(.+)$").expect("parameter segment regex"));

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Route pattern format error in segment '{segment}'.")]
    MalformedParameter { segment: String },

    #[error("Route pattern '{pattern}' does not compile to a valid regular expression.")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl PatternError {
    #[inline]
    pub(crate) fn malformed_parameter(segment: impl Into<String>) -> Self {
        Self::MalformedParameter {
            segment: segment.into(),
        }
    }

    #[inline]
    pub(crate) fn invalid_regex(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidRegex {
            pattern: pattern.into(),
            source,
        }
    }
}

/// What a route is registered against: a path pattern string or a ready-made regular expression.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    Path(String),
    Regex(Regex),
}

impl RoutePattern {
    pub fn is_empty(&self) -> bool {
        match self {
            RoutePattern::Path(path) => path.is_empty(),
            RoutePattern::Regex(regex) => regex.as_str().is_empty(),
        }
    }
}

impl Display for RoutePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutePattern::Path(path) => write!(f, "{}", path),
            RoutePattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for RoutePattern {
    fn from(value: &str) -> Self {
        RoutePattern::Path(value.to_string())
    }
}

impl From<String> for RoutePattern {
    fn from(value: String) -> Self {
        RoutePattern::Path(value)
    }
}

impl From<&String> for RoutePattern {
    fn from(value: &String) -> Self {
        RoutePattern::Path(value.clone())
    }
}

impl From<Regex> for RoutePattern {
    fn from(value: Regex) -> Self {
        RoutePattern::Regex(value)
    }
}

/// The matchable form of a route pattern.
///
/// # Behavior
/// - `matcher` is anchored and separates every segment with `\/+`, so duplicate slashes
///   in a request path still match.
/// - `param_names` lists parameter labels in capture-group order.
/// - `static_segments` lists static segments in order, with `":"` standing in for each
///   parameter segment. Joined with `-` it is the route's structural signature.
/// - `tree_depth` counts the leading static segments; only those index the prefix tree.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    matcher: Regex,
    param_names: Vec<String>,
    static_segments: Vec<String>,
    is_raw_regex: bool,
    tree_depth: usize,
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.matcher.as_str() == other.matcher.as_str()
            && self.param_names == other.param_names
            && self.static_segments == other.static_segments
            && self.is_raw_regex == other.is_raw_regex
            && self.tree_depth == other.tree_depth
    }
}

impl CompiledPattern {
    /// Compiles a route pattern.
    ///
    /// # Parameters
    /// - `pattern`: a path pattern such as `/users/:id/orders/:(\d+)status`, or a raw regex
    ///
    /// # Returns
    /// `Ok(CompiledPattern)` on success. Compilation is pure: the same input always
    /// yields an equal result.
    ///
    /// # Errors
    /// - `PatternError::MalformedParameter` when a `:` segment does not match
    ///   `^:(?:\(([^)]+)\))?(.+)$` (for example a bare `:`)
    /// - `PatternError::InvalidRegex` when a custom sub-pattern breaks the final expression
    ///
    /// # Behavior
    /// Query string and fragment are ignored. Static segments are matched literally.
    /// A pattern with no segments compiles to `^\/$`.
    pub fn compile(pattern: &RoutePattern) -> Result<Self, PatternError> {
        match pattern {
            RoutePattern::Regex(regex) => Ok(Self {
                matcher: regex.clone(),
                param_names: Vec::new(),
                static_segments: Vec::new(),
                is_raw_regex: true,
                tree_depth: 0,
            }),
            RoutePattern::Path(path) => Self::compile_path(path),
        }
    }

    fn compile_path(path: &str) -> Result<Self, PatternError> {
        let path = path
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let mut expression = String::from("^");
        let mut param_names = Vec::new();
        let mut static_segments = Vec::new();
        let mut tree_depth = 0;
        let mut param_seen = false;

        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            expression.push_str("\\/+");
            if segment.starts_with(':') {
                let captures = PARAM_SEGMENT
                    .captures(segment)
                    .ok_or_else(|| PatternError::malformed_parameter(segment))?;
                let label = captures.get(2).map_or("", |m| m.as_str());
                let sub_pattern = captures
                    .get(1)
                    .map_or(DEFAULT_PARAM_PATTERN, |m| m.as_str());
                expression.push('(');
                expression.push_str(sub_pattern);
                expression.push(')');
                param_names.push(label.to_string());
                static_segments.push(PARAM_PLACEHOLDER.to_string());
                param_seen = true;
            } else {
                expression.push_str(&regex::escape(segment));
                static_segments.push(segment.to_string());
                if !param_seen {
                    tree_depth += 1;
                }
            }
        }

        if expression == "^" {
            expression.push_str("\\/");
        }
        expression.push('$');

        let matcher = Regex::new(&expression)
            .map_err(|source| PatternError::invalid_regex(path, source))?;
        log::trace!("Compiled route pattern '{}' to '{}'", path, expression);
        Ok(Self {
            matcher,
            param_names,
            static_segments,
            is_raw_regex: false,
            tree_depth,
        })
    }

    pub fn matcher(&self) -> &Regex {
        &self.matcher
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn static_segments(&self) -> &[String] {
        &self.static_segments
    }

    pub fn is_raw_regex(&self) -> bool {
        self.is_raw_regex
    }

    pub fn tree_depth(&self) -> usize {
        self.tree_depth
    }

    pub fn param_count(&self) -> usize {
        self.param_names.len()
    }

    /// The structural signature routes are grouped and de-duplicated by.
    ///
    /// Raw expressions have no static segments, so they share the empty signature with `/`.
    pub fn signature(&self) -> String {
        self.static_segments.join("-")
    }

    /// Binds capture groups positionally to `param_names`, or `None` when the path does not match.
    pub fn extract(&self, path: &str) -> Option<Vec<(String, String)>> {
        self.matcher
            .captures(path)
            .map(|captures| self.bind(&captures))
    }

    /// Binds the captures of any pattern with the same shape to this pattern's parameter names.
    pub(crate) fn bind(&self, captures: &Captures<'_>) -> Vec<(String, String)> {
        self.param_names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let value = captures
                    .get(index + 1)
                    .map_or(String::new(), |m| m.as_str().to_string());
                (name.clone(), value)
            })
            .collect()
    }
}
