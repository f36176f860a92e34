use crate::value::js_string;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One argument of a rule or filter. Programmatic schemas may pass compiled regexes,
/// which is the only way to satisfy the `regex` rule.
#[derive(Debug, Clone)]
pub enum RuleArg {
    Value(Value),
    Regex(Regex),
}

impl RuleArg {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RuleArg::Value(value) => Some(value),
            RuleArg::Regex(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// String form; a regex renders as `/source/`.
    pub fn to_js_string(&self) -> String {
        match self {
            RuleArg::Value(value) => js_string(value),
            RuleArg::Regex(regex) => format!("/{}/", regex.as_str()),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            RuleArg::Value(value) => value.clone(),
            RuleArg::Regex(_) => Value::String(self.to_js_string()),
        }
    }
}

impl From<Value> for RuleArg {
    fn from(value: Value) -> Self {
        RuleArg::Value(value)
    }
}

impl From<&str> for RuleArg {
    fn from(value: &str) -> Self {
        RuleArg::Value(Value::String(value.to_string()))
    }
}

impl From<String> for RuleArg {
    fn from(value: String) -> Self {
        RuleArg::Value(Value::String(value))
    }
}

impl From<Regex> for RuleArg {
    fn from(value: Regex) -> Self {
        RuleArg::Regex(value)
    }
}

/// Arguments as a rule receives them: a lone argument is handed over unwrapped.
#[derive(Debug, Clone, Copy)]
pub enum RuleArgs<'a> {
    One(&'a RuleArg),
    Many(&'a [RuleArg]),
}

impl<'a> RuleArgs<'a> {
    pub fn unwrap(args: &'a [RuleArg]) -> Self {
        match args {
            [single] => RuleArgs::One(single),
            many => RuleArgs::Many(many),
        }
    }

    /// The arguments as a list; a lone argument becomes a one-element list.
    pub fn as_list(self) -> &'a [RuleArg] {
        match self {
            RuleArgs::One(arg) => std::slice::from_ref(arg),
            RuleArgs::Many(args) => args,
        }
    }

    /// The lone argument when it is a string.
    pub fn single_str(self) -> Option<&'a str> {
        match self {
            RuleArgs::One(arg) => arg.as_str(),
            RuleArgs::Many(_) => None,
        }
    }

    /// The lone argument in string form; a list is never a scalar.
    pub fn single_string(self) -> Option<String> {
        match self {
            RuleArgs::One(arg) => Some(arg.to_js_string()),
            RuleArgs::Many(_) => None,
        }
    }

    /// String form of the arguments, a list joined with `,`.
    pub fn to_js_string(self) -> String {
        match self {
            RuleArgs::One(arg) => arg.to_js_string(),
            RuleArgs::Many(args) => args
                .iter()
                .map(RuleArg::to_js_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// The arguments as one JSON value: the lone value, or an array.
    pub fn to_value(self) -> Value {
        match self {
            RuleArgs::One(arg) => arg.to_value(),
            RuleArgs::Many(args) => Value::Array(args.iter().map(RuleArg::to_value).collect()),
        }
    }
}

/// A named rule or filter with its arguments.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub name: String,
    pub args: Vec<RuleArg>,
}

/// The rules or filters declared for one field.
///
/// # Behavior
/// The string form is pipe separated, `name:arg1,arg2`, split on the first `:` only.
/// The object form maps names to argument arrays; falsy entries are skipped and any
/// other truthy value means "no arguments".
#[derive(Debug, Clone, Default)]
pub struct RuleSpec {
    entries: Vec<RuleEntry>,
}

impl RuleSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(spec: &str) -> Self {
        let entries = spec
            .split('|')
            .map(|rule| match rule.split_once(':') {
                Some((name, args)) => RuleEntry {
                    name: name.to_string(),
                    args: args.split(',').map(RuleArg::from).collect(),
                },
                None => RuleEntry {
                    name: rule.to_string(),
                    args: Vec::new(),
                },
            })
            .collect();
        Self { entries }
    }

    pub fn from_value(spec: &Value) -> Self {
        if !is_truthy(spec) {
            return Self::default();
        }
        match spec {
            Value::Object(map) => {
                let entries = map
                    .iter()
                    .filter(|(_, args)| is_truthy(args))
                    .map(|(name, args)| RuleEntry {
                        name: name.clone(),
                        args: match args {
                            Value::Array(items) => items.iter().cloned().map(RuleArg::from).collect(),
                            _ => Vec::new(),
                        },
                    })
                    .collect();
                Self { entries }
            }
            other => Self::parse(&js_string(other)),
        }
    }

    pub fn with<A: Into<RuleArg>>(
        mut self,
        name: impl Into<String>,
        args: impl IntoIterator<Item = A>,
    ) -> Self {
        self.entries.push(RuleEntry {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&str> for RuleSpec {
    fn from(value: &str) -> Self {
        RuleSpec::parse(value)
    }
}

impl From<String> for RuleSpec {
    fn from(value: String) -> Self {
        RuleSpec::parse(&value)
    }
}

impl From<Value> for RuleSpec {
    fn from(value: Value) -> Self {
        RuleSpec::from_value(&value)
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFilters {
    #[serde(default)]
    before: Map<String, Value>,
    #[serde(default)]
    after: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSchema {
    #[serde(default)]
    rules: Map<String, Value>,
    #[serde(default)]
    messages: Map<String, Value>,
    #[serde(default)]
    filters: RawFilters,
}

/// Declarative validation for one route: rules, message overrides and value filters.
///
/// ```rust,ignore
/// let schema: ValidationSchema = serde_json::from_value(json!({
///     "rules": {"name": "required|alphaDash", "age": {"min": ["18"]}},
///     "messages": {"name.required": ":attribute is missing"},
///     "filters": {"before": {"name": "trim"}}
/// }))?;
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawSchema")]
pub struct ValidationSchema {
    rules: Vec<(String, RuleSpec)>,
    messages: HashMap<String, String>,
    before: Vec<(String, RuleSpec)>,
    after: Vec<(String, RuleSpec)>,
}

impl From<RawSchema> for ValidationSchema {
    fn from(raw: RawSchema) -> Self {
        let specs = |map: Map<String, Value>| {
            map.into_iter()
                .map(|(field, spec)| (field, RuleSpec::from_value(&spec)))
                .collect()
        };
        Self {
            rules: specs(raw.rules),
            messages: raw
                .messages
                .into_iter()
                .map(|(key, message)| (key, js_string(&message)))
                .collect(),
            before: specs(raw.filters.before),
            after: specs(raw.filters.after),
        }
    }
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, field: impl Into<String>, spec: impl Into<RuleSpec>) -> Self {
        self.rules.push((field.into(), spec.into()));
        self
    }

    /// Overrides a message. `key` is either `field.rule` or a bare rule name.
    pub fn message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(key.into(), message.into());
        self
    }

    pub fn before_filter(mut self, field: impl Into<String>, spec: impl Into<RuleSpec>) -> Self {
        self.before.push((field.into(), spec.into()));
        self
    }

    pub fn after_filter(mut self, field: impl Into<String>, spec: impl Into<RuleSpec>) -> Self {
        self.after.push((field.into(), spec.into()));
        self
    }

    pub fn rules(&self) -> &[(String, RuleSpec)] {
        &self.rules
    }

    pub fn messages(&self) -> &HashMap<String, String> {
        &self.messages
    }

    pub fn before_filters(&self) -> &[(String, RuleSpec)] {
        &self.before
    }

    pub fn after_filters(&self) -> &[(String, RuleSpec)] {
        &self.after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(spec: &RuleSpec) -> Vec<&str> {
        spec.entries().iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_parse_string_form() {
        let spec = RuleSpec::parse("required|between:1,10|regex:a:b");
        assert_eq!(names(&spec), vec!["required", "between", "regex"]);
        assert_eq!(spec.entries()[1].args.len(), 2);
        assert_eq!(spec.entries()[2].args[0].as_str(), Some("a:b"));
        assert!(spec.entries()[0].args.is_empty());
    }

    #[test]
    fn test_parse_object_form() {
        let spec = RuleSpec::from_value(&json!({
            "required": true,
            "min": ["5"],
            "max": false,
            "email": 1
        }));
        assert_eq!(names(&spec), vec!["required", "min", "email"]);
        assert_eq!(spec.entries()[1].args[0].as_str(), Some("5"));
        assert!(spec.entries()[2].args.is_empty());
        assert!(RuleSpec::from_value(&json!("")).is_empty());
    }

    #[test]
    fn test_unwrap_args() {
        let one = vec![RuleArg::from("x")];
        assert_eq!(RuleArgs::unwrap(&one).single_str(), Some("x"));
        let two = vec![RuleArg::from("1"), RuleArg::from("2")];
        let args = RuleArgs::unwrap(&two);
        assert!(args.single_str().is_none());
        assert_eq!(args.to_js_string(), "1,2");
        assert_eq!(args.to_value(), json!(["1", "2"]));
        assert_eq!(RuleArgs::unwrap(&one).as_list().len(), 1);
    }

    #[test]
    fn test_deserialize_schema() {
        let schema: ValidationSchema = serde_json::from_value(json!({
            "rules": {"name": "required", "age": {"integer": true}},
            "messages": {"name.required": ":attribute missing"},
            "filters": {"before": {"name": "trim"}, "after": {"age": "integer"}}
        }))
        .unwrap();
        assert_eq!(schema.rules().len(), 2);
        assert_eq!(schema.rules()[0].0, "name");
        assert_eq!(schema.messages()["name.required"], ":attribute missing");
        assert_eq!(schema.before_filters().len(), 1);
        assert_eq!(schema.after_filters().len(), 1);
    }
}
