use crate::validation::schema::{RuleArg, is_truthy};
use crate::validation::{IssueKind, ValidationIssue};
use crate::value::{is_float, js_string, number_value, parse_int};
use md5::Md5;
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

/// Value transformations applied before or after the rules of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Integer,
    Float,
    Lowercase,
    Uppercase,
    Boolean,
    Json,
    Trim,
    Ltrim,
    Rtrim,
    Escape,
    Replace,
    Hex,
    Sha1,
    Md5,
}

impl Filter {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "integer" => Filter::Integer,
            "float" => Filter::Float,
            "lowercase" => Filter::Lowercase,
            "uppercase" => Filter::Uppercase,
            "boolean" => Filter::Boolean,
            "json" => Filter::Json,
            "trim" => Filter::Trim,
            "ltrim" => Filter::Ltrim,
            "rtrim" => Filter::Rtrim,
            "escape" => Filter::Escape,
            "replace" => Filter::Replace,
            "hex" => Filter::Hex,
            "sha1" => Filter::Sha1,
            "md5" => Filter::Md5,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Filter::Integer => "integer",
            Filter::Float => "float",
            Filter::Lowercase => "lowercase",
            Filter::Uppercase => "uppercase",
            Filter::Boolean => "boolean",
            Filter::Json => "json",
            Filter::Trim => "trim",
            Filter::Ltrim => "ltrim",
            Filter::Rtrim => "rtrim",
            Filter::Escape => "escape",
            Filter::Replace => "replace",
            Filter::Hex => "hex",
            Filter::Sha1 => "sha1",
            Filter::Md5 => "md5",
        }
    }

    /// Transforms `value`. `None` means the filter failed and an issue was recorded.
    pub(crate) fn apply(
        self,
        field: &str,
        value: &Value,
        args: &[RuleArg],
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Value> {
        let result = match self {
            Filter::Integer => parse_int(&js_string(value))
                .map(number_value)
                .ok_or_else(|| format!("The value for {field} cannot be converted to an integer.")),
            Filter::Float => {
                let text = js_string(value);
                let trimmed = text.trim();
                is_float(trimmed)
                    .then(|| trimmed.parse::<f64>().ok())
                    .flatten()
                    .map(number_value)
                    .ok_or_else(|| format!("The value for {field} cannot be converted to a Float."))
            }
            Filter::Lowercase => value
                .as_str()
                .map(|text| Value::String(text.to_lowercase()))
                .ok_or_else(|| format!("The value for {field} cannot be converted to lowercase.")),
            Filter::Uppercase => value
                .as_str()
                .map(|text| Value::String(text.to_uppercase()))
                .ok_or_else(|| format!("The value for {field} cannot be converted to uppercase.")),
            Filter::Boolean => {
                let text = js_string(value);
                Ok(Value::Bool(
                    !text.is_empty() && text != "0" && !text.eq_ignore_ascii_case("false"),
                ))
            }
            Filter::Json => serde_json::to_string(&js_string(value))
                .map(Value::String)
                .map_err(|_| "Invalid string cannot be converted to JSON".to_string()),
            Filter::Trim | Filter::Ltrim | Filter::Rtrim => trim(self, field, value, args),
            Filter::Escape => Ok(Value::String(escape(&js_string(value)))),
            Filter::Replace => replace(field, value, args),
            Filter::Hex => hex_digest(value, args)
                .ok_or_else(|| "The value or arguments required to hex the field are invalid".to_string()),
            Filter::Sha1 => value
                .as_str()
                .map(|text| Value::String(hex::encode(Sha1::digest(text.as_bytes()))))
                .ok_or_else(|| "The value you tried to sha1 is invalid".to_string()),
            Filter::Md5 => value
                .as_str()
                .map(|text| Value::String(hex::encode(Md5::digest(text.as_bytes()))))
                .ok_or_else(|| "The value you tried to md5 is invalid".to_string()),
        };
        match result {
            Ok(filtered) => Some(filtered),
            Err(message) => {
                issues.push(ValidationIssue::new(field, IssueKind::Filter, self.name(), message));
                None
            }
        }
    }
}

fn trim(filter: Filter, field: &str, value: &Value, args: &[RuleArg]) -> Result<Value, String> {
    let text = js_string(value);
    let chars: Option<Vec<char>> = args
        .first()
        .and_then(RuleArg::as_value)
        .filter(|arg| is_truthy(arg))
        .map(|arg| js_string(arg).chars().collect());
    let matches = |c: char| match &chars {
        Some(set) => set.contains(&c),
        None => c.is_whitespace(),
    };
    let trimmed = match filter {
        Filter::Ltrim => text.trim_start_matches(matches),
        Filter::Rtrim => text.trim_end_matches(matches),
        _ => text.trim_matches(matches),
    };
    if trimmed.is_empty() {
        return Err(format!(
            "The value for {field} cannot be trimmed as the data type is invalid"
        ));
    }
    Ok(Value::String(trimmed.to_string()))
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '/' => escaped.push_str("&#x2F;"),
            '\\' => escaped.push_str("&#x5C;"),
            '`' => escaped.push_str("&#96;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn replace(field: &str, value: &Value, args: &[RuleArg]) -> Result<Value, String> {
    let present = |arg: Option<&RuleArg>| match arg {
        Some(RuleArg::Regex(_)) => true,
        Some(RuleArg::Value(value)) => is_truthy(value),
        None => false,
    };
    let (Some(original), Some(replacement)) = (args.first(), args.get(1)) else {
        return Err("The arguments for replacing the provided string are missing".to_string());
    };
    if !present(Some(original)) || !present(Some(replacement)) {
        return Err("The arguments for replacing the provided string are missing".to_string());
    }
    let Some(text) = value.as_str() else {
        return Err(format!(
            "The value for {field} is not a valid string and hence cannot be replaced."
        ));
    };
    let replacement = replacement.to_js_string();
    let replaced = match original {
        RuleArg::Regex(pattern) => pattern.replace(text, replacement.as_str()).into_owned(),
        RuleArg::Value(_) => text.replacen(&original.to_js_string(), &replacement, 1),
    };
    Ok(Value::String(replaced))
}

fn hex_digest(value: &Value, args: &[RuleArg]) -> Option<Value> {
    let text = value.as_str()?;
    let algorithm = args.first()?.as_str()?;
    let encoding = args.get(1).and_then(RuleArg::as_str).unwrap_or("hex");
    if encoding != "hex" {
        return None;
    }
    let bytes = text.as_bytes();
    let digest = match algorithm.to_ascii_lowercase().as_str() {
        "md5" => hex::encode(Md5::digest(bytes)),
        "sha1" => hex::encode(Sha1::digest(bytes)),
        "sha224" => hex::encode(Sha224::digest(bytes)),
        "sha256" => hex::encode(Sha256::digest(bytes)),
        "sha384" => hex::encode(Sha384::digest(bytes)),
        "sha512" => hex::encode(Sha512::digest(bytes)),
        _ => return None,
    };
    Some(Value::String(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use serde_json::json;

    fn apply(filter: &str, value: Value, args: Vec<RuleArg>) -> (Option<Value>, Vec<ValidationIssue>) {
        let mut issues = Vec::new();
        let result = Filter::from_name(filter)
            .unwrap()
            .apply("name", &value, &args, &mut issues);
        (result, issues)
    }

    #[test]
    fn test_conversions() {
        assert_eq!(apply("integer", json!("42px"), vec![]).0, Some(json!(42)));
        let (result, issues) = apply("integer", json!("px"), vec![]);
        assert!(result.is_none());
        assert_eq!(issues[0].message, "The value for name cannot be converted to an integer.");
        assert_eq!(issues[0].filter.as_deref(), Some("integer"));
        assert_eq!(apply("float", json!("1.5"), vec![]).0, Some(json!(1.5)));
        assert!(apply("float", json!("1.5x"), vec![]).0.is_none());
        assert_eq!(apply("boolean", json!("False"), vec![]).0, Some(json!(false)));
        assert_eq!(apply("boolean", json!("yes"), vec![]).0, Some(json!(true)));
        assert_eq!(apply("json", json!("a\"b"), vec![]).0, Some(json!("\"a\\\"b\"")));
        assert_eq!(apply("uppercase", json!("abc"), vec![]).0, Some(json!("ABC")));
        assert!(apply("lowercase", json!(1), vec![]).0.is_none());
    }

    #[test]
    fn test_trim_family() {
        assert_eq!(apply("trim", json!("  a b "), vec![]).0, Some(json!("a b")));
        assert_eq!(apply("ltrim", json!("xxaxx"), vec![RuleArg::from("x")]).0, Some(json!("axx")));
        assert_eq!(apply("rtrim", json!("xxaxx"), vec![RuleArg::from("x")]).0, Some(json!("xxa")));
        let (result, issues) = apply("trim", json!("   "), vec![]);
        assert!(result.is_none());
        assert_eq!(
            issues[0].message,
            "The value for name cannot be trimmed as the data type is invalid"
        );
    }

    #[test]
    fn test_escape_and_replace() {
        assert_eq!(
            apply("escape", json!("<a href='/'>&</a>"), vec![]).0,
            Some(json!("&lt;a href=&#x27;&#x2F;&#x27;&gt;&amp;&lt;&#x2F;a&gt;"))
        );
        assert_eq!(
            apply("replace", json!("a-a-a"), vec![RuleArg::from("a"), RuleArg::from("b")]).0,
            Some(json!("b-a-a"))
        );
        let pattern = RuleArg::from(Regex::new("a").unwrap());
        assert_eq!(
            apply("replace", json!("a-a-a"), vec![pattern.clone(), RuleArg::from("b")]).0,
            Some(json!("b-a-a"))
        );
        assert_eq!(
            apply("replace", json!("aaa"), vec![pattern, RuleArg::from("b")]).0,
            Some(json!("baa"))
        );
        let (_, issues) = apply("replace", json!("a"), vec![RuleArg::from("a")]);
        assert_eq!(issues[0].message, "The arguments for replacing the provided string are missing");
        let (_, issues) = apply("replace", json!(1), vec![RuleArg::from("a"), RuleArg::from("b")]);
        assert!(issues[0].message.contains("is not a valid string"));
    }

    #[test]
    fn test_digests() {
        assert_eq!(
            apply("md5", json!("abc"), vec![]).0,
            Some(json!("900150983cd24fb0d6963f7d28e17f72"))
        );
        assert_eq!(
            apply("sha1", json!("abc"), vec![]).0,
            Some(json!("a9993e364706816aba3e25717850c26c9cd0d89d"))
        );
        assert_eq!(
            apply("hex", json!("abc"), vec![RuleArg::from("sha256")]).0,
            Some(json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"))
        );
        let (result, issues) = apply("hex", json!("abc"), vec![RuleArg::from("whirlpool")]);
        assert!(result.is_none());
        assert_eq!(
            issues[0].message,
            "The value or arguments required to hex the field are invalid"
        );
        assert!(apply("sha1", json!(5), vec![]).0.is_none());
    }
}
