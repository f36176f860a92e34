use crate::validation::dates::{DATE_FORMATS, parse_any, parse_date, parse_default};
use crate::validation::path::resolve_field;
use crate::validation::schema::{RuleArg, RuleArgs};
use crate::validation::{IssueKind, RuleContext};
use crate::value::{is_int, is_numeric, js_equal, js_loose_equal, js_number, js_string, js_string_opt, parse_int};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::net::IpAddr;
use url::{Host, Url};

static ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+$").expect("valid regex"));
static ALPHA_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Za-z]+$").expect("valid regex"));
static ALPHA_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[A-Z0-9_-]+$").expect("valid regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("valid regex")
});
static TLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]{2,63}$").expect("valid regex"));

const INVALID_SINGLE_STRING: &str =
    "The number of arguments provided is invalid. Please provide one single string";
const INVALID_ARG_COUNT: &str = "The number of arguments in the field are invalid";
const ARGS_NOT_INTEGERS: &str = "The rule arguments for the field need to be integers";
const MIN_NOT_BELOW_MAX: &str =
    "The rule argument for the min value cannot be greater than or equal to the max value";
const FIELD_MISSING: &str = "The field you are comparing the value against does not exist";

/// The value rules a schema may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Accepted,
    After,
    Alpha,
    AlphaDash,
    AlphaNumeric,
    Before,
    Between,
    Boolean,
    Contains,
    Date,
    DateFormat,
    Different,
    Digits,
    DigitsBetween,
    Email,
    Equals,
    In,
    Integer,
    Ip,
    Json,
    LengthBetween,
    Max,
    MaxLength,
    Min,
    MinLength,
    NotContains,
    NotIn,
    Numeric,
    Regex,
    Same,
    String,
    Timezone,
    Url,
}

impl Rule {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "accepted" => Rule::Accepted,
            "after" => Rule::After,
            "alpha" => Rule::Alpha,
            "alphaDash" => Rule::AlphaDash,
            "alphaNumeric" => Rule::AlphaNumeric,
            "before" => Rule::Before,
            "between" => Rule::Between,
            "boolean" => Rule::Boolean,
            "contains" => Rule::Contains,
            "date" => Rule::Date,
            "dateFormat" => Rule::DateFormat,
            "different" => Rule::Different,
            "digits" => Rule::Digits,
            "digitsBetween" => Rule::DigitsBetween,
            "email" => Rule::Email,
            "equals" => Rule::Equals,
            "in" => Rule::In,
            "integer" => Rule::Integer,
            "ip" => Rule::Ip,
            "json" => Rule::Json,
            "lengthBetween" => Rule::LengthBetween,
            "max" => Rule::Max,
            "maxLength" => Rule::MaxLength,
            "min" => Rule::Min,
            "minLength" => Rule::MinLength,
            "notContains" => Rule::NotContains,
            "notIn" => Rule::NotIn,
            "numeric" => Rule::Numeric,
            "regex" => Rule::Regex,
            "same" => Rule::Same,
            "string" => Rule::String,
            "timezone" => Rule::Timezone,
            "url" => Rule::Url,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Rule::Accepted => "accepted",
            Rule::After => "after",
            Rule::Alpha => "alpha",
            Rule::AlphaDash => "alphaDash",
            Rule::AlphaNumeric => "alphaNumeric",
            Rule::Before => "before",
            Rule::Between => "between",
            Rule::Boolean => "boolean",
            Rule::Contains => "contains",
            Rule::Date => "date",
            Rule::DateFormat => "dateFormat",
            Rule::Different => "different",
            Rule::Digits => "digits",
            Rule::DigitsBetween => "digitsBetween",
            Rule::Email => "email",
            Rule::Equals => "equals",
            Rule::In => "in",
            Rule::Integer => "integer",
            Rule::Ip => "ip",
            Rule::Json => "json",
            Rule::LengthBetween => "lengthBetween",
            Rule::Max => "max",
            Rule::MaxLength => "maxLength",
            Rule::Min => "min",
            Rule::MinLength => "minLength",
            Rule::NotContains => "notContains",
            Rule::NotIn => "notIn",
            Rule::Numeric => "numeric",
            Rule::Regex => "regex",
            Rule::Same => "same",
            Rule::String => "string",
            Rule::Timezone => "timezone",
            Rule::Url => "url",
        }
    }

    /// Whether the rule receives its (unwrapped) arguments.
    pub fn takes_args(self) -> bool {
        !matches!(
            self,
            Rule::Accepted
                | Rule::Alpha
                | Rule::AlphaDash
                | Rule::AlphaNumeric
                | Rule::Boolean
                | Rule::Date
                | Rule::Email
                | Rule::Integer
                | Rule::Ip
                | Rule::Json
                | Rule::Numeric
                | Rule::String
                | Rule::Timezone
                | Rule::Url
        )
    }

    /// Checks `value` and records an issue on failure.
    pub(crate) fn check(
        self,
        ctx: &mut RuleContext<'_>,
        value: Option<&Value>,
        args: RuleArgs<'_>,
        message: Option<&str>,
    ) -> bool {
        let text = || js_string_opt(value);
        let passed = match self {
            Rule::Accepted => value.is_some_and(is_accepted),
            Rule::Alpha => ALPHA.is_match(&text()),
            Rule::AlphaDash => ALPHA_DASH.is_match(&text()),
            Rule::AlphaNumeric => ALPHA_NUMERIC.is_match(&text()),
            Rule::Boolean => value.is_some_and(is_boolean_like),
            Rule::Date => parse_any(&text(), &DATE_FORMATS).is_some(),
            Rule::Email => EMAIL.is_match(&text()),
            Rule::Integer => is_int(&text()),
            Rule::Ip => text().parse::<IpAddr>().is_ok(),
            Rule::Json => matches!(
                serde_json::from_str::<Value>(&text()),
                Ok(Value::Object(_) | Value::Array(_))
            ),
            Rule::Numeric => is_numeric(&text()),
            Rule::String => matches!(value, Some(Value::String(_))),
            Rule::Timezone => text().parse::<chrono_tz::Tz>().is_ok(),
            Rule::Url => is_url(&text()),
            Rule::After | Rule::Before => return date_order(self, ctx, value, args, message),
            Rule::Between | Rule::DigitsBetween => return digits_between(ctx, value, args, message),
            Rule::LengthBetween => return length_between(ctx, value, args, message),
            Rule::Contains | Rule::NotContains => return contains(self, ctx, value, args, message),
            Rule::DateFormat => return date_format(ctx, value, args, message),
            Rule::Different => return different(ctx, value, args, message),
            Rule::Same => return same(ctx, value, args, message),
            Rule::Digits => return digits(ctx, value, args, message),
            Rule::Equals => return equals(ctx, value, args, message),
            Rule::In | Rule::NotIn => return membership(self, ctx, value, args, message),
            Rule::Max | Rule::Min | Rule::MaxLength | Rule::MinLength => {
                return bound(self, ctx, value, args, message);
            }
            Rule::Regex => return regex(ctx, value, args, message),
        };
        if !passed {
            let default = match self {
                Rule::Accepted => "The value of the field needs to be between 1, yes, or true",
                Rule::Alpha => "The value of the field needs to be alphabetical",
                Rule::AlphaDash => "The field value can only contain alphabetic characters, _ and -",
                Rule::AlphaNumeric => "The value of the field can only contain letters and numbers",
                Rule::Boolean => "The value of the field needs to be between true, false, 0 and 1",
                Rule::Date => "The value provided for the field is an invalid date",
                Rule::Email => "The value entered is not a valid email",
                Rule::Integer => "The value entered is not an integer",
                Rule::Ip => "The value entered is not an IP Address",
                Rule::Json => "The value entered is not a JSON string",
                Rule::Numeric => "The value entered is not numeric",
                Rule::String => "The value provided is not a string",
                Rule::Timezone => "The value provided is not a valid timezone",
                _ => "The value provided is not a URL",
            };
            ctx.add_error(IssueKind::Rule, self.name(), pick(message, default));
        }
        passed
    }
}

fn pick(message: Option<&str>, default: &str) -> String {
    message.unwrap_or(default).to_string()
}

fn is_accepted(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => matches!(text.as_str(), "yes" | "on" | "1"),
        Value::Number(number) => number.as_f64() == Some(1.0),
        _ => false,
    }
}

fn is_boolean_like(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(text) => matches!(text.as_str(), "0" | "1"),
        Value::Number(number) => matches!(number.as_f64(), Some(n) if n == 0.0 || n == 1.0),
        _ => false,
    }
}

/// Accepts http, https and ftp URLs whose host is an IP or a dotted domain; a missing
/// scheme defaults to http.
fn is_url(text: &str) -> bool {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return false;
    }
    let candidate = if text.contains("://") {
        text.to_string()
    } else {
        format!("http://{text}")
    };
    let Ok(url) = Url::parse(&candidate) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https" | "ftp") {
        return false;
    }
    match url.host() {
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => true,
        Some(Host::Domain(domain)) => {
            let labels: Vec<&str> = domain.split('.').collect();
            labels.len() > 1
                && labels.iter().all(|label| !label.is_empty())
                && labels.last().is_some_and(|tld| TLD.is_match(tld))
        }
        None => false,
    }
}

fn date_order(
    rule: Rule,
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let (placeholder, invalid_arg, later) = match rule {
        Rule::After => (
            ":afterDate",
            "The after date argument is an invalid date",
            "The provided date does not fall after the date mentioned in the argument",
        ),
        _ => (
            ":beforeDate",
            "The before date argument is an invalid date",
            "The provided date does not come before the date mentioned in the argument",
        ),
    };
    let argument = args.single_string().unwrap_or_default();
    let message = message.map(|m| m.replace(placeholder, &argument));
    let pinned = ctx.date_format.clone();

    let reference = parse_default(&argument, pinned.as_deref());
    let text = js_string_opt(value);
    let parsed = match pinned.as_deref() {
        Some(format) => parse_date(&text, format),
        None => parse_any(&text, &DATE_FORMATS),
    };
    let (Some(reference), Some(parsed)) = (reference, parsed) else {
        let default = if reference.is_none() {
            invalid_arg
        } else {
            "The value of the field is an invalid date"
        };
        // invalid-date errors of `after` always use the built-in text
        let message = match rule {
            Rule::After => default.to_string(),
            _ => message.unwrap_or_else(|| default.to_string()),
        };
        ctx.add_error(IssueKind::Rule, rule.name(), message);
        return false;
    };
    let in_order = match rule {
        Rule::After => reference <= parsed,
        _ => reference >= parsed,
    };
    if !in_order {
        ctx.add_error(IssueKind::Rule, rule.name(), message.unwrap_or_else(|| later.to_string()));
    }
    in_order
}

/// Checks both bounds are integers with `min < max` and returns them.
fn range_args(args: RuleArgs<'_>) -> Result<(String, String, f64, f64), &'static str> {
    let RuleArgs::Many([low, high]) = args else {
        return Err(INVALID_ARG_COUNT);
    };
    let (low, high) = (low.to_js_string(), high.to_js_string());
    if !is_int(&low) || !is_int(&high) {
        return Err(ARGS_NOT_INTEGERS);
    }
    match (parse_int(&low), parse_int(&high)) {
        (Some(min), Some(max)) if min < max => Ok((low, high, min, max)),
        _ => Err(MIN_NOT_BELOW_MAX),
    }
}

fn digits_between(
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let name = Rule::DigitsBetween.name();
    let (low, high, min, max) = match range_args(args) {
        Ok(range) => range,
        Err(problem) => {
            ctx.add_error(IssueKind::Rule, name, problem);
            return false;
        }
    };
    let Some(number) = parse_int(&js_string_opt(value)) else {
        return true;
    };
    if number < min || number > max {
        let message = message
            .map(|m| m.replace(":min", &low).replace(":max", &high))
            .unwrap_or_else(|| "The digits are not within the specified range".to_string());
        ctx.add_error(IssueKind::Rule, name, message);
        return false;
    }
    true
}

fn length_between(
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let name = Rule::Between.name();
    let (low, high, min, max) = match range_args(args) {
        Ok(range) => range,
        Err(problem) => {
            ctx.add_error(IssueKind::Rule, name, problem);
            return false;
        }
    };
    let length = js_length(value);
    if length < min || length > max {
        let message = message
            .map(|m| m.replace(":minLength", &low).replace(":maxLength", &high))
            .unwrap_or_else(|| "The size of the field is not within the specified range".to_string());
        ctx.add_error(IssueKind::Rule, name, message);
        return false;
    }
    true
}

/// Length in UTF-16 code units.
fn js_length(value: Option<&Value>) -> f64 {
    js_string_opt(value).encode_utf16().count() as f64
}

fn contains(
    rule: Rule,
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let Some(substring) = args.single_str() else {
        ctx.add_error(IssueKind::Rule, rule.name(), INVALID_SINGLE_STRING);
        return false;
    };
    let found = js_string_opt(value).contains(substring);
    let passed = match rule {
        Rule::Contains => found,
        _ => !found,
    };
    if !passed {
        let default = match rule {
            Rule::Contains => "The value of the field does not contains the specified text.",
            _ => "The value of the field can only contain letters and numbers",
        };
        let message = message
            .map(|m| m.replace(":substring", substring))
            .unwrap_or_else(|| default.to_string());
        ctx.add_error(IssueKind::Rule, rule.name(), message);
    }
    passed
}

fn date_format(
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let format = args.single_string().unwrap_or_default();
    let valid = !format.is_empty() && parse_date(&js_string_opt(value), &format).is_some();
    if !valid {
        let message = message
            .map(|m| m.replace(":format", &format))
            .unwrap_or_else(|| {
                "The value provided for the field is either invalid or not in the format mentioned"
                    .to_string()
            });
        ctx.add_error(IssueKind::Rule, Rule::DateFormat.name(), message);
        return false;
    }
    *ctx.date_format = Some(format);
    true
}

fn different(
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let name = Rule::Different.name();
    let Some(other) = args.single_str() else {
        ctx.add_error(IssueKind::Rule, name, INVALID_SINGLE_STRING);
        return false;
    };
    let Some(other_value) = resolve_field(ctx.fields, other) else {
        ctx.add_error(IssueKind::Rule, name, pick(message, FIELD_MISSING));
        return false;
    };
    let same_scalar = match (value, &other_value) {
        (Some(Value::Array(_) | Value::Object(_)), _) => false,
        (Some(value), other_value) => js_equal(value, other_value),
        (None, _) => false,
    };
    if same_scalar {
        ctx.add_error(
            IssueKind::Rule,
            name,
            pick(message, "The field you are comparing the value against is the same"),
        );
        return false;
    }
    true
}

fn same(
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let name = Rule::Same.name();
    let Some(other) = args.single_str() else {
        ctx.add_error(IssueKind::Rule, name, pick(message, INVALID_SINGLE_STRING));
        return false;
    };
    let Some(target) = resolve_field(ctx.fields, other) else {
        ctx.add_error(IssueKind::Rule, name, pick(message, FIELD_MISSING));
        return false;
    };
    if !value.is_some_and(|value| js_equal(value, &target)) {
        ctx.add_error(
            IssueKind::Rule,
            name,
            pick(message, "The field you are comparing the value against are different"),
        );
        return false;
    }
    true
}

fn digits(
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let name = Rule::Digits.name();
    let expected = args.to_js_string();
    let message = message.map(|m| m.replace(":digits", &expected));
    if !is_int(&expected) {
        ctx.add_error(IssueKind::Rule, name, "The argument entered is an invalid. Please enter digits");
        return false;
    }
    let actual = value.and_then(js_number);
    if actual.is_none() || actual != parse_int(&expected) {
        ctx.add_error(
            IssueKind::Rule,
            name,
            message.unwrap_or_else(|| "The value does not match with the mentioned number".to_string()),
        );
        return false;
    }
    true
}

/// Equality after coercing a string compared with a scalar to strings.
pub(crate) fn coerced_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(text), Value::Number(_) | Value::Bool(_)) => *text == js_string(right),
        (Value::Number(_) | Value::Bool(_), Value::String(text)) => js_string(left) == *text,
        _ => js_equal(left, right),
    }
}

fn equals(
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let expected = args.to_value();
    if !value.is_some_and(|value| coerced_equal(value, &expected)) {
        ctx.add_error(
            IssueKind::Rule,
            Rule::Equals.name(),
            pick(message, "The value entered does not match with the argument"),
        );
        return false;
    }
    true
}

fn membership(
    rule: Rule,
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let candidates: Vec<Value> = args.as_list().iter().map(RuleArg::to_value).collect();
    let passed = match rule {
        Rule::In => {
            let value = value.cloned().unwrap_or(Value::Null);
            candidates.iter().any(|candidate| js_loose_equal(&value, candidate))
        }
        _ => !value.is_some_and(|value| candidates.iter().any(|candidate| js_equal(value, candidate))),
    };
    if !passed {
        let default = match rule {
            Rule::In => "The value entered does not exist in the arguments supplied",
            _ => "The value entered exists in the arguments supplied",
        };
        ctx.add_error(IssueKind::Rule, rule.name(), pick(message, default));
    }
    passed
}

fn bound(
    rule: Rule,
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let limit_text = args.to_js_string();
    if !is_int(&limit_text) {
        let (name, default) = match rule {
            Rule::Max | Rule::MaxLength => ("max", "The rule arguments for max fields needs to be an integer"),
            _ => ("min", "The rule arguments for min fields needs to be an integer"),
        };
        let message = match rule {
            Rule::MinLength => default.to_string(),
            _ => pick(message, default),
        };
        ctx.add_error(IssueKind::Rule, name, message);
        return false;
    }
    let limit = parse_int(&limit_text);
    let (measured, placeholder, default) = match rule {
        Rule::Max => (
            parse_int(&js_string_opt(value)),
            ":max",
            "The value of the field is greater than the max argument",
        ),
        Rule::Min => (
            parse_int(&js_string_opt(value)),
            ":min",
            "The value of the field is lesser than the min argument",
        ),
        Rule::MaxLength => (
            Some(js_length(value)),
            ":maxLength",
            "The size of the field is greater than the max argument",
        ),
        _ => (
            Some(js_length(value)),
            ":minLength",
            "The size of the field is lesser than the min argument",
        ),
    };
    let out_of_bounds = match (measured, limit) {
        (Some(measured), Some(limit)) => match rule {
            Rule::Max | Rule::MaxLength => measured > limit,
            _ => measured < limit,
        },
        // NaN never compares
        _ => false,
    };
    if out_of_bounds {
        let message = message
            .map(|m| m.replace(placeholder, &limit_text))
            .unwrap_or_else(|| default.to_string());
        ctx.add_error(IssueKind::Rule, rule.name(), message);
        return false;
    }
    true
}

fn regex(
    ctx: &mut RuleContext<'_>,
    value: Option<&Value>,
    args: RuleArgs<'_>,
    message: Option<&str>,
) -> bool {
    let name = Rule::Regex.name();
    let RuleArgs::One(RuleArg::Regex(pattern)) = args else {
        ctx.add_error(
            IssueKind::Rule,
            name,
            pick(message, "The regex argument is not a valid regular expression"),
        );
        return false;
    };
    if !pattern.is_match(&js_string_opt(value)) {
        let message = message
            .map(|m| m.replace(":regexp", &format!("/{}/", pattern.as_str())))
            .unwrap_or_else(|| "The value provided did not match with the regex format".to_string());
        ctx.add_error(IssueKind::Rule, name, message);
        return false;
    }
    true
}
