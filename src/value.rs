//! Loose value coercions shared by parameter injection and the validation rules.
//!
//! Request data arrives as untyped JSON, and rules compare, stringify and count it the way
//! a browser-side form library would: `1` equals `"1"` for membership checks, `null`
//! stringifies to an empty string, and so on. These helpers pin that behaviour down in
//! one place.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

static INT_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?(?:0|[1-9][0-9]*)$").expect("int regex"));
static NUMERIC_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?([0-9]*[.])?[0-9]+$").expect("numeric regex"));
static FLOAT_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(?:[0-9]+)?(?:\.[0-9]*)?(?:[eE][+-]?[0-9]+)?$").expect("float regex")
});

/// String form of a value: `null` is empty, arrays join with `,`, objects become `[object Object]`.
pub fn js_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number_to_string(number),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(js_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => String::from("[object Object]"),
    }
}

/// Same as `js_string` with a missing value mapped to an empty string.
pub fn js_string_opt(value: Option<&Value>) -> String {
    value.map(js_string).unwrap_or_default()
}

fn number_to_string(number: &Number) -> String {
    if let Some(int) = number.as_i64() {
        return int.to_string();
    }
    if let Some(int) = number.as_u64() {
        return int.to_string();
    }
    format_f64(number.as_f64().unwrap_or(f64::NAN))
}

pub fn format_f64(value: f64) -> String {
    if value.is_nan() {
        String::from("NaN")
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{}", value as i128)
    } else {
        format!("{}", value)
    }
}

/// Numeric conversion of a value; `None` stands for NaN.
pub fn js_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Number(number) => number.as_f64(),
        Value::String(text) => string_to_number(text),
        Value::Array(items) => match items.as_slice() {
            [] => Some(0.0),
            [single] => string_to_number(&js_string(single)),
            _ => None,
        },
        Value::Object(_) => None,
    }
}

fn string_to_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Leading-integer parse of a string: `"12px"` is 12, `"px"` is `None`.
pub fn parse_int(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1.0, &trimmed[1..]),
        Some(b'+') => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<f64>().ok().map(|v| sign * v)
}

/// Converts a finite number to JSON, keeping integral values integral.
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

pub fn is_int(text: &str) -> bool {
    INT_FORMAT.is_match(text)
}

pub fn is_numeric(text: &str) -> bool {
    NUMERIC_FORMAT.is_match(text)
}

pub fn is_float(text: &str) -> bool {
    !matches!(text, "" | "." | "+" | "-") && FLOAT_FORMAT.is_match(text)
}

/// `true` for a missing value, `null`, or a value whose trimmed string form is empty.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(value) => js_string(value).trim().is_empty(),
    }
}

/// Deep structural equality with numbers compared by value (`1` equals `1.0`).
pub fn js_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| js_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| js_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Loose equality: strings and booleans are compared numerically against numbers and
/// containers compare through their string form.
pub fn js_loose_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(_), Value::Number(_)) => js_equal(left, right),
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => false,
        (Value::Array(_) | Value::Object(_), _) => {
            js_loose_equal(&Value::String(js_string(left)), right)
        }
        (_, Value::Array(_) | Value::Object(_)) => {
            js_loose_equal(left, &Value::String(js_string(right)))
        }
        _ => match (js_number(left), js_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}
