use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

/// Marker for the ISO-8601 family in a format list.
pub const ISO_8601: &str = "ISO_8601";

/// Formats tried, in order, when a field has no pinned date format.
pub const DATE_FORMATS: [&str; 12] = [
    ISO_8601,
    "DD-MM-YYYY",
    "DD.MM.YYYY",
    "DD/MM/YYYY",
    "D-M-YYYY",
    "D.M.YYYY",
    "D/M/YYYY",
    "YYYY-MM-DD",
    "YYYY-MM-DD HH:mm",
    "YYYY-MM-DD HH:mm:Z",
    "YYYY-MM-DD HH:mm:ZZ",
    "YYYY-MM-DD HH:mm Z",
];

const ISO_NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Format tokens, longest first so `YYYY` wins over `YY`, with the chrono specifier and
/// the exact text shape each token accepts.
const TOKENS: [(&str, &str, &str); 15] = [
    ("YYYY", "%Y", r"\d{4}"),
    ("SSS", "%3f", r"\d{3}"),
    ("YY", "%y", r"\d{2}"),
    ("MM", "%m", r"\d{2}"),
    ("DD", "%d", r"\d{2}"),
    ("HH", "%H", r"\d{2}"),
    ("mm", "%M", r"\d{2}"),
    ("ss", "%S", r"\d{2}"),
    ("ZZ", "%z", r"[+-]\d{2}:?\d{2}"),
    ("M", "%m", r"\d{1,2}"),
    ("D", "%d", r"\d{1,2}"),
    ("H", "%H", r"\d{1,2}"),
    ("m", "%M", r"\d{1,2}"),
    ("s", "%S", r"\d{1,2}"),
    ("Z", "%:z", r"[+-]\d{2}:?\d{2}"),
];

struct ChronoFormat {
    pattern: String,
    /// Anchored regex source; chrono alone lets `%d` read a single digit.
    shape: String,
    has_time: bool,
    has_offset: bool,
}

/// Translates a `YYYY-MM-DD HH:mm`-style format into a chrono format string.
/// Text inside `[...]` is copied literally.
fn translate(format: &str) -> ChronoFormat {
    let mut pattern = String::with_capacity(format.len() * 2);
    let mut shape = String::from("^");
    let mut has_time = false;
    let mut has_offset = false;
    let mut rest = format;
    while let Some(c) = rest.chars().next() {
        if c == '[' {
            let literal_end = rest.find(']').unwrap_or(rest.len());
            for literal in rest[1..literal_end].chars() {
                push_literal(&mut pattern, literal);
            }
            shape.push_str(&regex::escape(&rest[1..literal_end]));
            rest = rest.get(literal_end + 1..).unwrap_or_default();
            continue;
        }
        match TOKENS.iter().find(|(token, _, _)| rest.starts_with(token)) {
            Some((token, chrono, digits)) => {
                pattern.push_str(chrono);
                shape.push_str(digits);
                match token.chars().next() {
                    Some('H' | 'm' | 's' | 'S') => has_time = true,
                    Some('Z') => {
                        has_time = true;
                        has_offset = true;
                    }
                    _ => {}
                }
                rest = &rest[token.len()..];
            }
            None => {
                push_literal(&mut pattern, c);
                shape.push_str(&regex::escape(&rest[..c.len_utf8()]));
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    shape.push('$');
    ChronoFormat {
        pattern,
        shape,
        has_time,
        has_offset,
    }
}

fn push_literal(pattern: &mut String, c: char) {
    if c == '%' {
        pattern.push_str("%%");
    } else {
        pattern.push(c);
    }
}

fn parse_iso(value: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp_millis());
    }
    if let Some(parsed) = ISO_NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Some(parsed.and_utc().timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

/// Parses `value` strictly against one format and returns epoch milliseconds.
///
/// Values without an offset are read as UTC.
pub fn parse_date(value: &str, format: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if format == ISO_8601 {
        return parse_iso(value);
    }
    let translated = translate(format);
    if !Regex::new(&translated.shape).ok()?.is_match(value) {
        return None;
    }
    if translated.has_offset {
        DateTime::parse_from_str(value, &translated.pattern)
            .ok()
            .map(|parsed| parsed.timestamp_millis())
    } else if translated.has_time {
        NaiveDateTime::parse_from_str(value, &translated.pattern)
            .ok()
            .map(|parsed| parsed.and_utc().timestamp_millis())
    } else {
        let date = NaiveDate::parse_from_str(value, &translated.pattern).ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
    }
}

/// Tries each format in turn; the first that parses wins.
pub fn parse_any<S: AsRef<str>>(value: &str, formats: &[S]) -> Option<i64> {
    formats
        .iter()
        .find_map(|format| parse_date(value, format.as_ref()))
}

/// Parses with the default format list plus an optional pinned format.
pub fn parse_default(value: &str, pinned: Option<&str>) -> Option<i64> {
    parse_any(value, &DATE_FORMATS).or_else(|| pinned.and_then(|format| parse_date(value, format)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate() {
        assert_eq!(translate("YYYY-MM-DD HH:mm").pattern, "%Y-%m-%d %H:%M");
        assert_eq!(translate("D/M/YYYY").pattern, "%d/%m/%Y");
        assert_eq!(translate("YYYY-MM-DD HH:mm:Z").pattern, "%Y-%m-%d %H:%M:%:z");
        assert_eq!(translate("[Day] DD").pattern, "Day %d");
        assert!(translate("HH:mm").has_time);
        assert!(translate("YYYY ZZ").has_offset);
        assert_eq!(translate("DD.MM.YYYY").shape, r"^\d{2}\.\d{2}\.\d{4}$");
    }

    #[test]
    fn test_parse_formats() {
        let day = parse_date("2020-01-02", "YYYY-MM-DD").unwrap();
        assert_eq!(parse_date("02-01-2020", "DD-MM-YYYY"), Some(day));
        assert_eq!(parse_date("2.1.2020", "D.M.YYYY"), Some(day));
        assert_eq!(parse_date("2020-01-02", ISO_8601), Some(day));
        assert_eq!(
            parse_date("2020-01-02 01:00 +01:00", "YYYY-MM-DD HH:mm Z"),
            Some(day)
        );
        assert!(parse_date("2020-13-02", "YYYY-MM-DD").is_none());
        assert!(parse_date("2.2.2020", "DD.MM.YYYY").is_none());
        assert!(parse_date("02.2.2020", "DD.MM.YYYY").is_none());
        assert!(parse_date("02.02.2020", "DD.MM.YYYY").is_some());
        assert!(parse_date("2020-1-02", "YYYY-MM-DD").is_none());
        assert!(parse_date("2020-01-02 trailing", "YYYY-MM-DD").is_none());
        assert!(parse_date("", "YYYY-MM-DD").is_none());
    }

    #[test]
    fn test_parse_default_list() {
        assert!(parse_any("2020-01-02T10:00:00Z", &DATE_FORMATS).is_some());
        assert!(parse_any("31/12/1999", &DATE_FORMATS).is_some());
        assert!(parse_any("yesterday", &DATE_FORMATS).is_none());
        assert!(parse_default("1999|12", Some("YYYY|MM")).is_none());
        assert!(parse_default("1999 12 31", Some("YYYY MM DD")).is_some());
    }
}
