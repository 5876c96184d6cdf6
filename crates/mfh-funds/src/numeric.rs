//! Tolerant conversion of scraped text into numbers.

use chrono::{Datelike, NaiveDate};
use serde_json::Value;

const STRIPPED: &[char] = &['₹', '$', '€', '£', ',', '%'];
const UNIT_SUFFIXES: &[&str] = &["crores", "crore", "cr.", "cr"];

/// Parses a display string such as `"₹1,23,456.7 Cr"` or `"-2.1%"`.
///
/// Returns `None` for anything that is not a finite number once currency
/// symbols, grouping commas, whitespace, percent signs and a trailing
/// crore unit are removed.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED.contains(c))
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();

    let lower = cleaned.to_ascii_lowercase();
    if let Some(unit) = UNIT_SUFFIXES.iter().find(|u| lower.ends_with(*u)) {
        cleaned.truncate(cleaned.len() - unit.len());
    }

    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Number carried by a JSON value, either natively or as display text.
pub fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d", "%d %b %Y", "%d %B %Y", "%b %d, %Y",
    "%d-%m-%y", "%d/%m/%y",
];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date = raw.trim().split('T').next()?.trim();
    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok())
        .find(|d| d.year() >= 1900)
}

/// Years elapsed between `inception` and `as_of`, rounded to two decimals.
pub fn age_in_years(inception: NaiveDate, as_of: NaiveDate) -> Option<f64> {
    let days = (as_of - inception).num_days();
    if days < 0 {
        return None;
    }
    Some(round2(days as f64 / 365.25))
}

pub fn age_from_inception(raw: &str, as_of: NaiveDate) -> Option<f64> {
    age_in_years(parse_date(raw)?, as_of)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_decorations() {
        assert_eq!(parse_number("₹1,23,456.78"), Some(123456.78));
        assert_eq!(parse_number(" 0.65 % "), Some(0.65));
        assert_eq!(parse_number("-2.10%"), Some(-2.1));
        assert_eq!(parse_number("\u{2212}3.5"), Some(-3.5));
        assert_eq!(parse_number("12,345 Cr"), Some(12345.0));
    }

    #[test]
    fn rejects_non_numbers() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("--"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn json_values() {
        assert_eq!(json_number(&json!(1.25)), Some(1.25));
        assert_eq!(json_number(&json!("1,000")), Some(1000.0));
        assert_eq!(json_number(&json!(null)), None);
        assert_eq!(json_number(&json!({"v": 1})), None);
    }

    #[test]
    fn fund_age_from_dates() {
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(age_from_inception("2014-01-01", as_of), Some(10.0));
        assert_eq!(age_from_inception("2014-01-01T00:00:00.000Z", as_of), Some(10.0));
        assert_eq!(age_from_inception("01/01/2019", as_of), Some(5.0));
        assert_eq!(age_from_inception("01-07-21", as_of), Some(2.5));
        assert_eq!(age_from_inception("2030-01-01", as_of), None);
        assert_eq!(age_from_inception("soon", as_of), None);
    }
}
