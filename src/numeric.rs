//! Locale-tolerant numeric normalization.
//!
//! Cells arrive as currency strings (`"₺1.234,56"`), percentages (`"35%"`),
//! plain numbers, or nothing at all. [`normalize_numeric`] collapses all of
//! them into a finite `f64`, yielding `0.0` whenever the input cannot be read.
//!
//! Separator rules:
//!
//! - both `.` and `,` present: whichever occurs last is the decimal separator
//!   and the other is dropped as a thousands separator;
//! - only `,` present: every `,` becomes `.` (so `"1,234"` reads as `1.234`);
//! - the remaining text is read like a float prefix, so trailing garbage is
//!   ignored and a second `.` ends the number.

use crate::data::Value;

const STRIPPED_SYMBOLS: &[char] = &['₺', '$', '€', '%'];

pub fn normalize_numeric(value: &Value) -> f64 {
    match value {
        Value::Empty | Value::Bool(_) => 0.0,
        Value::Number(n) if n.is_finite() => *n,
        Value::Number(_) => 0.0,
        Value::Text(s) => normalize_str(s),
    }
}

pub fn normalize_str(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED_SYMBOLS.contains(c))
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    let canonical = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        _ => cleaned.replace(',', "."),
    };
    parse_float_prefix(&canonical).unwrap_or(0.0)
}

/// Reads the longest leading float literal (`[+-]digits[.digits][e[+-]digits]`).
fn parse_float_prefix(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut end = 0usize;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut cursor = frac_start;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        digits += cursor - frac_start;
        end = cursor;
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut cursor = end + 1;
        if cursor < bytes.len() && matches!(bytes[cursor], b'+' | b'-') {
            cursor += 1;
        }
        let exp_start = cursor;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        if cursor > exp_start {
            end = cursor;
        }
    }
    text[..end]
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_prefix_ignores_trailing_text() {
        assert_eq!(parse_float_prefix("12abc"), Some(12.0));
        assert_eq!(parse_float_prefix("1.2.3"), Some(1.2));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("5."), Some(5.0));
        assert_eq!(parse_float_prefix("2e3x"), Some(2000.0));
        assert_eq!(parse_float_prefix("2e"), Some(2.0));
        assert_eq!(parse_float_prefix("-"), None);
        assert_eq!(parse_float_prefix("abc"), None);
    }

    #[test]
    fn booleans_and_non_finite_numbers_normalize_to_zero() {
        assert_eq!(normalize_numeric(&Value::Bool(true)), 0.0);
        assert_eq!(normalize_numeric(&Value::Number(f64::NAN)), 0.0);
        assert_eq!(normalize_numeric(&Value::Number(f64::INFINITY)), 0.0);
        assert_eq!(normalize_str("1e400"), 0.0);
    }
}
