//! Text-to-typed-value coercion.
//!
//! Converts one raw field into a [`Value`] for a declared [`ColumnType`].
//! A field that is blank or spells a null token is null for every type; a
//! field that cannot be converted is also null, never an error.

use crate::constants::{
    DATE_FORMATS, DATETIME_FORMATS, FALSE_TOKENS, NULL_TOKENS, TRUE_TOKENS,
};
use crate::models::{ColumnType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Everything except digits and decimal point
static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.]").expect("numeric filter pattern is valid"));

/// Everything except digits, hyphen and slash
static NON_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9\-/]").expect("date filter pattern is valid"));

/// How unrecognised boolean text is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanPolicy {
    /// Unrecognised text becomes `false`
    #[default]
    Lenient,
    /// Unrecognised text becomes null
    Strict,
}

/// Field coercer configured once per import run
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCoercer {
    boolean_policy: BooleanPolicy,
}

impl ValueCoercer {
    pub fn new(boolean_policy: BooleanPolicy) -> Self {
        Self { boolean_policy }
    }

    /// Coerce `raw` into `column_type`; `None` means null
    pub fn coerce(&self, raw: &str, column_type: ColumnType) -> Option<Value> {
        let value = strip_wrapping_quotes(raw.trim()).trim();

        if is_null_token(value) {
            return None;
        }

        match column_type {
            ColumnType::Int16 => convert_to_int16(value).map(Value::Int16),
            ColumnType::Int32 => convert_to_int32(value).map(Value::Int32),
            ColumnType::Int64 => convert_to_int64(value).map(Value::Int64),
            ColumnType::Decimal => convert_to_decimal(value).map(Value::Decimal),
            ColumnType::Float => convert_to_float(value).map(Value::Float),
            ColumnType::Boolean => {
                convert_to_boolean(value, self.boolean_policy).map(Value::Boolean)
            }
            ColumnType::DateTime => convert_to_datetime(value).map(Value::DateTime),
            ColumnType::Char => convert_to_char(value).map(Value::Char),
            ColumnType::String => Some(Value::String(value.to_string())),
        }
    }
}

/// Blank text and the `null` / `(null)` tokens, case-insensitively
pub fn is_null_token(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || NULL_TOKENS.iter().any(|t| value.eq_ignore_ascii_case(t))
}

/// Remove one pair of surrounding double quotes
pub fn strip_wrapping_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

pub fn convert_to_int16(value: &str) -> Option<i16> {
    parse_integral(value).and_then(|n| i16::try_from(n).ok())
}

pub fn convert_to_int32(value: &str) -> Option<i32> {
    parse_integral(value).and_then(|n| i32::try_from(n).ok())
}

pub fn convert_to_int64(value: &str) -> Option<i64> {
    parse_integral(value).and_then(|n| i64::try_from(n).ok())
}

pub fn convert_to_decimal(value: &str) -> Option<f64> {
    parse_real(value)
}

pub fn convert_to_float(value: &str) -> Option<f64> {
    parse_real(value)
}

/// Match the boolean vocabulary; other text follows `policy`
pub fn convert_to_boolean(value: &str, policy: BooleanPolicy) -> Option<bool> {
    let value = value.trim();

    if TRUE_TOKENS.iter().any(|t| value.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSE_TOKENS.iter().any(|t| value.eq_ignore_ascii_case(t)) {
        Some(false)
    } else {
        match policy {
            BooleanPolicy::Lenient => Some(false),
            BooleanPolicy::Strict => None,
        }
    }
}

/// Parse a date-and-time, falling back to a date after dropping every
/// character that is not a digit, hyphen or slash.
pub fn convert_to_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }

    let stripped = NON_DATE.replace_all(value, "");
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&stripped, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Exactly one character, otherwise null
pub fn convert_to_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Keep a sign in first position, then only digits and decimal points
fn numeric_text(value: &str) -> String {
    let value = value.trim();
    let (negative, rest) = match value.chars().next() {
        Some('-') => (true, &value[1..]),
        Some('+') => (false, &value[1..]),
        _ => (false, value),
    };

    let digits = NON_NUMERIC.replace_all(rest, "");
    if negative {
        format!("-{}", digits)
    } else {
        digits.into_owned()
    }
}

/// Integer part of a numeric string, truncating any fraction
fn parse_integral(value: &str) -> Option<i128> {
    let cleaned = numeric_text(value);
    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (&cleaned[..], ""),
    };

    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let digits = whole.trim_start_matches('-');
    if digits.is_empty() {
        // ".5" is zero; "." and "-" are nothing
        return if fraction.is_empty() { None } else { Some(0) };
    }

    whole.parse::<i128>().ok()
}

fn parse_real(value: &str) -> Option<f64> {
    numeric_text(value)
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coercer() -> ValueCoercer {
        ValueCoercer::default()
    }

    #[test]
    fn test_null_tokens_for_every_type() {
        for column_type in ColumnType::ALL {
            for raw in ["", "   ", "null", "NULL", "(null)", "(NULL)", "\"\"", "\" \""] {
                assert_eq!(
                    coercer().coerce(raw, column_type),
                    None,
                    "{:?} should be null for {}",
                    raw,
                    column_type
                );
            }
        }
    }

    #[test]
    fn test_string_verbatim_after_trim() {
        assert_eq!(
            coercer().coerce("  \"Smith, John\"  ", ColumnType::String),
            Some(Value::String("Smith, John".to_string()))
        );
        assert_eq!(
            coercer().coerce("\"  Smith \"", ColumnType::String),
            Some(Value::String("Smith".to_string()))
        );
    }

    #[test]
    fn test_integers() {
        assert_eq!(convert_to_int32("42"), Some(42));
        assert_eq!(convert_to_int32("-17"), Some(-17));
        assert_eq!(convert_to_int32("+8"), Some(8));
        assert_eq!(convert_to_int32("1,234"), Some(1234));
        assert_eq!(convert_to_int32("$99"), Some(99));
        assert_eq!(convert_to_int32("12.9"), Some(12));
        assert_eq!(convert_to_int32(".5"), Some(0));
        assert_eq!(convert_to_int32("abc"), None);
        assert_eq!(convert_to_int32("1-2"), Some(12));
        assert_eq!(convert_to_int32("5-"), Some(5));
        assert_eq!(convert_to_int32("-$1,200"), Some(-1200));
        assert_eq!(convert_to_int64("555-1234"), Some(5551234));
        assert_eq!(convert_to_int64("+44 (0)20-7946-0018"), Some(4402079460018));
        assert_eq!(convert_to_int32("1.2.3"), None);
    }

    #[test]
    fn test_integer_overflow_is_null() {
        assert_eq!(convert_to_int16("32767"), Some(i16::MAX));
        assert_eq!(convert_to_int16("32768"), None);
        assert_eq!(convert_to_int32("2147483648"), None);
        assert_eq!(convert_to_int64("9223372036854775807"), Some(i64::MAX));
        assert_eq!(convert_to_int64("9223372036854775808"), None);
        assert_eq!(convert_to_int64("99999999999999999999999999999999999999999"), None);
    }

    #[test]
    fn test_decimal_strips_currency() {
        assert_eq!(convert_to_decimal("$1,234.56"), Some(1234.56));
        assert_eq!(convert_to_decimal("-0.5"), Some(-0.5));
        assert_eq!(convert_to_decimal("12%"), Some(12.0));
        assert_eq!(convert_to_decimal("n/a"), None);
        assert_eq!(convert_to_decimal("1-2"), Some(12.0));
        assert_eq!(convert_to_decimal("-$3.5-"), Some(-3.5));
        assert_eq!(
            coercer().coerce("\"$1,234.56\"", ColumnType::Decimal),
            Some(Value::Decimal(1234.56))
        );
    }

    #[test]
    fn test_float() {
        assert_eq!(convert_to_float("3.25"), Some(3.25));
        assert_eq!(
            coercer().coerce("7", ColumnType::Float),
            Some(Value::Float(7.0))
        );
    }

    #[test]
    fn test_boolean_vocabulary() {
        assert_eq!(convert_to_boolean("YES", BooleanPolicy::Lenient), Some(true));
        assert_eq!(convert_to_boolean("True", BooleanPolicy::Lenient), Some(true));
        assert_eq!(convert_to_boolean("1", BooleanPolicy::Lenient), Some(true));
        assert_eq!(convert_to_boolean("no", BooleanPolicy::Lenient), Some(false));
        assert_eq!(convert_to_boolean("FALSE", BooleanPolicy::Lenient), Some(false));
        assert_eq!(convert_to_boolean("0", BooleanPolicy::Lenient), Some(false));
    }

    #[test]
    fn test_boolean_unknown_falls_back_to_false() {
        // Unrecognised text is false under the default policy
        assert_eq!(convert_to_boolean("maybe", BooleanPolicy::Lenient), Some(false));
        assert_eq!(
            coercer().coerce("maybe", ColumnType::Boolean),
            Some(Value::Boolean(false))
        );
    }

    #[test]
    fn test_boolean_strict_policy() {
        let strict = ValueCoercer::new(BooleanPolicy::Strict);
        assert_eq!(strict.coerce("maybe", ColumnType::Boolean), None);
        assert_eq!(
            strict.coerce("yes", ColumnType::Boolean),
            Some(Value::Boolean(true))
        );
    }

    #[test]
    fn test_datetime_with_time() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 15)
            .unwrap();
        assert_eq!(convert_to_datetime("2023-01-02 09:30:15"), Some(expected));
        assert_eq!(convert_to_datetime("2023-01-02T09:30:15"), Some(expected));
        assert_eq!(convert_to_datetime("01/02/2023 09:30:15"), Some(expected));
        assert_eq!(convert_to_datetime("2023-01-02T09:30:15Z"), Some(expected));
    }

    #[test]
    fn test_datetime_date_only_after_stripping() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(convert_to_datetime("2024-02-29"), Some(expected));
        assert_eq!(convert_to_datetime("2024/02/29"), Some(expected));
        assert_eq!(convert_to_datetime("02/29/2024"), Some(expected));
        assert_eq!(convert_to_datetime("Date: 2024-02-29."), Some(expected));
    }

    #[test]
    fn test_datetime_invalid_is_null() {
        assert_eq!(convert_to_datetime("2023-02-30"), None);
        assert_eq!(convert_to_datetime("yesterday"), None);
        assert_eq!(coercer().coerce("not a date", ColumnType::DateTime), None);
    }

    #[test]
    fn test_char() {
        assert_eq!(convert_to_char("Y"), Some('Y'));
        assert_eq!(convert_to_char("é"), Some('é'));
        assert_eq!(convert_to_char("YN"), None);
        assert_eq!(
            coercer().coerce(" \"N\" ", ColumnType::Char),
            Some(Value::Char('N'))
        );
    }

    #[test]
    fn test_strip_wrapping_quotes() {
        assert_eq!(strip_wrapping_quotes("\"abc\""), "abc");
        assert_eq!(strip_wrapping_quotes("\"abc"), "\"abc");
        assert_eq!(strip_wrapping_quotes("\""), "\"");
        assert_eq!(strip_wrapping_quotes("\"\"x\"\""), "\"x\"");
    }
}
