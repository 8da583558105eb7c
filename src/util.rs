// Utility helpers for cell parsing, key normalisation and numeric access.
//
// Snapshot cells arrive as loosely typed JSON/CSV values. Everything that
// needs a number or a join key goes through here so the algorithms can work
// with plain `f64` and `String` keys.
use crate::error::{ImputationError, Result};
use crate::types::Record;
use num_format::{Locale, ToFormattedString};
use serde_json::Value;

/// Parse a raw CSV cell into a JSON value.
///
/// - Empty cells become `Null`.
/// - Whole numbers become integers, other numerics (exponent form included)
///   become floats.
/// - Everything else, `inf` and `nan` among it, is kept as text.
pub fn parse_cell(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::from(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => number_value(f),
        _ => Value::String(s.to_string()),
    }
}

/// Render a value back into a CSV cell.
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wrap an `f64` as a JSON number. Non-finite values have no JSON form and
/// become `Null`.
pub fn number_value(n: f64) -> Value {
    Value::from(n)
}

fn normalise_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Canonical string form of a cell used for joins and period filters, so
/// that `14`, `14.0` and `"14"` all compare equal.
pub fn key_of(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => normalise_number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() => normalise_number(f),
                _ => s.to_string(),
            }
        }
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("text '{}'", s),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

/// Read a numeric cell. A missing column is a key error; anything that is
/// not a JSON number (including `null`) is a type error.
pub fn numeric(record: &Record, column: &str, stage: &'static str) -> Result<f64> {
    match optional_numeric(record, column, stage)? {
        Some(n) => Ok(n),
        None => Err(ImputationError::TypeMismatch {
            stage,
            column: column.to_string(),
            found: "null".to_string(),
        }),
    }
}

/// Like [`numeric`] but lets `null` through as `None`.
pub fn optional_numeric(record: &Record, column: &str, stage: &'static str) -> Result<Option<f64>> {
    match record.get(column) {
        None => Err(ImputationError::missing_column(stage, column)),
        Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(other) => Err(ImputationError::TypeMismatch {
            stage,
            column: column.to_string(),
            found: describe(other),
        }),
    }
}

/// Round half to even ("banker's rounding"): 2.5 -> 2, 3.5 -> 4.
pub fn round_half_even(n: f64) -> f64 {
    n.round_ties_even()
}

pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_parse_into_typed_values() {
        assert_eq!(parse_cell(" 42 "), json!(42));
        assert_eq!(parse_cell("0.25"), json!(0.25));
        assert_eq!(parse_cell("L"), json!("L"));
        assert_eq!(parse_cell(""), Value::Null);
    }

    #[test]
    fn exponent_cells_are_numbers() {
        assert_eq!(parse_cell("1e-7"), json!(1e-7));
        assert_eq!(parse_cell("1e+20"), json!(1e20));
        assert_eq!(parse_cell("-2.5E3"), json!(-2500.0));
        assert_eq!(parse_cell("inf"), json!("inf"));
        assert_eq!(parse_cell("NaN"), json!("NaN"));
        assert_eq!(key_of(&json!("1e+20")), key_of(&json!(1e20)));
        assert_eq!(key_of(&json!("nan")), "nan");
    }

    #[test]
    fn keys_ignore_numeric_representation() {
        assert_eq!(key_of(&json!(14)), key_of(&json!(14.0)));
        assert_eq!(key_of(&json!(14)), key_of(&json!("14")));
        assert_ne!(key_of(&json!(14)), key_of(&json!(15)));
        assert_eq!(key_of(&json!("M")), "M");
    }

    #[test]
    fn numeric_distinguishes_missing_from_wrong_type() {
        let record: Record = json!({"Q1": 3, "name": "x", "gap": null})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(numeric(&record, "Q1", "test").unwrap(), 3.0);
        assert!(matches!(
            numeric(&record, "Q2", "test"),
            Err(ImputationError::SchemaMismatch { .. })
        ));
        assert!(matches!(
            numeric(&record, "name", "test"),
            Err(ImputationError::TypeMismatch { .. })
        ));
        assert!(matches!(
            numeric(&record, "gap", "test"),
            Err(ImputationError::TypeMismatch { .. })
        ));
        assert_eq!(optional_numeric(&record, "gap", "test").unwrap(), None);
    }

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(3.5), 4.0);
        assert_eq!(round_half_even(-2.5), -2.0);
        assert_eq!(round_half_even(2.6), 3.0);
    }

    #[test]
    fn formats_with_separators() {
        assert_eq!(format_int(9855), "9,855");
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-0.5, 2), "-0.50");
    }
}
