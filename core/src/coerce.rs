//! Lenient readers for externally sourced JSON (persisted graphs, legacy group records).
//!
//! Nothing here fails: malformed input yields `None` or a neutral value and the
//! caller decides whether that drops a record.

use serde_json::Value as Json;

/// String form of a scalar, the way the editor stringifies ids.
///
/// Strings pass through, numbers drop a zero fractional part (`123.0` -> `"123"`),
/// booleans become `"true"`/`"false"`. Null, arrays and objects have no string form.
pub fn scalar_to_string(raw: &Json) -> Option<String> {
    match raw {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().map(number_to_string),
        },
        Json::Bool(b) => Some(b.to_string()),
        Json::Null | Json::Array(_) | Json::Object(_) => None,
    }
}

/// Integral floats print without a fraction; everything else uses Rust's shortest form.
pub fn number_to_string(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Trimmed scalar string form; `None` when it is empty after trimming.
pub fn non_empty_id(raw: &Json) -> Option<String> {
    scalar_to_string(raw)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Only a genuine non-empty string counts as a reference; coerced scalars never do.
pub fn string_reference(raw: Option<&Json>) -> Option<String> {
    match raw {
        Some(Json::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// `true` only for a JSON `true`.
pub fn flag(raw: Option<&Json>) -> bool {
    matches!(raw, Some(Json::Bool(true)))
}

/// A boolean when one is present, `None` for anything else.
pub fn optional_bool(raw: Option<&Json>) -> Option<bool> {
    raw.and_then(Json::as_bool)
}

/// String field or empty.
pub fn string_or_empty(raw: Option<&Json>) -> String {
    raw.and_then(Json::as_str).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&json!("g1")), Some("g1".to_string()));
        assert_eq!(scalar_to_string(&json!(123)), Some("123".to_string()));
        assert_eq!(scalar_to_string(&json!(123.0)), Some("123".to_string()));
        assert_eq!(scalar_to_string(&json!(1.5)), Some("1.5".to_string()));
        assert_eq!(scalar_to_string(&json!(false)), Some("false".to_string()));
        assert_eq!(scalar_to_string(&json!(null)), None);
        assert_eq!(scalar_to_string(&json!({"id": 1})), None);
    }

    #[test]
    fn test_non_empty_id_trims() {
        assert_eq!(non_empty_id(&json!("  n1 ")), Some("n1".to_string()));
        assert_eq!(non_empty_id(&json!("   ")), None);
        assert_eq!(non_empty_id(&json!(0)), Some("0".to_string()));
    }

    #[test]
    fn test_string_reference_rejects_scalars() {
        assert_eq!(string_reference(Some(&json!("parent"))), Some("parent".to_string()));
        assert_eq!(string_reference(Some(&json!(0))), None);
        assert_eq!(string_reference(Some(&json!(""))), None);
        assert_eq!(string_reference(Some(&json!(null))), None);
        assert_eq!(string_reference(None), None);
    }

    #[test]
    fn test_flags() {
        assert!(flag(Some(&json!(true))));
        assert!(!flag(Some(&json!("true"))));
        assert!(!flag(None));
        assert_eq!(optional_bool(Some(&json!(false))), Some(false));
        assert_eq!(optional_bool(Some(&json!(1))), None);
    }
}
