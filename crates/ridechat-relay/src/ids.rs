//! Lenient parsing of externally supplied numeric identifiers.

use serde_json::Value;

/// Interpret a JSON value as a strictly positive integer id.
///
/// Accepts JSON integers, integral floats (`42.0`) and numeric strings
/// (`"42"`). Anything else, including zero and negatives, yields `None`.
pub fn positive_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation)]
                    let i = f as i64;
                    i
                })
        })?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (id > 0).then_some(id)
}
