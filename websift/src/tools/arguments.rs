//! Lenient accessors over a tool call's JSON arguments.

use serde_json::{Map, Value};

use crate::errors::{Result, WebsiftError};

/// A view over the argument object of one tool call.
///
/// Integers may arrive as JSON numbers or numeric strings, flags as booleans,
/// numbers or the usual textual spellings. Anything else is an input error.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Arguments<'a> {
    /// Wraps a call's arguments. `null` is treated as an empty object.
    pub fn parse(value: &'a Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self { map: None }),
            Value::Object(map) => Ok(Self { map: Some(map) }),
            other => Err(WebsiftError::invalid_input(format!(
                "arguments must be an object, got {}",
                type_name(other)
            ))),
        }
    }

    /// The raw value for `key`, treating `null` as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map?.get(key).filter(|v| !v.is_null())
    }

    /// A trimmed, non-empty string argument.
    ///
    /// Non-string scalars are stringified.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        let text = match self.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// An integer argument, or `default` when absent.
    pub fn int(&self, key: &str, default: i64) -> Result<i64> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        let parsed = match value {
            Value::Number(n) => n.as_i64().or_else(|| whole_f64(n.as_f64()?)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| WebsiftError::invalid_input(format!("{key} must be an integer")))
    }

    /// A non-negative count; negative inputs become zero.
    pub fn count(&self, key: &str, default: usize) -> Result<usize> {
        let default = i64::try_from(default).unwrap_or(i64::MAX);
        Ok(usize::try_from(self.int(key, default)?.max(0)).unwrap_or(usize::MAX))
    }

    /// A boolean argument, or `default` when absent.
    pub fn flag(&self, key: &str, default: bool) -> Result<bool> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f.abs() > 0.0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" | "" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed.ok_or_else(|| WebsiftError::invalid_input(format!("{key} must be a boolean")))
    }

    /// The whole argument object, for typed deserialization.
    #[must_use]
    pub fn to_value(&self) -> Value {
        self.map.map_or_else(|| Value::Object(Map::new()), |m| Value::Object(m.clone()))
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
fn whole_f64(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then(|| f as i64)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The error object returned when a required argument is missing.
#[must_use]
pub fn missing(key: &str) -> Value {
    serde_json::json!({ "error": format!("{key} is required") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_empty() {
        let value = Value::Null;
        let args = Arguments::parse(&value).unwrap();
        assert_eq!(args.text("query"), None);
        assert_eq!(args.int("n", 7).unwrap(), 7);
    }

    #[test]
    fn test_non_object_rejected() {
        let value = json!([1, 2]);
        let err = Arguments::parse(&value).unwrap_err();
        assert!(err.is_input_error());
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_text_trims_and_rejects_blank() {
        let value = json!({"query": "  rust  ", "blank": "   ", "num": 5});
        let args = Arguments::parse(&value).unwrap();
        assert_eq!(args.text("query").as_deref(), Some("rust"));
        assert_eq!(args.text("blank"), None);
        assert_eq!(args.text("num").as_deref(), Some("5"));
    }

    #[test]
    fn test_int_accepts_numbers_and_numeric_strings() {
        let value = json!({"a": 3, "b": "12", "c": 4.0, "d": "many", "e": 2.5, "f": null});
        let args = Arguments::parse(&value).unwrap();
        assert_eq!(args.int("a", 0).unwrap(), 3);
        assert_eq!(args.int("b", 0).unwrap(), 12);
        assert_eq!(args.int("c", 0).unwrap(), 4);
        assert_eq!(args.int("f", 9).unwrap(), 9);
        assert!(args.int("d", 0).is_err());
        assert!(args.int("e", 0).is_err());
    }

    #[test]
    fn test_count_floors_negatives() {
        let value = json!({"n": -4});
        let args = Arguments::parse(&value).unwrap();
        assert_eq!(args.count("n", 1).unwrap(), 0);
        assert_eq!(args.count("absent", 50).unwrap(), 50);
    }

    #[test]
    fn test_flag_spellings() {
        let value = json!({"a": false, "b": "yes", "c": 0, "d": "maybe"});
        let args = Arguments::parse(&value).unwrap();
        assert!(!args.flag("a", true).unwrap());
        assert!(args.flag("b", false).unwrap());
        assert!(!args.flag("c", true).unwrap());
        assert!(args.flag("absent", true).unwrap());
        assert!(args.flag("d", true).is_err());
    }

    #[test]
    fn test_missing_shape() {
        assert_eq!(missing("url"), json!({"error": "url is required"}));
    }
}
