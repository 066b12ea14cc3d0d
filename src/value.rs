//! Typed message values and the marshaller between host and script values.
//!
//! Host messages carry a small tagged union (integer, float, symbol). Rhai works
//! with `Dynamic`. The conversions here are pure: they never fail with an error,
//! a script value that has no host representation simply marshals to `None`.

use std::fmt;

use rhai::{Array, Dynamic, FLOAT, INT};
use serde::{Deserialize, Serialize};

/// A value crossing the host/script boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    Symbol(String),
}

impl TypedValue {
    /// Parse a textual atom the way a message box would: integers first,
    /// then floats, anything else is a symbol.
    pub fn parse_atom(text: &str) -> Self {
        if let Ok(value) = text.parse::<i64>() {
            return Self::Int(value);
        }
        // "inf" and "nan" parse as f64 but are symbols for a host.
        if text.chars().any(|c| c.is_ascii_digit()) {
            if let Ok(value) = text.parse::<f64>() {
                return Self::Float(value);
            }
        }
        Self::Symbol(text.to_string())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Symbol(_) => "symbol",
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::Symbol(value) => f.write_str(value),
        }
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        Self::Symbol(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        Self::Symbol(value)
    }
}

/// Host value -> script value.
pub fn to_script(value: &TypedValue) -> Dynamic {
    match value {
        TypedValue::Int(value) => Dynamic::from_int(*value as INT),
        TypedValue::Float(value) => Dynamic::from_float(*value as FLOAT),
        TypedValue::Symbol(value) => Dynamic::from(value.clone()),
    }
}

pub fn to_script_args(values: &[TypedValue]) -> Vec<Dynamic> {
    values.iter().map(to_script).collect()
}

/// Host values -> a script array, in order.
pub fn to_script_array(values: &[TypedValue]) -> Array {
    values.iter().map(to_script).collect()
}

/// Script value -> host value. Anything that is neither a number nor a
/// string (unit, bool, arrays, maps, host objects) has no host form.
pub fn to_host(value: &Dynamic) -> Option<TypedValue> {
    if let Ok(value) = value.as_int() {
        return Some(TypedValue::Int(value as i64));
    }
    if let Ok(value) = value.as_float() {
        return Some(TypedValue::Float(value as f64));
    }
    if value.is_string() {
        return value.clone().into_string().ok().map(TypedValue::Symbol);
    }
    if let Ok(ch) = value.as_char() {
        return Some(TypedValue::Symbol(ch.to_string()));
    }
    None
}

/// Stringify a script value for logging. Never panics; values without a
/// host form fall back to a readable rendering.
pub fn stringify(value: &Dynamic) -> String {
    if let Some(host) = to_host(value) {
        return host.to_string();
    }

    if let Some(arr) = value.clone().try_cast::<Array>() {
        let parts: Vec<String> = arr.iter().map(stringify).collect();
        return parts.join(" ");
    }

    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let parts: Vec<String> = map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, stringify(v)))
            .collect();
        return format!("{{{}}}", parts.join(", "));
    }

    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }

    if value.is_unit() {
        return "()".to_string();
    }

    value.to_string()
}

/// Stringify every argument and join them with single spaces.
pub fn join_for_log(args: &[Dynamic]) -> String {
    args.iter().map(stringify).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atom() {
        assert_eq!(TypedValue::parse_atom("42"), TypedValue::Int(42));
        assert_eq!(TypedValue::parse_atom("-3"), TypedValue::Int(-3));
        assert_eq!(TypedValue::parse_atom("2.5"), TypedValue::Float(2.5));
        assert_eq!(TypedValue::parse_atom("foo"), TypedValue::from("foo"));
        assert_eq!(TypedValue::parse_atom("nan"), TypedValue::from("nan"));
        assert_eq!(TypedValue::parse_atom("inf"), TypedValue::from("inf"));
    }

    #[test]
    fn test_to_script_preserves_type() {
        assert_eq!(to_script(&TypedValue::Int(7)).as_int(), Ok(7));
        assert_eq!(to_script(&TypedValue::Float(2.5)).as_float(), Ok(2.5));
        let sym = to_script(&TypedValue::from("héllo"));
        assert!(sym.is_string());
        assert_eq!(sym.into_string().unwrap(), "héllo");
    }

    #[test]
    fn test_to_host_numbers_and_strings() {
        assert_eq!(to_host(&Dynamic::from(3_i64)), Some(TypedValue::Int(3)));
        assert_eq!(to_host(&Dynamic::from(0.25_f64)), Some(TypedValue::Float(0.25)));
        assert_eq!(to_host(&Dynamic::from("abc")), Some(TypedValue::from("abc")));
        assert_eq!(to_host(&Dynamic::from('x')), Some(TypedValue::from("x")));
    }

    #[test]
    fn test_to_host_drops_other_values() {
        assert_eq!(to_host(&Dynamic::UNIT), None);
        assert_eq!(to_host(&Dynamic::from(true)), None);
        assert_eq!(to_host(&Dynamic::from(Array::new())), None);
        assert_eq!(to_host(&Dynamic::from(rhai::Map::new())), None);
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&Dynamic::from("hello")), "hello");
        assert_eq!(stringify(&Dynamic::from(42_i64)), "42");
        assert_eq!(stringify(&Dynamic::from(true)), "true");
        assert_eq!(stringify(&Dynamic::UNIT), "()");

        let mut arr = Array::new();
        arr.push(Dynamic::from("energy"));
        arr.push(Dynamic::from(0.5_f64));
        assert_eq!(stringify(&Dynamic::from(arr)), "energy 0.5");
    }

    #[test]
    fn test_join_for_log() {
        let args = vec![Dynamic::from("a"), Dynamic::from(1_i64), Dynamic::from(2.5_f64)];
        assert_eq!(join_for_log(&args), "a 1 2.5");
        assert_eq!(join_for_log(&[]), "");
    }

    #[test]
    fn test_untagged_serde() {
        let values: Vec<TypedValue> = serde_json::from_str(r#"[1, 2.5, "foo"]"#).unwrap();
        assert_eq!(
            values,
            vec![TypedValue::Int(1), TypedValue::Float(2.5), TypedValue::from("foo")]
        );
    }
}
