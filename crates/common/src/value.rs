//! The values that can travel through the encryption and signing engines.
//!
//! Ciphers and MACs only see bytes. [`Value`] is the richer data model callers
//! hand in, and the value codec in `sealkit` appends a type tag so the exact
//! variant comes back out on the other side.

/// A plaintext value with its original type preserved.
///
/// Integers that do not fit in an `i64` are carried as [`Value::Text`] holding
/// their decimal representation, never truncated.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Arrays and objects, serialised as JSON by the codec.
    Structured(serde_json::Value),
}

impl Value {
    /// Short lowercase name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
            Value::Structured(_) => "structured",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string payload, if this is [`Value::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert into a JSON value for display or re-serialisation.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Structured(v) => v.clone(),
        }
    }
}

impl From<serde_json::Value> for Value {
    /// Scalars map onto their own variants; arrays and objects stay structured.
    ///
    /// JSON numbers outside the `i64` range that are still integral become
    /// [`Value::Text`] so no digits are lost.
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if n.is_u64() {
                    Value::Text(n.to_string())
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Structured(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_map_to_variants() {
        assert_eq!(Value::from(json!(null)), Value::Null);
        assert_eq!(Value::from(json!(true)), Value::Bool(true));
        assert_eq!(Value::from(json!(12345)), Value::Int(12345));
        assert_eq!(Value::from(json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(json!("hi")), Value::Text("hi".into()));
    }

    #[test]
    fn json_containers_stay_structured() {
        let v = Value::from(json!({"a": [1, 2]}));
        assert_eq!(v, Value::Structured(json!({"a": [1, 2]})));
        assert_eq!(v.type_name(), "structured");
    }

    #[test]
    fn oversized_unsigned_becomes_text() {
        let v = Value::from(json!(u64::MAX));
        assert_eq!(v, Value::Text(u64::MAX.to_string()));
    }

    #[test]
    fn option_none_is_null() {
        let v: Value = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: Value = Some("x").into();
        assert_eq!(v.as_str(), Some("x"));
    }

    #[test]
    fn structured_values_convert_back_to_json() {
        let v = Value::from(json!({"user": "alice", "n": 3}));
        assert_eq!(v.to_json(), json!({"n": 3, "user": "alice"}));
        assert_eq!(Value::Int(7).to_json(), json!(7));
    }
}
