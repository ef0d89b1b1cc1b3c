//! Dynamic values exchanged between items, converters and the wire.
//!
//! [`Value`] plays the role of an item value on the application side and of a
//! decoded token on the device side. [`TargetType`] is the fixed catalogue of
//! types a converter can be asked to coerce a reply into.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A dynamically typed value.
///
/// Deserializes untagged, so device family tables can be written as plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    /// Raw bytes (never produced by JSON deserialization)
    Bytes(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Bytes(_) => "bytes",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Truthiness: empty containers, zero and `Null` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Dict(d) => !d.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
        }
    }

    /// Lower-case string values, leave everything else untouched.
    pub fn folded(&self) -> Value {
        match self {
            Self::Str(s) => Self::Str(s.to_lowercase()),
            other => other.clone(),
        }
    }

    /// Check whether this value already has the shape of `target`.
    pub fn satisfies(&self, target: TargetType) -> bool {
        match target {
            TargetType::Int => matches!(self, Self::Int(_)),
            TargetType::Num => matches!(self, Self::Float(_)),
            TargetType::Str => matches!(self, Self::Str(_)),
            TargetType::Dict => matches!(self, Self::Dict(_)),
            TargetType::List | TargetType::Tuple => matches!(self, Self::List(_)),
            TargetType::Bytes | TargetType::ByteArray => matches!(self, Self::Bytes(_)),
            // json decodes strings; anything else is already decoded
            TargetType::Json => !matches!(self, Self::Str(_) | Self::Bytes(_)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::List(_) | Self::Dict(_) => {
                let json: serde_json::Value = self.clone().into();
                write!(f, "{}", json)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(arr) => Self::List(arr.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(map) => {
                Self::Dict(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::List(l) => serde_json::Value::Array(l.into_iter().map(Into::into).collect()),
            Value::Dict(d) => {
                serde_json::Value::Object(d.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            Value::Bytes(b) => {
                serde_json::Value::Array(b.into_iter().map(serde_json::Value::from).collect())
            }
        }
    }
}

/// Fixed catalogue of coercion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Int,
    #[serde(alias = "float")]
    Num,
    Str,
    Dict,
    List,
    Tuple,
    Bytes,
    #[serde(rename = "bytearray")]
    ByteArray,
    Json,
}

impl TargetType {
    pub const ALL: [TargetType; 9] = [
        TargetType::Int,
        TargetType::Num,
        TargetType::Str,
        TargetType::Dict,
        TargetType::List,
        TargetType::Tuple,
        TargetType::Bytes,
        TargetType::ByteArray,
        TargetType::Json,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TargetType::Int => "int",
            TargetType::Num => "num",
            TargetType::Str => "str",
            TargetType::Dict => "dict",
            TargetType::List => "list",
            TargetType::Tuple => "tuple",
            TargetType::Bytes => "bytes",
            TargetType::ByteArray => "bytearray",
            TargetType::Json => "json",
        }
    }

    /// The value returned by a fail-silent coercion.
    pub fn neutral(&self) -> Value {
        match self {
            TargetType::Int => Value::Int(0),
            TargetType::Num => Value::Float(0.0),
            TargetType::Str => Value::Str(String::new()),
            TargetType::Dict => Value::Dict(BTreeMap::new()),
            TargetType::List | TargetType::Tuple => Value::List(Vec::new()),
            TargetType::Bytes | TargetType::ByteArray => Value::Bytes(Vec::new()),
            TargetType::Json => Value::Null,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for unknown target type names.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Unknown target type: {0}")]
pub struct UnknownTargetType(pub String);

impl FromStr for TargetType {
    type Err = UnknownTargetType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(TargetType::Int),
            "num" | "float" => Ok(TargetType::Num),
            "str" => Ok(TargetType::Str),
            "dict" => Ok(TargetType::Dict),
            "list" => Ok(TargetType::List),
            "tuple" => Ok(TargetType::Tuple),
            "bytes" => Ok(TargetType::Bytes),
            "bytearray" => Ok(TargetType::ByteArray),
            "json" => Ok(TargetType::Json),
            other => Err(UnknownTargetType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_deserialize_untagged() {
        let v: Value = serde_json::from_str(r#"{"a": [1, 2.5, "x", true, null]}"#).unwrap();
        let Value::Dict(map) = v else {
            panic!("expected dict");
        };
        assert_eq!(
            map["a"],
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Str("x".into()),
                Value::Bool(true),
                Value::Null,
            ])
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_folded_only_touches_strings() {
        assert_eq!(Value::from("CD").folded(), Value::from("cd"));
        assert_eq!(Value::Int(3).folded(), Value::Int(3));
    }

    #[test]
    fn test_target_type_parse() {
        assert_eq!("float".parse::<TargetType>().unwrap(), TargetType::Num);
        assert_eq!("bytearray".parse::<TargetType>().unwrap(), TargetType::ByteArray);
        assert!("bool".parse::<TargetType>().is_err());
    }

    #[test]
    fn test_neutral_values_satisfy_target() {
        for target in TargetType::ALL {
            if target == TargetType::Json {
                assert!(target.neutral().is_null());
                continue;
            }
            assert!(target.neutral().satisfies(target), "{}", target);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::from("ON").to_string(), "ON");
        assert_eq!(Value::List(vec![Value::Int(1)]).to_string(), "[1]");
    }
}
