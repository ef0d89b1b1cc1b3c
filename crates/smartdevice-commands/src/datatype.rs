//! Datatype converters.
//!
//! A [`Datatype`] maps a logical value to its wire representation and back.
//! The set of converters is closed: every name a device family table may use
//! resolves through [`builtin_kind`] or a family catalogue (see
//! [`crate::family`]) to a [`DatatypeKind`].

use smartdevice_core::{TargetType, Value};

use crate::error::ConversionError;

type Result<T> = std::result::Result<T, ConversionError>;

/// Converter behaviour.
#[derive(Debug, Clone, PartialEq)]
pub enum DatatypeKind {
    /// Pass-through
    Raw,
    Bool,
    /// `true` ⇄ `1`, `false` ⇄ `0`
    ZeroOrOne,
    Int,
    Num,
    Str,
    Dict,
    List,
    Tuple,
    Bytes,
    /// Values travel as JSON text
    Json,
    /// Integers travel as upper-case hex strings
    Hex,
    /// Booleans travel as two fixed tokens
    OnOff { on: String, off: String },
    /// Numbers travel as integers multiplied by `factor`
    Scaled { factor: f64 },
    /// Numbers travel as zero-padded step counts: `wire = (value - offset) / step`
    Stepped { offset: f64, step: f64, width: usize },
    /// Two digits for whole units, a trailing `5` for half units (`50.5` ⇄ `"505"`).
    /// Covers 0 to 99.5.
    HalfStepVolume,
    /// Text travels hex-packed, two hex digits per byte
    HexText,
}

impl DatatypeKind {
    pub fn on_off(on: &str, off: &str) -> Self {
        Self::OnOff {
            on: on.to_string(),
            off: off.to_string(),
        }
    }
}

type KindCtor = fn() -> DatatypeKind;

/// Built-in converter catalogue.
const BUILTIN: &[(&str, KindCtor)] = &[
    ("raw", || DatatypeKind::Raw),
    ("bool", || DatatypeKind::Bool),
    ("0or1", || DatatypeKind::ZeroOrOne),
    ("int", || DatatypeKind::Int),
    ("num", || DatatypeKind::Num),
    ("str", || DatatypeKind::Str),
    ("dict", || DatatypeKind::Dict),
    ("list", || DatatypeKind::List),
    ("tuple", || DatatypeKind::Tuple),
    ("bytes", || DatatypeKind::Bytes),
    ("json", || DatatypeKind::Json),
    ("hex", || DatatypeKind::Hex),
    ("onoff", || DatatypeKind::on_off("ON", "OFF")),
];

/// Resolve a built-in converter name.
pub fn builtin_kind(name: &str) -> Option<DatatypeKind> {
    BUILTIN
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ctor)| ctor())
}

/// Names of all built-in converters.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN.iter().map(|(n, _)| *n)
}

/// One converter instance, owned by exactly one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Datatype {
    name: String,
    kind: DatatypeKind,
    fail_silent: bool,
}

impl Datatype {
    pub fn new(name: impl Into<String>, kind: DatatypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fail_silent: true,
        }
    }

    /// The pass-through converter.
    pub fn raw() -> Self {
        Self::new("raw", DatatypeKind::Raw)
    }

    /// Propagate coercion errors instead of returning neutral values.
    pub fn strict(mut self) -> Self {
        self.fail_silent = false;
        self
    }

    pub fn with_fail_silent(mut self, fail_silent: bool) -> Self {
        self.fail_silent = fail_silent;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &DatatypeKind {
        &self.kind
    }

    pub fn is_fail_silent(&self) -> bool {
        self.fail_silent
    }

    /// Logical value to wire value.
    pub fn to_wire(&self, value: &Value) -> Result<Value> {
        match &self.kind {
            DatatypeKind::Raw => Ok(value.clone()),
            DatatypeKind::Bool => Ok(Value::Bool(value.is_truthy())),
            DatatypeKind::ZeroOrOne => Ok(Value::Int(i64::from(value.is_truthy()))),
            DatatypeKind::Int => coerce(value, TargetType::Int),
            DatatypeKind::Num => coerce(value, TargetType::Num),
            DatatypeKind::Str => coerce(value, TargetType::Str),
            DatatypeKind::Dict => coerce(value, TargetType::Dict),
            DatatypeKind::List => coerce(value, TargetType::List),
            DatatypeKind::Tuple => coerce(value, TargetType::Tuple),
            DatatypeKind::Bytes => coerce(value, TargetType::Bytes),
            DatatypeKind::Json => {
                let json: serde_json::Value = value.clone().into();
                Ok(Value::Str(json.to_string()))
            }
            DatatypeKind::Hex => match value {
                Value::Bytes(bytes) => Ok(Value::Str(hex::encode_upper(bytes))),
                other => {
                    let n = self.number(other)?;
                    if n < 0.0 {
                        return Err(ConversionError::invalid(&self.name, other, "negative"));
                    }
                    Ok(Value::Str(format!("{:02X}", n as i64)))
                }
            },
            DatatypeKind::OnOff { on, off } => Ok(Value::Str(if value.is_truthy() {
                on.clone()
            } else {
                off.clone()
            })),
            DatatypeKind::Scaled { factor } => {
                let n = self.number(value)?;
                Ok(Value::Int((n * factor).round() as i64))
            }
            DatatypeKind::Stepped {
                offset,
                step,
                width,
            } => {
                let n = self.number(value)?;
                let steps = ((n - offset) / step).round() as i64;
                if steps < 0 {
                    return Err(ConversionError::invalid(&self.name, value, "below scale"));
                }
                Ok(Value::Str(format!("{:0width$}", steps, width = *width)))
            }
            DatatypeKind::HalfStepVolume => {
                let n = self.number(value)?;
                if n < 0.0 {
                    return Err(ConversionError::invalid(&self.name, value, "negative"));
                }
                // Three wire digits mean a half step, so whole units stop at 99
                if n >= 100.0 {
                    return Err(ConversionError::invalid(&self.name, value, "above 99.5"));
                }
                let halves = (n * 2.0).round() as i64;
                if halves % 2 == 1 {
                    Ok(Value::Str(format!("{:02}5", halves / 2)))
                } else {
                    Ok(Value::Str(format!("{:02}", halves / 2)))
                }
            }
            DatatypeKind::HexText => Ok(Value::Str(hex::encode_upper(value.to_string()))),
        }
    }

    /// Wire value to logical value.
    ///
    /// Without `expected` the converter's natural type is returned and any
    /// failure is an error. With `expected`, a value that does not already
    /// have that shape is coerced; failures yield the target's neutral value
    /// unless the converter is strict.
    pub fn from_wire(&self, data: &Value, expected: Option<TargetType>) -> Result<Value> {
        let Some(target) = expected else {
            return self.natural(data);
        };

        let converted = self
            .natural(data)
            .and_then(|natural| {
                if natural.satisfies(target) {
                    Ok(natural)
                } else {
                    coerce(&natural, target)
                }
            });

        match converted {
            Ok(value) => Ok(value),
            Err(e) if self.fail_silent => {
                tracing::debug!(
                    "Datatype '{}' returning neutral {} for '{}': {}",
                    self.name,
                    target,
                    data,
                    e
                );
                Ok(target.neutral())
            }
            Err(e) => Err(e),
        }
    }

    fn natural(&self, data: &Value) -> Result<Value> {
        match &self.kind {
            DatatypeKind::Raw => Ok(data.clone()),
            DatatypeKind::Bool => parse_bool(data)
                .map(Value::Bool)
                .ok_or_else(|| ConversionError::invalid(&self.name, data, "not a boolean")),
            DatatypeKind::ZeroOrOne => match data {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                other => coerce(other, TargetType::Int).map(|v| Value::Bool(v.is_truthy())),
            },
            DatatypeKind::Int => coerce(data, TargetType::Int),
            DatatypeKind::Num => coerce(data, TargetType::Num),
            DatatypeKind::Str => coerce(data, TargetType::Str),
            DatatypeKind::Dict => coerce(data, TargetType::Dict),
            DatatypeKind::List => coerce(data, TargetType::List),
            DatatypeKind::Tuple => coerce(data, TargetType::Tuple),
            DatatypeKind::Bytes => coerce(data, TargetType::Bytes),
            DatatypeKind::Json => coerce(data, TargetType::Json),
            DatatypeKind::Hex => {
                let text = data.to_string();
                let digits = text.trim().trim_start_matches("0x");
                i64::from_str_radix(digits, 16)
                    .map(Value::Int)
                    .map_err(|e| ConversionError::invalid(&self.name, data, e.to_string()))
            }
            DatatypeKind::OnOff { on, off } => match data {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                other => {
                    let token = other.to_string();
                    if token.eq_ignore_ascii_case(on) {
                        Ok(Value::Bool(true))
                    } else if token.eq_ignore_ascii_case(off) {
                        Ok(Value::Bool(false))
                    } else {
                        Err(ConversionError::invalid(
                            &self.name,
                            other,
                            format!("expected '{}' or '{}'", on, off),
                        ))
                    }
                }
            },
            DatatypeKind::Scaled { factor } => {
                let n = self.number(data)?;
                Ok(Value::Float(n / factor))
            }
            DatatypeKind::Stepped { offset, step, .. } => {
                let n = self.number(data)?;
                Ok(Value::Float(n * step + offset))
            }
            DatatypeKind::HalfStepVolume => {
                let text = data.to_string();
                let text = text.trim();
                let whole: i64 = text
                    .get(..2.min(text.len()))
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| ConversionError::invalid(&self.name, data, "not a volume"))?;
                match text.len() {
                    1 | 2 => Ok(Value::Float(whole as f64)),
                    3 if text.ends_with('5') => Ok(Value::Float(whole as f64 + 0.5)),
                    _ => Err(ConversionError::invalid(&self.name, data, "not a volume")),
                }
            }
            DatatypeKind::HexText => {
                let bytes = hex::decode(data.to_string().trim())
                    .map_err(|e| ConversionError::invalid(&self.name, data, e.to_string()))?;
                String::from_utf8(bytes)
                    .map(Value::Str)
                    .map_err(|e| ConversionError::invalid(&self.name, data, e.to_string()))
            }
        }
    }

    fn number(&self, value: &Value) -> Result<f64> {
        match value {
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ConversionError::invalid(&self.name, value, "not a number")),
            other => other
                .as_f64()
                .ok_or_else(|| ConversionError::invalid(&self.name, other, "not a number")),
        }
    }
}

impl Default for Datatype {
    fn default() -> Self {
        Self::raw()
    }
}

/// Coerce `value` into one of the catalogue target types.
pub fn coerce(value: &Value, target: TargetType) -> Result<Value> {
    if value.satisfies(target) {
        return Ok(value.clone());
    }

    let fail = || ConversionError::Coerce {
        from: value.type_name(),
        value: value.to_string(),
        target,
    };

    match target {
        TargetType::Int => match value {
            Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| fail()),
            _ => Err(fail()),
        },
        TargetType::Num => match value {
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| fail()),
            _ => Err(fail()),
        },
        TargetType::Str => match value {
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map(Value::Str)
                .map_err(|_| fail()),
            other => Ok(Value::Str(other.to_string())),
        },
        TargetType::Dict => match parse_json_text(value) {
            Some(Value::Dict(map)) => Ok(Value::Dict(map)),
            _ => Err(fail()),
        },
        TargetType::List | TargetType::Tuple => match value {
            Value::Bytes(b) => Ok(Value::List(
                b.iter().map(|byte| Value::Int(i64::from(*byte))).collect(),
            )),
            other => match parse_json_text(other) {
                Some(Value::List(list)) => Ok(Value::List(list)),
                _ => Err(fail()),
            },
        },
        TargetType::Bytes | TargetType::ByteArray => match value {
            Value::Str(s) => Ok(Value::Bytes(s.as_bytes().to_vec())),
            Value::List(items) => items
                .iter()
                .map(|item| {
                    item.as_i64()
                        .and_then(|i| u8::try_from(i).ok())
                        .ok_or_else(fail)
                })
                .collect::<Result<Vec<u8>>>()
                .map(Value::Bytes),
            _ => Err(fail()),
        },
        TargetType::Json => parse_json_text(value).ok_or_else(fail),
    }
}

fn parse_json_text(value: &Value) -> Option<Value> {
    let parsed: serde_json::Value = match value {
        Value::Str(s) => serde_json::from_str(s).ok()?,
        Value::Bytes(b) => serde_json::from_slice(b).ok()?,
        _ => return None,
    };
    Some(parsed.into())
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        Value::Float(f) => Some(*f != 0.0),
        Value::Null => Some(false),
        Value::Str(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Some(true),
            "false" | "0" | "off" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    fn dt(name: &str) -> Datatype {
        Datatype::new(name, builtin_kind(name).unwrap())
    }

    #[test]
    fn test_builtin_catalogue_resolves() {
        for name in builtin_names() {
            assert!(builtin_kind(name).is_some(), "{}", name);
        }
        assert!(builtin_kind("nope").is_none());
    }

    #[test]
    fn test_raw_is_identity() {
        let raw = Datatype::raw();
        let v = Value::from("PWON");
        assert_eq!(raw.to_wire(&v).unwrap(), v);
        assert_eq!(raw.from_wire(&v, None).unwrap(), v);
    }

    #[test]
    fn test_bool_parses_tokens() {
        let b = dt("bool");
        assert_eq!(b.from_wire(&Value::from("on"), None).unwrap(), Value::Bool(true));
        assert_eq!(b.from_wire(&Value::from("0"), None).unwrap(), Value::Bool(false));
        assert!(b.from_wire(&Value::from("maybe"), None).is_err());
    }

    #[test]
    fn test_zero_or_one() {
        let z = dt("0or1");
        assert_eq!(z.to_wire(&Value::Bool(true)).unwrap(), Value::Int(1));
        assert_eq!(z.from_wire(&Value::from("0"), None).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_hex() {
        let h = dt("hex");
        assert_eq!(h.to_wire(&Value::Int(10)).unwrap(), Value::from("0A"));
        assert_eq!(h.from_wire(&Value::from("0A"), None).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_json_round_trip() {
        let j = dt("json");
        let v = dict([("volume", Value::Int(30))]);
        let wire = j.to_wire(&v).unwrap();
        assert_eq!(wire, Value::from(r#"{"volume":30}"#));
        assert_eq!(j.from_wire(&wire, None).unwrap(), v);
    }

    #[test]
    fn test_fail_silent_returns_neutral() {
        let raw = Datatype::raw();
        let out = raw.from_wire(&Value::from("abc"), Some(TargetType::Int)).unwrap();
        assert_eq!(out, Value::Int(0));

        let out = raw.from_wire(&Value::from("abc"), Some(TargetType::Dict)).unwrap();
        assert_eq!(out, TargetType::Dict.neutral());

        let out = raw.from_wire(&Value::Int(1), Some(TargetType::Json)).unwrap();
        assert_eq!(out, Value::Int(1));
    }

    #[test]
    fn test_strict_propagates() {
        let raw = Datatype::raw().strict();
        let err = raw
            .from_wire(&Value::from("abc"), Some(TargetType::Int))
            .unwrap_err();
        assert!(matches!(err, ConversionError::Coerce { target: TargetType::Int, .. }));
    }

    #[test]
    fn test_expected_type_coerces() {
        let raw = Datatype::raw();
        assert_eq!(
            raw.from_wire(&Value::from(" 42 "), Some(TargetType::Int)).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            raw.from_wire(&Value::from("[1,2]"), Some(TargetType::Tuple)).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            raw.from_wire(&Value::from("ab"), Some(TargetType::ByteArray)).unwrap(),
            Value::Bytes(b"ab".to_vec())
        );
    }

    #[test]
    fn test_onoff_rejects_unknown_token() {
        let o = dt("onoff");
        assert_eq!(o.to_wire(&Value::Bool(false)).unwrap(), Value::from("OFF"));
        assert!(o.from_wire(&Value::from("STANDBY"), None).is_err());
    }

    #[test]
    fn test_scaled() {
        let s = Datatype::new("temp10", DatatypeKind::Scaled { factor: 10.0 });
        assert_eq!(s.to_wire(&Value::Float(21.5)).unwrap(), Value::Int(215));
        assert_eq!(s.from_wire(&Value::Int(215), None).unwrap(), Value::Float(21.5));
    }

    #[test]
    fn test_half_step_volume() {
        let v = Datatype::new("vol", DatatypeKind::HalfStepVolume);
        assert_eq!(v.to_wire(&Value::Float(50.5)).unwrap(), Value::from("505"));
        assert_eq!(v.to_wire(&Value::Int(5)).unwrap(), Value::from("05"));
        assert_eq!(v.from_wire(&Value::from("505"), None).unwrap(), Value::Float(50.5));
        assert_eq!(v.from_wire(&Value::from("50"), None).unwrap(), Value::Float(50.0));
        assert!(v.from_wire(&Value::from("5x"), None).is_err());

        assert_eq!(v.to_wire(&Value::Float(99.5)).unwrap(), Value::from("995"));
        assert_eq!(v.from_wire(&Value::from("995"), None).unwrap(), Value::Float(99.5));
        assert!(v.to_wire(&Value::Int(100)).is_err());
        assert!(v.from_wire(&Value::from("100"), None).is_err());
    }

    #[test]
    fn test_hex_text() {
        let t = Datatype::new("display", DatatypeKind::HexText);
        assert_eq!(t.to_wire(&Value::from("CD")).unwrap(), Value::from("4344"));
        assert_eq!(t.from_wire(&Value::from("4344"), None).unwrap(), Value::from("CD"));
        assert!(matches!(
            t.from_wire(&Value::from("434"), None).unwrap_err(),
            ConversionError::Invalid { .. }
        ));
        assert!(t.from_wire(&Value::from("4G"), None).is_err());
    }

    #[test]
    fn test_hex_bytes() {
        let h = dt("hex");
        assert_eq!(
            h.to_wire(&Value::Bytes(vec![0x0a, 0xff])).unwrap(),
            Value::from("0AFF")
        );
    }
}
