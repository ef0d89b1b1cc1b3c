//! Value bounds checked before a write is sent.

use std::fmt;

use serde_json::{Map, Value as JsonValue};
use smartdevice_core::Value;

use crate::error::{CommandError, ConfigError, Result};

/// Numeric range limits of one type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    /// Clamp out-of-range values instead of rejecting them
    pub force: bool,
}

impl<T: PartialOrd + Copy> Range<T> {
    fn apply(&self, v: T) -> Option<T> {
        if let Some(min) = self.min {
            if v < min {
                return self.force.then_some(min);
            }
        }
        if let Some(max) = self.max {
            if v > max {
                return self.force.then_some(max);
            }
        }
        Some(v)
    }
}

/// Accepted values of a writable command.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Bounds {
    /// No restriction
    #[default]
    Any,
    /// Exact membership
    OneOf(Vec<Value>),
    /// Membership after lower-casing strings
    OneOfCi(Vec<String>),
    IntRange(Range<i64>),
    FloatRange(Range<f64>),
}

impl Bounds {
    /// Build bounds from a command's `cmd_settings` block.
    ///
    /// Recognised keys: `valid_list`, `valid_list_ci`, `valid_min`,
    /// `valid_max`, `force_min`, `force_max`. Forced limits take precedence
    /// over plain ones. Both limits must share a numeric type.
    pub fn from_settings(
        command: &str,
        settings: &Map<String, JsonValue>,
    ) -> std::result::Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBounds {
            command: command.to_string(),
            reason: reason.to_string(),
        };

        if let Some(list) = settings.get("valid_list") {
            let items = list
                .as_array()
                .ok_or_else(|| invalid("valid_list must be a list"))?;
            return Ok(Bounds::OneOf(
                items.iter().cloned().map(Value::from).collect(),
            ));
        }

        if let Some(list) = settings.get("valid_list_ci") {
            let items = list
                .as_array()
                .ok_or_else(|| invalid("valid_list_ci must be a list"))?;
            return Ok(Bounds::OneOfCi(
                items
                    .iter()
                    .map(|item| match item {
                        JsonValue::String(s) => s.to_lowercase(),
                        other => other.to_string(),
                    })
                    .collect(),
            ));
        }

        let force = settings.contains_key("force_min") || settings.contains_key("force_max");
        let min = settings
            .get("force_min")
            .or_else(|| settings.get("valid_min"));
        let max = settings
            .get("force_max")
            .or_else(|| settings.get("valid_max"));

        if min.is_none() && max.is_none() {
            return Ok(Bounds::Any);
        }

        for limit in [min, max].into_iter().flatten() {
            if !limit.is_number() {
                return Err(invalid("limits must be numbers"));
            }
        }

        let is_int = |v: &&JsonValue| v.is_i64();
        let all_int = [min, max].iter().flatten().all(is_int);
        let any_int = [min, max].iter().flatten().any(is_int);

        if all_int {
            Ok(Bounds::IntRange(Range {
                min: min.and_then(JsonValue::as_i64),
                max: max.and_then(JsonValue::as_i64),
                force,
            }))
        } else if !any_int {
            Ok(Bounds::FloatRange(Range {
                min: min.and_then(JsonValue::as_f64),
                max: max.and_then(JsonValue::as_f64),
                force,
            }))
        } else {
            Err(invalid("min and max must have the same numeric type"))
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Bounds::Any)
    }

    /// Validate `value` against these bounds.
    ///
    /// Returns the value to send: unchanged, floored to an integer for
    /// integer ranges, or clamped for forced ranges.
    pub fn check(&self, command: &str, value: &Value) -> Result<Value> {
        let checked = match self {
            Bounds::Any => Some(value.clone()),
            Bounds::OneOf(items) => items.contains(value).then(|| value.clone()),
            Bounds::OneOfCi(items) => {
                let key = match value {
                    Value::Str(s) => s.to_lowercase(),
                    other => other.to_string(),
                };
                items.contains(&key).then(|| value.clone())
            }
            Bounds::IntRange(range) => match value {
                Value::Int(i) => range.apply(*i).map(Value::Int),
                Value::Float(f) if f.is_finite() => range.apply(f.floor() as i64).map(Value::Int),
                _ => None,
            },
            Bounds::FloatRange(range) => match value {
                Value::Float(f) => range.apply(*f).map(Value::Float),
                _ => None,
            },
        };

        checked.ok_or_else(|| CommandError::ValueRejected {
            command: command.to_string(),
            value: value.to_string(),
            bounds: self.to_string(),
        })
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn limit<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        match self {
            Bounds::Any => f.write_str("any"),
            Bounds::OneOf(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Bounds::OneOfCi(items) => write!(f, "[{}] (case-insensitive)", items.join(", ")),
            Bounds::IntRange(r) => write!(f, "{}..={}", limit(&r.min), limit(&r.max)),
            Bounds::FloatRange(r) => write!(f, "{}..={}", limit(&r.min), limit(&r.max)),
        }
    }
}
