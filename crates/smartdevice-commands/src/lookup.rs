//! Lookup tables mapping device tokens to logical values.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value as JsonValue};
use smartdevice_core::Value;

/// Which precomputed view of a table to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupView {
    /// device token → logical value
    Forward,
    /// logical value → device token
    Reverse,
    /// lower-cased logical value → device token
    ReverseCi,
    /// logical values in source order
    List,
}

impl FromStr for LookupView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fwd" | "forward" => Ok(LookupView::Forward),
            "rev" | "reverse" => Ok(LookupView::Reverse),
            "rci" | "reverse_ci" => Ok(LookupView::ReverseCi),
            "list" => Ok(LookupView::List),
            other => Err(format!("Unknown lookup view: {}", other)),
        }
    }
}

impl fmt::Display for LookupView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LookupView::Forward => "fwd",
            LookupView::Reverse => "rev",
            LookupView::ReverseCi => "rci",
            LookupView::List => "list",
        };
        f.write_str(name)
    }
}

/// A bidirectional token table.
///
/// All views are built once from the source mapping and never change. The
/// tables are small, so lookups are linear scans that keep source order.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    name: String,
    forward: Vec<(String, Value)>,
    reverse: Vec<(Value, String)>,
    reverse_ci: Vec<(Value, String)>,
}

impl LookupTable {
    pub fn new<I>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let forward: Vec<(String, Value)> = entries.into_iter().collect();
        let reverse = forward
            .iter()
            .map(|(token, value)| (value.clone(), token.clone()))
            .collect();
        let reverse_ci = forward
            .iter()
            .map(|(token, value)| (value.folded(), token.clone()))
            .collect();

        Self {
            name: name.into(),
            forward,
            reverse,
            reverse_ci,
        }
    }

    /// Build from a JSON object of `token: value` pairs.
    pub fn from_json(name: impl Into<String>, map: &Map<String, JsonValue>) -> Self {
        Self::new(
            name,
            map.iter()
                .map(|(token, value)| (token.clone(), Value::from(value.clone()))),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Logical value for a device token.
    pub fn forward(&self, token: &str) -> Option<&Value> {
        self.forward
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v)
    }

    /// Device token for a logical value.
    pub fn reverse(&self, value: &Value) -> Option<&str> {
        self.reverse
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, t)| t.as_str())
    }

    /// Device token for a logical value, ignoring the case of strings.
    pub fn reverse_ci(&self, value: &Value) -> Option<&str> {
        let key = value.folded();
        self.reverse_ci
            .iter()
            .find(|(v, _)| *v == key)
            .map(|(_, t)| t.as_str())
    }

    /// Logical values in source order.
    pub fn values(&self) -> Vec<Value> {
        self.forward.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Device tokens in source order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.forward.iter().map(|(t, _)| t.as_str())
    }

    /// Render one view as a value.
    pub fn view(&self, view: LookupView) -> Value {
        match view {
            LookupView::Forward => Value::Dict(
                self.forward
                    .iter()
                    .map(|(t, v)| (t.clone(), v.clone()))
                    .collect(),
            ),
            LookupView::Reverse => Value::Dict(
                self.reverse
                    .iter()
                    .map(|(v, t)| (v.to_string(), Value::from(t.as_str())))
                    .collect(),
            ),
            LookupView::ReverseCi => Value::Dict(
                self.reverse_ci
                    .iter()
                    .map(|(v, t)| (v.to_string(), Value::from(t.as_str())))
                    .collect(),
            ),
            LookupView::List => Value::List(self.values()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs() -> LookupTable {
        let map = json!({"CD": "Cd", "TUNER": "Tuner", "SAT/CBL": "Sat", "1": 1});
        LookupTable::from_json("INPUT", map.as_object().unwrap())
    }

    #[test]
    fn test_views_are_consistent() {
        let table = inputs();
        for token in table.tokens() {
            let value = table.forward(token).unwrap();
            assert_eq!(table.reverse(value), Some(token));
            assert_eq!(table.reverse_ci(value), Some(token));
        }
    }

    #[test]
    fn test_reverse_ci_folds_strings_only() {
        let table = inputs();
        assert_eq!(table.reverse_ci(&Value::from("TUNER")), Some("TUNER"));
        assert_eq!(table.reverse_ci(&Value::from("sat")), Some("SAT/CBL"));
        assert_eq!(table.reverse(&Value::from("sat")), None);
        assert_eq!(table.reverse_ci(&Value::Int(1)), Some("1"));
    }

    #[test]
    fn test_list_view_keeps_source_order() {
        let table = inputs();
        assert_eq!(
            table.view(LookupView::List),
            Value::List(vec![
                Value::from("Cd"),
                Value::from("Tuner"),
                Value::from("Sat"),
                Value::Int(1),
            ])
        );
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_view_parse() {
        assert_eq!("rci".parse::<LookupView>().unwrap(), LookupView::ReverseCi);
        assert!("sideways".parse::<LookupView>().is_err());
    }
}
