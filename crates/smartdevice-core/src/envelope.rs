//! Payload envelope handed from the command layer to a connection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Outgoing request built for one command.
///
/// `payload` is what goes on the wire: a string for text protocols, or a
/// `{"method", "params"}` dictionary for JSON-RPC commands. `data` is the
/// converter's wire form of the written value (`Null` for reads). `params`
/// carries extra templated fields a transport may place into URL query
/// parameters or headers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendData {
    pub payload: Value,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl SendData {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            data: Value::Null,
            params: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// JSON-RPC method name, when the payload is a method/params dictionary.
    pub fn method(&self) -> Option<&str> {
        match &self.payload {
            Value::Dict(map) => map.get("method").and_then(Value::as_str),
            _ => None,
        }
    }

    /// JSON-RPC params, when the payload is a method/params dictionary.
    pub fn rpc_params(&self) -> Option<&Value> {
        match &self.payload {
            Value::Dict(map) => map.get("params"),
            _ => None,
        }
    }
}
