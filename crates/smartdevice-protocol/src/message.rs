//! JSON-RPC 2.0 framing.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Result, SessionError};

pub const JSONRPC_VERSION: &str = "2.0";

/// An outbound request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<JsonValue>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Successful response to one of our requests
    Response { id: u64, result: JsonValue },
    /// Failed response; `id` is absent when the peer could not parse the request
    Error {
        id: Option<u64>,
        error: RpcErrorObject,
    },
    /// Unsolicited message from the peer
    Notification { method: String, params: JsonValue },
}

/// Decode one inbound frame. Batches decode to several messages.
///
/// Invalid batch elements are logged and skipped so the valid ones still
/// reach the session. A batch without a single valid element is an error.
pub fn parse_incoming(raw: &str) -> Result<Vec<IncomingMessage>> {
    let value: JsonValue = serde_json::from_str(raw.trim())?;
    let items = match value {
        JsonValue::Array(items) => items,
        other => return Ok(vec![decode(other)?]),
    };

    let mut messages = Vec::with_capacity(items.len());
    let mut first_error = None;
    for (index, item) in items.into_iter().enumerate() {
        match decode(item) {
            Ok(message) => messages.push(message),
            Err(e) => {
                tracing::warn!("Skipping batch element {}: {}", index, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if messages.is_empty() => Err(e),
        _ => Ok(messages),
    }
}

fn decode(value: JsonValue) -> Result<IncomingMessage> {
    let mut obj = match value {
        JsonValue::Object(obj) => obj,
        other => {
            return Err(SessionError::InvalidMessage(format!(
                "expected an object, got {}",
                other
            )))
        }
    };

    let id = obj.get("id").and_then(parse_id);

    if let Some(error) = obj.remove("error") {
        let error: RpcErrorObject = serde_json::from_value(error)?;
        return Ok(IncomingMessage::Error { id, error });
    }

    if let Some(result) = obj.remove("result") {
        return match id {
            Some(id) => Ok(IncomingMessage::Response { id, result }),
            None => Err(SessionError::InvalidMessage(
                "response without a usable id".to_string(),
            )),
        };
    }

    if let Some(JsonValue::String(method)) = obj.remove("method") {
        let params = obj.remove("params").unwrap_or(JsonValue::Null);
        return Ok(IncomingMessage::Notification { method, params });
    }

    Err(SessionError::InvalidMessage(
        "neither result, error nor method present".to_string(),
    ))
}

/// Ids are issued as numbers; peers occasionally echo them as strings.
fn parse_id(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}
