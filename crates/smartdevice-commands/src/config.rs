//! Device family configuration documents.
//!
//! A family document is JSON:
//!
//! ```json
//! {
//!   "family": "denon",
//!   "command_class": "parse_str",
//!   "commands": {
//!     "power": { "read": true, "write": true, "read_cmd": "PW?", ... },
//!     "zone2": { "power": { ... } }
//!   },
//!   "lookups": { "INPUT": { "CD": "cd", "TUNER": "tuner" } }
//! }
//! ```
//!
//! Commands may be nested in groups; a nested command is named by its dotted
//! path (`zone2.power`).

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use smartdevice_core::TargetType;

use crate::error::ConfigError;

/// Keys that mark an object as a command definition rather than a group.
const COMMAND_KEYS: &[&str] = &["opcode", "read_cmd", "write_cmd", "read", "write"];

/// Separator between group and command names.
pub const GROUP_SEPARATOR: char = '.';

/// One family document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyConfig {
    /// Device family whose converter catalogue applies
    #[serde(default)]
    pub family: Option<String>,
    /// Default command kind for commands that do not set one
    #[serde(default)]
    pub command_class: Option<String>,
    #[serde(default)]
    pub commands: Map<String, JsonValue>,
    #[serde(default)]
    pub lookups: Map<String, JsonValue>,
}

impl FamilyConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Flatten the command tree in document order.
    ///
    /// Entries that fail to deserialize are returned as errors so the caller
    /// can log and skip them without losing the rest.
    pub fn command_entries(&self) -> Vec<(String, Result<CommandConfig, ConfigError>)> {
        let mut out = Vec::new();
        collect_commands("", &self.commands, &mut out);
        out
    }
}

fn collect_commands(
    prefix: &str,
    node: &Map<String, JsonValue>,
    out: &mut Vec<(String, Result<CommandConfig, ConfigError>)>,
) {
    for (key, value) in node {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}{}{}", prefix, GROUP_SEPARATOR, key)
        };

        let Some(obj) = value.as_object() else {
            tracing::warn!("Skipping command entry '{}': not an object", name);
            continue;
        };

        if COMMAND_KEYS.iter().any(|k| obj.contains_key(*k)) {
            let parsed = serde_json::from_value::<CommandConfig>(value.clone()).map_err(|e| {
                ConfigError::InvalidCommand {
                    command: name.clone(),
                    reason: e.to_string(),
                }
            });
            out.push((name, parsed));
        } else {
            collect_commands(&name, obj, out);
        }
    }
}

/// A reply token: one literal or a list of literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyToken {
    One(String),
    Many(Vec<String>),
}

impl ReplyToken {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ReplyToken::One(token) => vec![token],
            ReplyToken::Many(tokens) => tokens,
        }
    }
}

/// Definition of one command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub opcode: String,
    pub read_cmd: Option<String>,
    pub write_cmd: Option<String>,
    pub read: bool,
    pub write: bool,
    /// Converter name; unknown names fall back to `raw`
    pub dev_datatype: Option<String>,
    pub reply_token: Option<ReplyToken>,
    pub reply_pattern: Option<String>,
    pub cmd_settings: Map<String, JsonValue>,
    /// Name of the associated lookup table
    pub lookup: Option<String>,
    /// Expected logical type of parsed replies
    pub item_type: Option<TargetType>,
    /// Overrides the family's default command kind
    pub command_class: Option<String>,
    /// JSON-RPC params template for writes (and reads without `read_params`)
    pub params: Option<JsonValue>,
    pub read_params: Option<JsonValue>,
    /// Dotted path into a JSON-RPC result
    pub reply_path: Option<String>,
}
