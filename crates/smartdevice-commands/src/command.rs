//! A single device command: request building and reply parsing.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use smartdevice_core::{SendData, TargetType, Value};

use crate::bounds::Bounds;
use crate::config::CommandConfig;
use crate::datatype::Datatype;
use crate::error::{CommandError, ConfigError, Result, TemplateError};
use crate::family::DeviceFamily;
use crate::lookup::LookupTable;
use crate::template::{self, TemplateContext};

/// Reply token that defers matching to the command's reply pattern.
pub const REGEX_TOKEN: &str = "REGEX";

/// Command behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandKind {
    /// Placeholder expansion only
    #[default]
    Plain,
    /// Adds the `:expr:` write form
    Str,
    /// Adds the `:expr:` write form and regex reply parsing
    ParseStr,
    /// JSON-RPC method/params payloads
    Json,
    /// Adds one templated entry per plugin parameter to the envelope
    UrlParams,
}

type KindEntry = (&'static str, CommandKind);

const KINDS: &[KindEntry] = &[
    ("plain", CommandKind::Plain),
    ("str", CommandKind::Str),
    ("parse_str", CommandKind::ParseStr),
    ("json", CommandKind::Json),
    ("url_params", CommandKind::UrlParams),
];

impl CommandKind {
    pub fn name(&self) -> &'static str {
        KINDS
            .iter()
            .find(|(_, k)| k == self)
            .map(|(n, _)| *n)
            .unwrap_or("plain")
    }

    fn supports_format_expr(&self) -> bool {
        matches!(self, CommandKind::Str | CommandKind::ParseStr)
    }
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        KINDS
            .iter()
            .find(|(n, _)| *n == s)
            .map(|(_, k)| *k)
            .ok_or_else(|| format!("Unknown command class: {}", s))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Load-time inputs shared by all commands of one registry.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub family: DeviceFamily,
    pub default_kind: CommandKind,
    pub fail_silent: bool,
    pub lookups: &'a HashMap<String, LookupTable>,
}

/// Immutable definition of one device property.
#[derive(Debug, Clone)]
pub struct Command {
    name: String,
    kind: CommandKind,
    readable: bool,
    writable: bool,
    opcode: String,
    read_cmd: Option<String>,
    write_cmd: Option<String>,
    bounds: Bounds,
    reply_tokens: Vec<String>,
    reply_pattern: Option<Regex>,
    /// Configured pattern that failed to compile; replies never match it
    broken_pattern: Option<String>,
    datatype: Datatype,
    lookup: Option<String>,
    item_type: Option<TargetType>,
    params: Option<Value>,
    read_params: Option<Value>,
    reply_path: Option<String>,
}

impl Command {
    /// Create a bare command. Use the `with_*` builders to configure it.
    pub fn new(name: impl Into<String>, opcode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CommandKind::Plain,
            readable: false,
            writable: false,
            opcode: opcode.into(),
            read_cmd: None,
            write_cmd: None,
            bounds: Bounds::Any,
            reply_tokens: Vec::new(),
            reply_pattern: None,
            broken_pattern: None,
            datatype: Datatype::raw(),
            lookup: None,
            item_type: None,
            params: None,
            read_params: None,
            reply_path: None,
        }
    }

    /// Build a command from its configuration.
    ///
    /// Unresolvable converters, malformed bounds and reply patterns that do
    /// not compile are logged and degraded. Unknown kinds and missing opcodes
    /// are errors.
    pub fn from_config(
        name: &str,
        cfg: &CommandConfig,
        ctx: &BuildContext<'_>,
    ) -> std::result::Result<Self, ConfigError> {
        let kind = match &cfg.command_class {
            Some(class) => class.parse::<CommandKind>().map_err(|_| {
                ConfigError::UnknownCommandClass {
                    command: name.to_string(),
                    class: class.clone(),
                }
            })?,
            None => ctx.default_kind,
        };

        if cfg.read && cfg.opcode.is_empty() && cfg.read_cmd.is_none() {
            return Err(ConfigError::InvalidCommand {
                command: name.to_string(),
                reason: "readable command needs opcode or read_cmd".to_string(),
            });
        }
        if cfg.write && cfg.opcode.is_empty() && cfg.write_cmd.is_none() {
            return Err(ConfigError::InvalidCommand {
                command: name.to_string(),
                reason: "writable command needs opcode or write_cmd".to_string(),
            });
        }

        let bounds = match Bounds::from_settings(name, &cfg.cmd_settings) {
            Ok(bounds) => bounds,
            Err(e) => {
                tracing::error!("{}, ignoring bounds", e);
                Bounds::Any
            }
        };

        let lookup_table = cfg.lookup.as_ref().and_then(|table| {
            let found = ctx.lookups.get(table);
            if found.is_none() {
                tracing::warn!("Command '{}' references unknown lookup table '{}'", name, table);
            }
            found
        });

        let mut broken_pattern = None;
        let reply_pattern = cfg.reply_pattern.as_ref().and_then(|pattern| {
            let expanded = expand_pattern(pattern, lookup_table, &bounds);
            match Regex::new(&expanded) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    let err = ConfigError::InvalidPattern {
                        command: name.to_string(),
                        reason: e.to_string(),
                    };
                    tracing::error!("{}, replies will not match it", err);
                    broken_pattern = Some(expanded);
                    None
                }
            }
        });

        let datatype_name = cfg.dev_datatype.as_deref().unwrap_or("raw");

        Ok(Self {
            name: name.to_string(),
            kind,
            readable: cfg.read,
            writable: cfg.write,
            opcode: cfg.opcode.clone(),
            read_cmd: cfg.read_cmd.clone(),
            write_cmd: cfg.write_cmd.clone(),
            bounds,
            reply_tokens: cfg
                .reply_token
                .clone()
                .map(|t| t.into_vec())
                .unwrap_or_default(),
            reply_pattern,
            broken_pattern,
            datatype: ctx.family.datatype(datatype_name, ctx.fail_silent),
            lookup: cfg.lookup.clone(),
            item_type: cfg.item_type,
            params: cfg.params.clone().map(Value::from),
            read_params: cfg.read_params.clone().map(Value::from),
            reply_path: cfg.reply_path.clone(),
        })
    }

    pub fn with_kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn with_read_cmd(mut self, read_cmd: impl Into<String>) -> Self {
        self.read_cmd = Some(read_cmd.into());
        self
    }

    pub fn with_write_cmd(mut self, write_cmd: impl Into<String>) -> Self {
        self.write_cmd = Some(write_cmd.into());
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_datatype(mut self, datatype: Datatype) -> Self {
        self.datatype = datatype;
        self
    }

    pub fn with_reply_pattern(mut self, pattern: Regex) -> Self {
        self.reply_pattern = Some(pattern);
        self
    }

    pub fn with_reply_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reply_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lookup(mut self, table: impl Into<String>) -> Self {
        self.lookup = Some(table.into());
        self
    }

    pub fn with_item_type(mut self, item_type: TargetType) -> Self {
        self.item_type = Some(item_type);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_reply_path(mut self, path: impl Into<String>) -> Self {
        self.reply_path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    pub fn reply_tokens(&self) -> &[String] {
        &self.reply_tokens
    }

    pub fn reply_pattern(&self) -> Option<&Regex> {
        self.reply_pattern.as_ref()
    }

    /// Whether a reply pattern was configured but could not be compiled.
    pub fn has_broken_pattern(&self) -> bool {
        self.broken_pattern.is_some()
    }

    pub fn lookup(&self) -> Option<&str> {
        self.lookup.as_deref()
    }

    pub fn item_type(&self) -> Option<TargetType> {
        self.item_type
    }

    /// Validate a write value against the configured bounds.
    pub fn check_value(&self, value: &Value) -> Result<Value> {
        self.bounds.check(&self.name, value)
    }

    /// Build the outgoing request. `None` builds a read, `Some` a write.
    pub fn build_send(
        &self,
        value: Option<&Value>,
        plugin_params: &HashMap<String, Value>,
    ) -> Result<SendData> {
        let Some(value) = value else {
            let ctx = TemplateContext::new(&self.opcode, plugin_params);
            let template = self.read_cmd.as_deref().unwrap_or(&self.opcode);
            let rpc_params = self.read_params.as_ref().or(self.params.as_ref());
            return self.assemble(template, rpc_params, None, &ctx);
        };

        let checked = self.check_value(value)?;
        let wire = self.datatype.to_wire(&checked)?;
        let wire_text = wire.to_string();
        let raw_text = checked.to_string();
        let ctx =
            TemplateContext::new(&self.opcode, plugin_params).with_value(&wire_text, &raw_text);

        let template = self.write_cmd.as_deref().unwrap_or(&self.opcode);
        self.assemble(template, self.params.as_ref(), Some(wire), &ctx)
    }

    fn assemble(
        &self,
        template: &str,
        rpc_params: Option<&Value>,
        wire: Option<Value>,
        ctx: &TemplateContext<'_>,
    ) -> Result<SendData> {
        let payload = match self.kind {
            CommandKind::Json => {
                let method = template::expand(template, ctx)?;
                let mut body = BTreeMap::new();
                body.insert("method".to_string(), Value::Str(method));
                if let Some(params) = rpc_params {
                    body.insert(
                        "params".to_string(),
                        fill_params(params, wire.as_ref(), ctx)?,
                    );
                }
                Value::Dict(body)
            }
            kind if kind.supports_format_expr()
                && wire.is_some()
                && template::is_format_expr(template) =>
            {
                let value = ctx.value.unwrap_or_default();
                Value::Str(template::format_expr(template, value)?)
            }
            _ => Value::Str(template::expand(template, ctx)?),
        };

        let mut send = SendData::new(payload).with_data(wire.unwrap_or(Value::Null));

        if self.kind == CommandKind::UrlParams {
            for (key, value) in ctx.params {
                let entry = match value {
                    Value::Str(s) => Value::Str(template::expand(s, ctx)?),
                    other => other.clone(),
                };
                send = send.with_param(key.clone(), entry);
            }
        }

        Ok(send)
    }

    /// Convert a device reply into a logical value.
    pub fn parse_reply(&self, data: &Value) -> Result<Value> {
        let extracted = match self.kind {
            CommandKind::ParseStr => match (&self.reply_pattern, &self.broken_pattern) {
                (Some(pattern), _) => self.capture(pattern, &data.to_string())?,
                (None, Some(pattern)) => {
                    return Err(CommandError::NoMatch {
                        command: self.name.clone(),
                        pattern: pattern.clone(),
                        raw: data.to_string(),
                    })
                }
                (None, None) => data.clone(),
            },
            CommandKind::Json => match &self.reply_path {
                Some(path) => self.extract_path(data, path)?,
                None => data.clone(),
            },
            _ => data.clone(),
        };

        Ok(self.datatype.from_wire(&extracted, self.item_type)?)
    }

    fn capture(&self, pattern: &Regex, raw: &str) -> Result<Value> {
        // captures_len counts the implicit whole-match group
        let groups = pattern.captures_len() - 1;
        if groups > 1 {
            return Err(CommandError::AmbiguousMatch {
                command: self.name.clone(),
                pattern: pattern.as_str().to_string(),
                groups,
            });
        }

        let caps = pattern.captures(raw).ok_or_else(|| CommandError::NoMatch {
            command: self.name.clone(),
            pattern: pattern.as_str().to_string(),
            raw: raw.to_string(),
        })?;

        if groups == 1 {
            // An optional group that did not participate yields an empty capture
            let text = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            Ok(Value::from(text))
        } else {
            Ok(Value::from(raw))
        }
    }

    fn extract_path(&self, data: &Value, path: &str) -> Result<Value> {
        let parsed;
        let mut current = match data {
            Value::Str(s) => {
                parsed = serde_json::from_str::<serde_json::Value>(s)
                    .map(Value::from)
                    .unwrap_or_else(|_| data.clone());
                &parsed
            }
            other => other,
        };

        for segment in path.split('.').filter(|s| !s.is_empty()) {
            let next = match current {
                Value::Dict(map) => map.get(segment),
                Value::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = next.ok_or_else(|| CommandError::ReplyPath {
                command: self.name.clone(),
                path: path.to_string(),
            })?;
        }
        Ok(current.clone())
    }
}

/// Fill a JSON-RPC params template.
///
/// String leaves equal to `{VALUE}` receive the typed wire value; other
/// strings are placeholder-expanded.
fn fill_params(
    template: &Value,
    wire: Option<&Value>,
    ctx: &TemplateContext<'_>,
) -> std::result::Result<Value, TemplateError> {
    match template {
        Value::Str(s) if s == "{VALUE}" => Ok(wire.cloned().unwrap_or_else(|| template.clone())),
        Value::Str(s) => Ok(Value::Str(template::expand(s, ctx)?)),
        Value::List(items) => items
            .iter()
            .map(|item| fill_params(item, wire, ctx))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::List),
        Value::Dict(map) => map
            .iter()
            .map(|(k, v)| fill_params(v, wire, ctx).map(|filled| (k.clone(), filled)))
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map(Value::Dict),
        other => Ok(other.clone()),
    }
}

/// Expand `{LOOKUP}` and `{VALID_LIST}` in a reply pattern to non-capturing
/// alternations of escaped literals.
fn expand_pattern(pattern: &str, lookup: Option<&LookupTable>, bounds: &Bounds) -> String {
    let mut out = pattern.to_string();

    if out.contains("{LOOKUP}") {
        if let Some(table) = lookup {
            let alts: Vec<String> = table.tokens().map(regex::escape).collect();
            out = out.replace("{LOOKUP}", &format!("(?:{})", alts.join("|")));
        }
    }

    if out.contains("{VALID_LIST}") {
        let items: Vec<String> = match bounds {
            Bounds::OneOf(items) => items.iter().map(|v| regex::escape(&v.to_string())).collect(),
            Bounds::OneOfCi(items) => items.iter().map(|s| regex::escape(s)).collect(),
            _ => Vec::new(),
        };
        if !items.is_empty() {
            out = out.replace("{VALID_LIST}", &format!("(?:{})", items.join("|")));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DatatypeKind;

    fn power() -> Command {
        Command::new("power", "PW")
            .with_kind(CommandKind::ParseStr)
            .readable(true)
            .writable(true)
            .with_read_cmd("PW?")
            .with_write_cmd("PW{VALUE}")
            .with_datatype(Datatype::new("power", DatatypeKind::on_off("ON", "STANDBY")))
            .with_reply_pattern(Regex::new(r"PW(ON|STANDBY)").unwrap())
    }

    #[test]
    fn test_read_uses_read_cmd() {
        let send = power().build_send(None, &HashMap::new()).unwrap();
        assert_eq!(send.payload, Value::from("PW?"));
        assert!(send.data.is_null());
    }

    #[test]
    fn test_read_falls_back_to_opcode() {
        let cmd = Command::new("mute", "MU?").readable(true);
        let send = cmd.build_send(None, &HashMap::new()).unwrap();
        assert_eq!(send.payload, Value::from("MU?"));
    }

    #[test]
    fn test_write_power() {
        let send = power()
            .build_send(Some(&Value::Bool(true)), &HashMap::new())
            .unwrap();
        assert_eq!(send.payload, Value::from("PWON"));
        assert_eq!(send.data, Value::from("ON"));
    }

    #[test]
    fn test_parse_power_reply() {
        let cmd = power();
        assert_eq!(cmd.parse_reply(&Value::from("PWON")).unwrap(), Value::Bool(true));
        assert_eq!(
            cmd.parse_reply(&Value::from("PWSTANDBY")).unwrap(),
            Value::Bool(false)
        );
        assert!(matches!(
            cmd.parse_reply(&Value::from("MV50")).unwrap_err(),
            CommandError::NoMatch { .. }
        ));
    }

    #[test]
    fn test_write_rejected_by_bounds() {
        let cmd = Command::new("volume", "MV")
            .writable(true)
            .with_write_cmd("MV{VALUE}")
            .with_bounds(Bounds::IntRange(crate::bounds::Range {
                min: Some(0),
                max: Some(98),
                force: false,
            }));
        let err = cmd
            .build_send(Some(&Value::Int(99)), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, CommandError::ValueRejected { .. }));

        let send = cmd
            .build_send(Some(&Value::Float(40.9)), &HashMap::new())
            .unwrap();
        assert_eq!(send.payload, Value::from("MV40"));
    }

    #[test]
    fn test_zero_groups_returns_whole_input() {
        let cmd = Command::new("status", "ST")
            .with_kind(CommandKind::ParseStr)
            .with_reply_pattern(Regex::new(r"^ST\d+$").unwrap());
        assert_eq!(cmd.parse_reply(&Value::from("ST42")).unwrap(), Value::from("ST42"));
    }

    #[test]
    fn test_two_groups_is_ambiguous() {
        let cmd = Command::new("status", "ST")
            .with_kind(CommandKind::ParseStr)
            .with_reply_pattern(Regex::new(r"(ST)(\d+)").unwrap());
        let err = cmd.parse_reply(&Value::from("ST42")).unwrap_err();
        assert!(matches!(err, CommandError::AmbiguousMatch { groups: 2, .. }));
    }

    #[test]
    fn test_plain_kind_ignores_pattern() {
        let cmd = Command::new("raw", "X").with_reply_pattern(Regex::new(r"X(\d)").unwrap());
        assert_eq!(cmd.parse_reply(&Value::from("X1")).unwrap(), Value::from("X1"));
    }

    #[test]
    fn test_format_expr_write() {
        let cmd = Command::new("volume", "MV")
            .with_kind(CommandKind::Str)
            .writable(true)
            .with_write_cmd(":MV{VALUE:0>2}:")
            .with_datatype(Datatype::new("int", DatatypeKind::Int));
        let send = cmd.build_send(Some(&Value::Int(5)), &HashMap::new()).unwrap();
        assert_eq!(send.payload, Value::from("MV05"));
    }

    #[test]
    fn test_plugin_parameters_and_url_params() {
        let mut params = HashMap::new();
        params.insert("zone".to_string(), Value::from("2"));
        params.insert("query".to_string(), Value::from("cmd={OPCODE}&v={VALUE}"));

        let cmd = Command::new("volume", "setVolume")
            .with_kind(CommandKind::UrlParams)
            .writable(true)
            .with_write_cmd("/zone{PARAM:zone}/{OPCODE}/{VALUE}");
        let send = cmd.build_send(Some(&Value::Int(30)), &params).unwrap();

        assert_eq!(send.payload, Value::from("/zone2/setVolume/30"));
        assert_eq!(send.params["zone"], Value::from("2"));
        assert_eq!(send.params["query"], Value::from("cmd=setVolume&v=30"));
    }

    #[test]
    fn test_json_payload_typed_value() {
        let template: Value = serde_json::json!({"playerid": 1, "volume": "{VALUE}"}).into();
        let cmd = Command::new("volume", "Application.SetVolume")
            .with_kind(CommandKind::Json)
            .writable(true)
            .with_params(template)
            .with_datatype(Datatype::new("int", DatatypeKind::Int));
        let send = cmd.build_send(Some(&Value::Int(30)), &HashMap::new()).unwrap();

        assert_eq!(send.method(), Some("Application.SetVolume"));
        let expected: Value = serde_json::json!({"playerid": 1, "volume": 30}).into();
        assert_eq!(send.rpc_params(), Some(&expected));
    }

    #[test]
    fn test_json_reply_path() {
        let cmd = Command::new("volume", "Application.GetProperties")
            .with_kind(CommandKind::Json)
            .with_reply_path("volume")
            .with_item_type(TargetType::Int);
        let reply: Value = serde_json::json!({"volume": 42, "muted": false}).into();
        assert_eq!(cmd.parse_reply(&reply).unwrap(), Value::Int(42));

        let missing = cmd.with_reply_path("speakers.0");
        assert!(matches!(
            missing.parse_reply(&reply).unwrap_err(),
            CommandError::ReplyPath { .. }
        ));
    }

    #[test]
    fn test_expand_pattern_lookup() {
        let table = LookupTable::new(
            "INPUT",
            vec![
                ("SAT/CBL".to_string(), Value::from("sat")),
                ("CD".to_string(), Value::from("cd")),
            ],
        );
        let expanded = expand_pattern("SI({LOOKUP})", Some(&table), &Bounds::Any);
        assert_eq!(expanded, "SI((?:SAT/CBL|CD))");
        assert_eq!(expand_pattern("SI({LOOKUP})", None, &Bounds::Any), "SI({LOOKUP})");
    }

    #[test]
    fn test_invalid_pattern_keeps_command() {
        let cfg: CommandConfig = serde_json::from_value(serde_json::json!({
            "read": true, "opcode": "BP", "reply_token": "BP", "reply_pattern": "BP(("
        }))
        .unwrap();
        let lookups = HashMap::new();
        let ctx = BuildContext {
            family: DeviceFamily::Generic,
            default_kind: CommandKind::ParseStr,
            fail_silent: true,
            lookups: &lookups,
        };
        let cmd = Command::from_config("bp", &cfg, &ctx).unwrap();

        assert!(cmd.reply_pattern().is_none());
        assert!(cmd.has_broken_pattern());
        assert_eq!(
            cmd.build_send(None, &HashMap::new()).unwrap().payload,
            Value::from("BP")
        );
        assert!(matches!(
            cmd.parse_reply(&Value::from("BP1")).unwrap_err(),
            CommandError::NoMatch { .. }
        ));
    }

    #[test]
    fn test_kind_names() {
        for (name, kind) in KINDS {
            assert_eq!(name.parse::<CommandKind>().unwrap(), *kind);
            assert_eq!(kind.name(), *name);
        }
        assert!("http".parse::<CommandKind>().is_err());
    }
}
