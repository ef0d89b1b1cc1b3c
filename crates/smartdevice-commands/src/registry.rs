//! Command registry of one device instance.
//!
//! Built once from a [`FamilyConfig`]; immutable afterwards and safe to share
//! between threads without locking.

use std::collections::HashMap;

use smartdevice_core::{SendData, Value};

use crate::command::{BuildContext, Command, CommandKind, REGEX_TOKEN};
use crate::config::FamilyConfig;
use crate::error::{CommandError, Result};
use crate::family::DeviceFamily;
use crate::lookup::{LookupTable, LookupView};

/// Load options threaded through the registry.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Overrides the family named in the document
    pub family: Option<DeviceFamily>,
    /// Plugin-level parameters available as `{PARAM:<name>}`
    pub plugin_params: HashMap<String, Value>,
    /// Return neutral values instead of conversion errors
    pub fail_silent: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            family: None,
            plugin_params: HashMap::new(),
            fail_silent: true,
        }
    }
}

impl RegistryOptions {
    pub fn with_family(mut self, family: DeviceFamily) -> Self {
        self.family = Some(family);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.plugin_params.insert(name.into(), value.into());
        self
    }

    pub fn strict(mut self) -> Self {
        self.fail_silent = false;
        self
    }
}

/// All commands and lookup tables of one device.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    family: DeviceFamily,
    /// Registration order
    commands: Vec<Command>,
    index: HashMap<String, usize>,
    lookups: HashMap<String, LookupTable>,
    plugin_params: HashMap<String, Value>,
}

impl CommandRegistry {
    /// Load all commands and lookup tables of a family document.
    ///
    /// Problems with individual entries are logged and the entry is skipped;
    /// a load never fails as a whole.
    pub fn load(config: &FamilyConfig, options: RegistryOptions) -> Self {
        let family = options.family.unwrap_or_else(|| {
            config
                .family
                .as_deref()
                .map(|name| {
                    name.parse::<DeviceFamily>().unwrap_or_else(|e| {
                        tracing::error!("{}, using generic converters", e);
                        DeviceFamily::Generic
                    })
                })
                .unwrap_or_default()
        });

        let default_kind = match config.command_class.as_deref() {
            Some(class) => class.parse::<CommandKind>().unwrap_or_else(|e| {
                tracing::error!("{}, using plain commands", e);
                CommandKind::Plain
            }),
            None => CommandKind::Plain,
        };

        let mut lookups = HashMap::new();
        for (name, entry) in &config.lookups {
            match entry.as_object() {
                Some(map) => {
                    lookups.insert(name.clone(), LookupTable::from_json(name.clone(), map));
                }
                None => tracing::warn!("Skipping lookup table '{}': not a mapping", name),
            }
        }

        let mut registry = Self {
            family,
            commands: Vec::new(),
            index: HashMap::new(),
            lookups,
            plugin_params: options.plugin_params,
        };

        let ctx = BuildContext {
            family,
            default_kind,
            fail_silent: options.fail_silent,
            lookups: &registry.lookups,
        };

        let mut commands = Vec::new();
        for (name, entry) in config.command_entries() {
            let built = entry.and_then(|cfg| Command::from_config(&name, &cfg, &ctx));
            match built {
                Ok(command) => commands.push(command),
                Err(e) => tracing::error!("Skipping command '{}': {}", name, e),
            }
        }

        for command in commands {
            registry.insert(command);
        }

        tracing::info!(
            "Loaded {} commands and {} lookup tables for family '{}'",
            registry.commands.len(),
            registry.lookups.len(),
            registry.family
        );
        registry
    }

    /// Build a registry from already constructed parts.
    pub fn from_parts(
        commands: impl IntoIterator<Item = Command>,
        lookups: impl IntoIterator<Item = LookupTable>,
        plugin_params: HashMap<String, Value>,
    ) -> Self {
        let mut registry = Self {
            lookups: lookups
                .into_iter()
                .map(|t| (t.name().to_string(), t))
                .collect(),
            plugin_params,
            ..Self::default()
        };
        for command in commands {
            registry.insert(command);
        }
        registry
    }

    fn insert(&mut self, command: Command) {
        if let Some(&pos) = self.index.get(command.name()) {
            tracing::warn!("Duplicate command '{}', replacing earlier definition", command.name());
            self.commands[pos] = command;
            return;
        }
        self.index.insert(command.name().to_string(), self.commands.len());
        self.commands.push(command);
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    fn require(&self, name: &str) -> Result<&Command> {
        self.command(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))
    }

    /// Command names in registration order.
    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(Command::name)
    }

    /// Commands that can be polled.
    pub fn readable_commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(|c| c.is_readable())
    }

    pub fn lookup(&self, name: &str) -> Option<&LookupTable> {
        self.lookups.get(name)
    }

    /// One view of a lookup table, e.g. the value list for a UI selector.
    pub fn lookup_view(&self, name: &str, view: LookupView) -> Option<Value> {
        self.lookups.get(name).map(|t| t.view(view))
    }

    fn table_for(&self, command: &Command) -> Result<Option<&LookupTable>> {
        match command.lookup() {
            Some(table) => self
                .lookups
                .get(table)
                .map(Some)
                .ok_or_else(|| CommandError::UnknownLookup {
                    command: command.name().to_string(),
                    table: table.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Whether `name` is configured, and optionally readable or writable.
    ///
    /// `read = None` only checks existence; `Some(true)` asks for
    /// readability and `Some(false)` for writability.
    pub fn is_valid_command(&self, name: &str, read: Option<bool>) -> bool {
        match (self.command(name), read) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(c), Some(true)) => c.is_readable(),
            (Some(c), Some(false)) => c.is_writable(),
        }
    }

    /// Build the outgoing request for a command.
    ///
    /// `None` builds a read request. With a lookup table the value is first
    /// mapped to its device token, ignoring the case of strings.
    pub fn get_send_data(&self, name: &str, value: Option<Value>) -> Result<SendData> {
        let command = self.require(name)?;

        let value = match (value, self.table_for(command)?) {
            (Some(value), Some(table)) => {
                let token = table.reverse_ci(&value).ok_or_else(|| CommandError::LookupMiss {
                    command: name.to_string(),
                    table: table.name().to_string(),
                    value: value.to_string(),
                })?;
                Some(Value::from(token))
            }
            (value, _) => value,
        };

        command.build_send(value.as_ref(), &self.plugin_params)
    }

    /// Convert a device reply into the logical value for the item.
    pub fn get_shng_data(&self, name: &str, data: impl Into<Value>) -> Result<Value> {
        let command = self.require(name)?;
        let value = command.parse_reply(&data.into())?;

        match self.table_for(command)? {
            Some(table) => {
                let token = value.to_string();
                table
                    .forward(&token)
                    .cloned()
                    .ok_or_else(|| CommandError::LookupMiss {
                        command: name.to_string(),
                        table: table.name().to_string(),
                        value: token,
                    })
            }
            None => Ok(value),
        }
    }

    /// Identify the command that produced an unsolicited reply.
    ///
    /// Commands are tried in registration order and tokens in configured
    /// order. A `REGEX` token matches through the command's reply pattern and
    /// never matches when that pattern failed to compile; any other token
    /// must be a non-empty prefix of `raw`.
    pub fn get_command_from_reply(&self, raw: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|command| {
                command.reply_tokens().iter().any(|token| {
                    if token == REGEX_TOKEN {
                        return command
                            .reply_pattern()
                            .is_some_and(|pattern| pattern.is_match(raw));
                    }
                    !token.is_empty() && raw.starts_with(token.as_str())
                })
            })
            .map(Command::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CommandRegistry {
        let doc = r#"{
            "family": "denon",
            "command_class": "parse_str",
            "commands": {
                "power": {
                    "read": true, "write": true, "opcode": "PW",
                    "read_cmd": "PW?", "write_cmd": "PW{VALUE}",
                    "dev_datatype": "power", "reply_token": "PW",
                    "reply_pattern": "PW(ON|STANDBY)"
                },
                "input": {
                    "read": true, "write": true, "opcode": "SI",
                    "read_cmd": "SI?", "write_cmd": "SI{VALUE}",
                    "lookup": "INPUT", "reply_token": "REGEX",
                    "reply_pattern": "^SI({LOOKUP})$"
                },
                "bad_class": {"read": true, "opcode": "X", "command_class": "soap"}
            },
            "lookups": {
                "INPUT": {"CD": "cd", "TUNER": "Tuner"},
                "BROKEN": "not a table"
            }
        }"#;
        let cfg = FamilyConfig::from_json_str(doc).unwrap();
        CommandRegistry::load(&cfg, RegistryOptions::default())
    }

    #[test]
    fn test_load_skips_bad_entries() {
        let reg = registry();
        assert_eq!(reg.command_names().collect::<Vec<_>>(), vec!["power", "input"]);
        assert!(reg.lookup("INPUT").is_some());
        assert!(reg.lookup("BROKEN").is_none());
        assert_eq!(reg.family(), DeviceFamily::Denon);
    }

    #[test]
    fn test_unknown_command() {
        let reg = registry();
        assert!(!reg.is_valid_command("volume", None));
        assert_eq!(
            reg.get_send_data("volume", None).unwrap_err(),
            CommandError::UnknownCommand("volume".to_string())
        );
        assert!(matches!(
            reg.get_shng_data("volume", "MV50").unwrap_err(),
            CommandError::UnknownCommand(_)
        ));
    }

    #[test]
    fn test_lookup_send_and_receive() {
        let reg = registry();
        let send = reg.get_send_data("input", Some(Value::from("tuner"))).unwrap();
        assert_eq!(send.payload, Value::from("SITUNER"));

        assert_eq!(reg.get_shng_data("input", "SICD").unwrap(), Value::from("cd"));

        assert!(matches!(
            reg.get_send_data("input", Some(Value::from("dvd"))).unwrap_err(),
            CommandError::LookupMiss { .. }
        ));
    }

    #[test]
    fn test_reply_resolution() {
        let reg = registry();
        assert_eq!(reg.get_command_from_reply("PWON"), Some("power"));
        assert_eq!(reg.get_command_from_reply("SITUNER"), Some("input"));
        assert_eq!(reg.get_command_from_reply("SIDVD"), None);
        assert_eq!(reg.get_command_from_reply("MV50"), None);
    }

    #[test]
    fn test_lookup_view() {
        let reg = registry();
        assert_eq!(
            reg.lookup_view("INPUT", LookupView::List),
            Some(Value::List(vec![Value::from("cd"), Value::from("Tuner")]))
        );
        assert_eq!(reg.lookup_view("MISSING", LookupView::List), None);
    }
}
