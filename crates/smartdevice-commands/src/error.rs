//! Error types for the command layer.

use smartdevice_core::TargetType;

/// Converter failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    /// Value cannot be coerced into the requested target type
    #[error("Cannot coerce {from} value '{value}' to {target}")]
    Coerce {
        from: &'static str,
        value: String,
        target: TargetType,
    },

    /// Value is outside the domain of a datatype
    #[error("Datatype '{datatype}' cannot convert '{value}': {reason}")]
    Invalid {
        datatype: String,
        value: String,
        reason: String,
    },
}

impl ConversionError {
    pub(crate) fn invalid(
        datatype: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            datatype: datatype.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Opcode template expansion failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown plugin parameter in template: {0}")]
    UnknownParameter(String),

    #[error("Placeholder expansion of '{template}' did not converge after {passes} passes")]
    NoConvergence { template: String, passes: usize },

    #[error("Cannot format write template '{template}': {reason}")]
    Format { template: String, reason: String },
}

/// Load-time configuration problems.
///
/// Most of these are logged and degraded by the registry; only malformed
/// documents abort a load.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid device family document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown command class '{class}' for command '{command}'")]
    UnknownCommandClass { command: String, class: String },

    #[error("Invalid reply pattern for command '{command}': {reason}")]
    InvalidPattern { command: String, reason: String },

    #[error("Invalid bounds for command '{command}': {reason}")]
    InvalidBounds { command: String, reason: String },

    #[error("Invalid definition for command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },
}

/// Per-call failures surfaced to the device layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Value {value} rejected by command '{command}', bounds: {bounds}")]
    ValueRejected {
        command: String,
        value: String,
        bounds: String,
    },

    #[error("Reply '{raw}' does not match pattern '{pattern}' of command '{command}'")]
    NoMatch {
        command: String,
        pattern: String,
        raw: String,
    },

    #[error("Pattern '{pattern}' of command '{command}' has {groups} capture groups, at most one allowed")]
    AmbiguousMatch {
        command: String,
        pattern: String,
        groups: usize,
    },

    #[error("Value '{value}' not found in lookup table '{table}' for command '{command}'")]
    LookupMiss {
        command: String,
        table: String,
        value: String,
    },

    #[error("Lookup table '{table}' of command '{command}' is not loaded")]
    UnknownLookup { command: String, table: String },

    #[error("Path '{path}' not found in reply for command '{command}'")]
    ReplyPath { command: String, path: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommandError::UnknownCommand("power".to_string());
        assert!(err.to_string().contains("power"));

        let err = CommandError::ValueRejected {
            command: "volume".to_string(),
            value: "11".to_string(),
            bounds: "0..=10".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("volume"));
        assert!(text.contains("11"));
        assert!(text.contains("0..=10"));
    }

    #[test]
    fn test_conversion_error_wraps() {
        let conv = ConversionError::invalid("onoff", "MAYBE", "unknown token");
        let err: CommandError = conv.clone().into();
        assert_eq!(err, CommandError::Conversion(conv));
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ConfigError = json_err.into();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
