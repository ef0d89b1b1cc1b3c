//! Placeholder expansion for opcodes and command strings.
//!
//! Recognised tokens: `{OPCODE}`, `{PARAM:<name>}`, `{VALUE}` and
//! `{RAW_VALUE}`. Expansion runs in passes because a plugin parameter may
//! itself contain tokens; it stops once a pass replaces nothing.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use smartdevice_core::config::defaults;
use smartdevice_core::Value;

use crate::error::TemplateError;

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(OPCODE|VALUE|RAW_VALUE|PARAM:(\w+))\}").expect("Invalid regex pattern")
});

/// Substitutions available to one expansion.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub opcode: &'a str,
    /// Converter wire form of the written value; `None` on reads
    pub value: Option<&'a str>,
    /// Unconverted written value; `None` on reads
    pub raw_value: Option<&'a str>,
    pub params: &'a HashMap<String, Value>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(opcode: &'a str, params: &'a HashMap<String, Value>) -> Self {
        Self {
            opcode,
            value: None,
            raw_value: None,
            params,
        }
    }

    pub fn with_value(mut self, value: &'a str, raw_value: &'a str) -> Self {
        self.value = Some(value);
        self.raw_value = Some(raw_value);
        self
    }
}

/// Expand all tokens in `template`.
///
/// Tokens without a substitution (`{VALUE}` on a read) are left in place.
pub fn expand(template: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
    let mut current = template.to_string();

    for _ in 0..defaults::TEMPLATE_MAX_PASSES {
        let mut replaced = false;
        let mut missing = None;

        let next = TOKEN_REGEX.replace_all(&current, |caps: &Captures<'_>| {
            let substitution = match (&caps[1], caps.get(2)) {
                ("OPCODE", _) => Some(ctx.opcode.to_string()),
                ("VALUE", _) => ctx.value.map(str::to_string),
                ("RAW_VALUE", _) => ctx.raw_value.map(str::to_string),
                (_, Some(name)) => match ctx.params.get(name.as_str()) {
                    Some(v) => Some(v.to_string()),
                    None => {
                        missing.get_or_insert_with(|| name.as_str().to_string());
                        None
                    }
                },
                _ => None,
            };
            match substitution {
                Some(text) => {
                    replaced = true;
                    text
                }
                None => caps[0].to_string(),
            }
        });

        if let Some(name) = missing {
            return Err(TemplateError::UnknownParameter(name));
        }
        if !replaced {
            return Ok(current);
        }
        current = next.into_owned();
    }

    // One more pass must be a no-op for the result to be final
    if TOKEN_REGEX.captures_iter(&current).any(|caps| match (&caps[1], caps.get(2)) {
        ("OPCODE", _) => true,
        ("VALUE", _) => ctx.value.is_some(),
        ("RAW_VALUE", _) => ctx.raw_value.is_some(),
        _ => true,
    }) {
        return Err(TemplateError::NoConvergence {
            template: template.to_string(),
            passes: defaults::TEMPLATE_MAX_PASSES,
        });
    }
    Ok(current)
}

/// Whether `write_cmd` uses the `:expr:` format form.
pub fn is_format_expr(write_cmd: &str) -> bool {
    write_cmd.len() >= 2 && write_cmd.starts_with(':') && write_cmd.ends_with(':')
}

/// Format an `:expr:` write command once with the single slot `VALUE`.
///
/// Format specs use `strfmt` syntax, e.g. `:MV{VALUE:0>2}:`.
pub fn format_expr(write_cmd: &str, value: &str) -> Result<String, TemplateError> {
    let inner = &write_cmd[1..write_cmd.len() - 1];
    let mut vars = HashMap::new();
    vars.insert("VALUE".to_string(), value.to_string());
    strfmt::strfmt(inner, &vars).map_err(|e| TemplateError::Format {
        template: write_cmd.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HashMap<String, Value> {
        let mut p = HashMap::new();
        p.insert("zone".to_string(), Value::from("Z2"));
        p.insert("prefix".to_string(), Value::from("{PARAM:zone}"));
        p.insert("loop".to_string(), Value::from("{PARAM:loop}"));
        p
    }

    #[test]
    fn test_expand_opcode_and_value() {
        let p = params();
        let ctx = TemplateContext::new("MV", &p).with_value("50", "50.0");
        assert_eq!(expand("{OPCODE}{VALUE}", &ctx).unwrap(), "MV50");
        assert_eq!(expand("{RAW_VALUE}", &ctx).unwrap(), "50.0");
    }

    #[test]
    fn test_value_left_untouched_on_read() {
        let p = params();
        let ctx = TemplateContext::new("MV", &p);
        assert_eq!(expand("{OPCODE}{VALUE}", &ctx).unwrap(), "MV{VALUE}");
    }

    #[test]
    fn test_nested_parameter() {
        let p = params();
        let ctx = TemplateContext::new("PW", &p);
        assert_eq!(expand("{PARAM:prefix}{OPCODE}?", &ctx).unwrap(), "Z2PW?");
    }

    #[test]
    fn test_unknown_parameter() {
        let p = params();
        let ctx = TemplateContext::new("PW", &p);
        assert_eq!(
            expand("{PARAM:host}", &ctx).unwrap_err(),
            TemplateError::UnknownParameter("host".to_string())
        );
    }

    #[test]
    fn test_self_referencing_parameter_does_not_converge() {
        let p = params();
        let ctx = TemplateContext::new("PW", &p);
        assert!(matches!(
            expand("{PARAM:loop}", &ctx).unwrap_err(),
            TemplateError::NoConvergence { .. }
        ));
    }

    #[test]
    fn test_format_expr() {
        assert!(is_format_expr(":MV{VALUE}:"));
        assert!(!is_format_expr(":"));
        assert!(!is_format_expr("MV{VALUE}"));
        assert_eq!(format_expr(":MV{VALUE:0>3}:", "5").unwrap(), "MV005");
    }
}
