// src/types.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transform technology behind a codemod.
///
/// `jscodeshift` and `ts-morph` share the same per-file execution model, so
/// both map to `JsTransform`. `piranha` is recognised only to be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    JsTransform,
    Filemod,
    AstGrep,
    Recipe,
    Unsupported,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineKind::JsTransform => "js-transform",
            EngineKind::Filemod => "filemod",
            EngineKind::AstGrep => "ast-grep",
            EngineKind::Recipe => "recipe",
            EngineKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jscodeshift" | "ts-morph" | "js-transform" => Ok(EngineKind::JsTransform),
            "filemod" => Ok(EngineKind::Filemod),
            "ast-grep" => Ok(EngineKind::AstGrep),
            "recipe" => Ok(EngineKind::Recipe),
            "piranha" => Ok(EngineKind::Unsupported),
            other => Err(format!(
                "invalid engine: {other} (expected \"jscodeshift\", \"ts-morph\", \"filemod\", \"ast-grep\" or \"recipe\")"
            )),
        }
    }
}

/// A single primitive argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl ArgumentValue {
    /// Parse a command-line value: `true`/`false`, then a number, then a string.
    pub fn parse_cli(raw: &str) -> Self {
        match raw {
            "true" => return ArgumentValue::Bool(true),
            "false" => return ArgumentValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = raw.parse::<i64>() {
            return ArgumentValue::Number(n.into());
        }
        if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return ArgumentValue::Number(n);
        }
        ArgumentValue::String(raw.to_string())
    }
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        ArgumentValue::String(value.to_string())
    }
}

impl From<bool> for ArgumentValue {
    fn from(value: bool) -> Self {
        ArgumentValue::Bool(value)
    }
}

impl From<i64> for ArgumentValue {
    fn from(value: i64) -> Self {
        ArgumentValue::Number(value.into())
    }
}

/// Validated parameter map handed unchanged to every engine invocation.
///
/// A `BTreeMap` keeps the JSON encoding stable, which matters because the
/// record is part of the hashed Case payload.
pub type ArgumentRecord = BTreeMap<String, ArgumentValue>;

/// Parse an argument record from JSON, rejecting nested values.
pub fn parse_argument_record(bytes: &[u8]) -> Result<ArgumentRecord, String> {
    serde_json::from_slice::<ArgumentRecord>(bytes).map_err(|e| format!("invalid argument record: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_aliases_map_to_closed_kinds() {
        assert_eq!("jscodeshift".parse::<EngineKind>().unwrap(), EngineKind::JsTransform);
        assert_eq!("ts-morph".parse::<EngineKind>().unwrap(), EngineKind::JsTransform);
        assert_eq!("Piranha".parse::<EngineKind>().unwrap(), EngineKind::Unsupported);
        assert!("workflow".parse::<EngineKind>().is_err());
    }

    #[test]
    fn cli_values_prefer_bool_then_number() {
        assert_eq!(ArgumentValue::parse_cli("true"), ArgumentValue::Bool(true));
        assert_eq!(ArgumentValue::parse_cli("42"), ArgumentValue::Number(42.into()));
        assert_eq!(ArgumentValue::parse_cli("1.5").to_string_lossy(), "1.5");
        assert_eq!(ArgumentValue::parse_cli("abc"), ArgumentValue::from("abc"));
    }

    #[test]
    fn nested_records_are_rejected() {
        assert!(parse_argument_record(br#"{"a":1,"b":"x","c":false}"#).is_ok());
        assert!(parse_argument_record(br#"{"a":{"nested":1}}"#).is_err());
        assert!(parse_argument_record(br#"{"a":[1]}"#).is_err());
    }

    impl ArgumentValue {
        fn to_string_lossy(&self) -> String {
            match self {
                ArgumentValue::Bool(b) => b.to_string(),
                ArgumentValue::Number(n) => n.to_string(),
                ArgumentValue::String(s) => s.clone(),
            }
        }
    }
}
