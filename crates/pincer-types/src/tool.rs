//! Tool-calling types: tagged argument values, argument maps and tool
//! definitions with schema validation.
//!
//! Backends send tool arguments as a JSON string. They are decoded into
//! [`ToolArguments`], a map of parameter name to [`ToolValue`], and checked
//! against the tool's declared JSON schema before the tool runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved argument key holding the verbatim argument text when the
/// backend sent something that is not a JSON object.
pub const RAW_ARGUMENTS_KEY: &str = "raw";

/// A single tool argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<ToolValue>),
    Object(BTreeMap<String, ToolValue>),
}

impl ToolValue {
    /// Name of the JSON schema type this value satisfies most narrowly.
    pub fn type_name(&self) -> &'static str {
        match self {
            ToolValue::Null => "null",
            ToolValue::Bool(_) => "boolean",
            ToolValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
            ToolValue::Number(_) => "number",
            ToolValue::String(_) => "string",
            ToolValue::Array(_) => "array",
            ToolValue::Object(_) => "object",
        }
    }

    /// Whether this value satisfies a JSON schema `type` keyword.
    pub fn matches_type(&self, expected: &str) -> bool {
        match (expected, self) {
            ("number", ToolValue::Number(_)) => true,
            ("integer", ToolValue::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (other, value) => other == value.type_name(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ToolValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ToolValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ToolValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for ToolValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ToolValue::Null,
            serde_json::Value::Bool(b) => ToolValue::Bool(b),
            serde_json::Value::Number(n) => ToolValue::Number(n),
            serde_json::Value::String(s) => ToolValue::String(s),
            serde_json::Value::Array(items) => {
                ToolValue::Array(items.into_iter().map(ToolValue::from).collect())
            }
            serde_json::Value::Object(map) => ToolValue::Object(
                map.into_iter().map(|(k, v)| (k, ToolValue::from(v))).collect(),
            ),
        }
    }
}

impl From<ToolValue> for serde_json::Value {
    fn from(value: ToolValue) -> Self {
        match value {
            ToolValue::Null => serde_json::Value::Null,
            ToolValue::Bool(b) => serde_json::Value::Bool(b),
            ToolValue::Number(n) => serde_json::Value::Number(n),
            ToolValue::String(s) => serde_json::Value::String(s),
            ToolValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            ToolValue::Object(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for ToolValue {
    fn from(s: &str) -> Self {
        ToolValue::String(s.to_string())
    }
}

impl From<String> for ToolValue {
    fn from(s: String) -> Self {
        ToolValue::String(s)
    }
}

impl From<bool> for ToolValue {
    fn from(b: bool) -> Self {
        ToolValue::Bool(b)
    }
}

impl From<i64> for ToolValue {
    fn from(n: i64) -> Self {
        ToolValue::Number(n.into())
    }
}

/// Arguments of one tool call, keyed by parameter name.
///
/// Arguments the backend sent as something other than a JSON object are
/// kept verbatim under [`RAW_ARGUMENTS_KEY`] and flagged as malformed, so a
/// real parameter that happens to be named `raw` is never confused with them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ArgumentsRepr", into = "ArgumentsRepr")]
pub struct ToolArguments {
    values: BTreeMap<String, ToolValue>,
    malformed: bool,
}

/// Stored form: an object for decoded arguments, a string for malformed ones.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ArgumentsRepr {
    Decoded(BTreeMap<String, ToolValue>),
    Malformed(String),
}

impl From<ArgumentsRepr> for ToolArguments {
    fn from(repr: ArgumentsRepr) -> Self {
        match repr {
            ArgumentsRepr::Decoded(values) => Self {
                values,
                malformed: false,
            },
            ArgumentsRepr::Malformed(text) => Self::raw(text),
        }
    }
}

impl From<ToolArguments> for ArgumentsRepr {
    fn from(args: ToolArguments) -> Self {
        match args.raw_text() {
            Some(text) => ArgumentsRepr::Malformed(text.to_string()),
            None => ArgumentsRepr::Decoded(args.values),
        }
    }
}

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the JSON argument string a backend sent.
    ///
    /// Empty input yields an empty map. Anything that is not a JSON object
    /// is kept verbatim under [`RAW_ARGUMENTS_KEY`].
    pub fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::new();
        }
        match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(text) {
            Ok(map) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            Err(_) => Self::raw(text),
        }
    }

    /// Malformed arguments holding the verbatim text.
    pub fn raw(text: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(RAW_ARGUMENTS_KEY.to_string(), ToolValue::String(text.into()));
        Self {
            values,
            malformed: true,
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// The verbatim argument text, when decoding failed.
    pub fn raw_text(&self) -> Option<&str> {
        if self.malformed {
            self.get_str(RAW_ARGUMENTS_KEY)
        } else {
            None
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ToolValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ToolValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolValue)> {
        self.values.iter()
    }

    /// Encode back into the JSON argument string used on the wire.
    pub fn to_json_string(&self) -> String {
        if let Some(raw) = self.raw_text() {
            return raw.to_string();
        }
        serde_json::to_string(&self.values).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromIterator<(String, ToolValue)> for ToolArguments {
    fn from_iter<I: IntoIterator<Item = (String, ToolValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            malformed: false,
        }
    }
}

/// Declaration of a tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object.
    pub parameters: serde_json::Value,
}

/// Why a set of arguments was rejected before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolArgumentError {
    #[error("arguments are not a JSON object: {0}")]
    Malformed(String),

    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{name}' must be of type {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

impl ToolDefinition {
    /// Check `args` against the declared parameter schema.
    ///
    /// Only the top level is checked: required parameters must be present
    /// and declared parameters must match their `type`. Unknown parameters
    /// are passed through.
    pub fn validate(&self, args: &ToolArguments) -> Result<(), ToolArgumentError> {
        let properties = self.parameters.get("properties");

        if let Some(raw) = args.raw_text() {
            let declares_raw = properties.is_some_and(|p| p.get(RAW_ARGUMENTS_KEY).is_some());
            if !declares_raw {
                return Err(ToolArgumentError::Malformed(raw.to_string()));
            }
        }

        if let Some(required) = self.parameters.get("required").and_then(|r| r.as_array()) {
            for name in required.iter().filter_map(|n| n.as_str()) {
                if !args.contains(name) {
                    return Err(ToolArgumentError::MissingParameter(name.to_string()));
                }
            }
        }

        let Some(properties) = properties else {
            return Ok(());
        };
        for (name, value) in args.iter() {
            let Some(expected) = properties
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if !value.matches_type(expected) {
                return Err(ToolArgumentError::TypeMismatch {
                    name: name.clone(),
                    expected: expected.to_string(),
                    actual: value.type_name().to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ToolArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_string())
    }
}
