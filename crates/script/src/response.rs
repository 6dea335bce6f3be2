//! The callback's answer for one row and what the pipeline does with it.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// What a callback returns: `{path = ..., source = ..., error = ...}`.
///
/// All fields are optional. Capitalized keys (`Path`, `Source`, `Error`) are
/// accepted too, and `null` reads as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallbackResponse {
    /// Where to persist the row. Empty means emit only.
    #[serde(default, alias = "Path", deserialize_with = "string_or_null")]
    pub path: String,

    /// The value to emit in place of the input record.
    #[serde(default, alias = "Source")]
    pub source: Value,

    /// Non-empty rejects the row and stops the run.
    #[serde(default, alias = "Error", deserialize_with = "string_or_null")]
    pub error: String,
}

fn string_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}

impl CallbackResponse {
    /// Strict parse of an exported callback value. Only an object is a
    /// response; a sequence would otherwise fill the fields by position.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if !value.is_object() {
            return Err(serde::de::Error::custom(format!(
                "expected a table with path, source and error, got {}",
                kind(&value)
            )));
        }
        serde_json::from_value(value)
    }

    pub fn into_outcome(self) -> RowOutcome {
        if !self.error.is_empty() {
            RowOutcome::Abort(self.error)
        } else if !self.path.is_empty() {
            RowOutcome::Redirect {
                source: self.source,
                path: PathBuf::from(self.path),
            }
        } else {
            RowOutcome::Emit(self.source)
        }
    }
}

/// Decision for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Emit `source`.
    Emit(Value),
    /// Emit `source` and also write it to `path`.
    Redirect { source: Value, path: PathBuf },
    /// Stop the run with this message.
    Abort(String),
}
