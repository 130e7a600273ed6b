//! YAML/JSON encoding of config maps
//!
//! Maps are `serde_json::Map` built with `preserve_order`, so keys keep their
//! insertion order through a decode/encode cycle. Backup files therefore diff
//! cleanly against earlier backups.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// A config value: string keys mapped to arbitrary nested values.
pub type ConfigMap = serde_json::Map<String, Value>;

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

impl Format {
    /// Match a file suffix (with or without the leading dot).
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Determine the format from a file path's suffix.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Format` for any suffix other than
    /// `.yaml`, `.yml` or `.json`.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_suffix)
            .ok_or_else(|| {
                StoreError::format(format!(
                    "config at {} should be a .yaml or .json file",
                    path.display()
                ))
            })
    }

    /// File extension used when this crate creates a file in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Decode a payload into a config map.
///
/// Empty, whitespace-only or null payloads decode to an empty map.
///
/// # Errors
///
/// Returns `StoreError::Format` if the payload is malformed or its top level
/// is not a mapping.
pub fn decode(bytes: &[u8], format: Format) -> Result<ConfigMap, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(ConfigMap::new());
    }

    let value: Value = match format {
        Format::Yaml => serde_yaml::from_slice(bytes)
            .map_err(|e| StoreError::format(format!("invalid yaml: {e}")))?,
        Format::Json => serde_json::from_slice(bytes)
            .map_err(|e| StoreError::format(format!("invalid json: {e}")))?,
    };

    match value {
        Value::Null => Ok(ConfigMap::new()),
        Value::Object(map) => Ok(map),
        other => Err(StoreError::format(format!(
            "expected a {format} mapping, found {}",
            kind_of(&other)
        ))),
    }
}

/// Encode a config map, keeping key insertion order.
pub fn encode(map: &ConfigMap, format: Format) -> Result<Vec<u8>, StoreError> {
    match format {
        Format::Yaml => serde_yaml::to_string(map)
            .map(String::into_bytes)
            .map_err(|e| StoreError::format(format!("cannot encode yaml: {e}"))),
        Format::Json => {
            let mut bytes = serde_json::to_vec_pretty(map)
                .map_err(|e| StoreError::format(format!("cannot encode json: {e}")))?;
            bytes.push(b'\n');
            Ok(bytes)
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
