//! Single entry point for loading a config map
//!
//! [`fetch`] accepts an in-memory map, a file path, or a hierarchical key and
//! dispatches to a copy, a file read, or a coordination-service session.

use crate::codec::{self, ConfigMap, Format};
use crate::context::ConfigContext;
use crate::remote::RemoteSession;
use crate::store::{ConfigStore, StoreError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Anything [`fetch`] can resolve
#[derive(Debug, Clone, Copy)]
pub enum FetchArg<'a> {
    /// Already-loaded map, returned as a copy
    Map(&'a ConfigMap),
    /// Filesystem path
    Path(&'a Path),
    /// File path or hierarchical key, decided by its shape
    Text(&'a str),
    /// Dynamically typed input: an object is a map, a string is text
    Value(&'a Value),
}

impl<'a> From<&'a ConfigMap> for FetchArg<'a> {
    fn from(map: &'a ConfigMap) -> Self {
        Self::Map(map)
    }
}

impl<'a> From<&'a Path> for FetchArg<'a> {
    fn from(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for FetchArg<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Self::Path(path.as_path())
    }
}

impl<'a> From<&'a str> for FetchArg<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for FetchArg<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(text.as_str())
    }
}

impl<'a> From<&'a Value> for FetchArg<'a> {
    fn from(value: &'a Value) -> Self {
        Self::Value(value)
    }
}

/// Resolve `arg` to a config map.
///
/// - a map is returned as a copy
/// - a path that exists as a file, or ends in `.yaml`, `.yml` or `.json`,
///   is read and decoded
/// - other text is normalized to a `/`-rooted key and read through a
///   recorded [`RemoteSession`]
///
/// # Errors
///
/// `InvalidArgument` for a non-file path without a recognized suffix, empty
/// text, or a value that is neither an object nor a string. Otherwise the
/// error of the file read or session.
pub fn fetch<'a>(ctx: &ConfigContext, arg: impl Into<FetchArg<'a>>) -> Result<ConfigMap, StoreError> {
    match arg.into() {
        FetchArg::Map(map) => Ok(map.clone()),
        FetchArg::Path(path) => {
            if is_file_like(path) {
                from_file(path)
            } else {
                Err(StoreError::InvalidArgument {
                    message: format!(
                        "{} is not a file and has no .yaml, .yml or .json suffix",
                        path.display()
                    ),
                })
            }
        }
        FetchArg::Text(text) => fetch_text(ctx, text),
        FetchArg::Value(Value::Object(map)) => Ok(map.clone()),
        FetchArg::Value(Value::String(text)) => fetch_text(ctx, text),
        FetchArg::Value(other) => Err(StoreError::InvalidArgument {
            message: format!("cannot fetch config from {other}"),
        }),
    }
}

fn fetch_text(ctx: &ConfigContext, text: &str) -> Result<ConfigMap, StoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidArgument {
            message: "empty config key".to_string(),
        });
    }
    let path = Path::new(trimmed);
    if is_file_like(path) {
        return from_file(path);
    }
    from_zk(ctx, &normalize_key(trimmed))
}

fn is_file_like(path: &Path) -> bool {
    path.is_file() || Format::from_path(path).is_ok()
}

/// Turn text into a hierarchical key: backslashes become slashes and a
/// leading slash is added if missing.
pub fn normalize_key(text: &str) -> String {
    let key = text.replace('\\', "/");
    if key.starts_with('/') {
        key
    } else {
        format!("/{key}")
    }
}

/// Read `key` through a recorded session, falling back to the backup when
/// the coordination service is unreachable.
pub fn from_zk(ctx: &ConfigContext, key: &str) -> Result<ConfigMap, StoreError> {
    let session = RemoteSession::open(ctx)?;
    debug!("Fetching {key} from {}", session.backend_kind());
    session.get(key)
}

/// Read and decode a `.yaml`, `.yml` or `.json` file.
pub fn from_file(path: &Path) -> Result<ConfigMap, StoreError> {
    let format = Format::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    codec::decode(&bytes, format)
}

/// Write `map` to a `.yaml`, `.yml` or `.json` file, creating parent
/// directories.
pub fn dump_file(map: &ConfigMap, path: &Path) -> Result<(), StoreError> {
    let format = Format::from_path(path)?;
    let bytes = codec::encode(map, format)?;
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, bytes).map_err(io_error)?;
    debug!("Wrote config to {}", path.display());
    Ok(())
}
