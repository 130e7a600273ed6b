//! Scoped sessions over the coordination service
//!
//! Opening a session probes the coordination host, then tries to connect:
//!
//! ```text
//! open ──probe──▶ unreachable ─────────────────────────▶ Fallback(backup)
//!        │
//!        └──────▶ reachable ──connect──▶ ok ───────────▶ Connected(client)
//!                                 ├────▶ unreachable/timeout ▶ Fallback(backup)
//!                                 └────▶ anything else ──▶ Err(Backend)
//! ```
//!
//! Callers see the same get/set/delete surface in both modes. Only reads
//! and writes served by a connected client are written to the session
//! record; backup hits are not session fetches. Every request made while
//! connected is bounded by `coordination.request_timeout_ms`. Dropping a
//! connected session disconnects it.

use super::client::{ClientError, CoordinationClient, child_path};
use super::deadline::DeadlineClient;
use crate::codec::{self, ConfigMap, Format};
use crate::context::ConfigContext;
use crate::store::{BackendKind, ConfigStore, LocalStore, StoreError};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a node in the hierarchy holds
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    /// Node carries a config value
    Leaf(ConfigMap),
    /// Node only groups children
    Container,
}

/// Backend selected when the session was opened
pub enum Backend {
    /// Live client, disconnected when the session drops
    Connected(Box<dyn CoordinationClient>),
    /// Local backup serving every operation
    Fallback(Arc<LocalStore>),
}

/// One scoped session, exclusively owned by its caller
pub struct RemoteSession {
    backend: Backend,
    record: Option<Arc<LocalStore>>,
}

impl RemoteSession {
    /// Open a session that records fetched keys in the session record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` only when connecting fails for a reason
    /// other than the service being unreachable or timing out.
    pub fn open(ctx: &ConfigContext) -> Result<Self, StoreError> {
        Self::open_with(ctx, true)
    }

    /// Open a session that leaves the session record untouched (used for
    /// internal traffic such as backups).
    pub fn open_unrecorded(ctx: &ConfigContext) -> Result<Self, StoreError> {
        Self::open_with(ctx, false)
    }

    pub fn open_with(ctx: &ConfigContext, record_accesses: bool) -> Result<Self, StoreError> {
        let settings = &ctx.settings().coordination;

        if !ctx.probe().is_reachable(&settings.probe_host) {
            warn!(
                "Could not reach {}, using local backup {}",
                settings.probe_host,
                ctx.backup().path().display()
            );
            return Ok(Self::fallback(ctx));
        }

        let mut client = ctx.clients().create(settings);
        match client.connect(settings.connect_timeout()) {
            Ok(()) => {
                debug!("Connected to zookeeper server {}", client.hosts());
                let hosts = client.hosts().to_string();
                let client = DeadlineClient::spawn(client, settings.request_timeout())
                    .map_err(|e| StoreError::Backend {
                        message: format!("starting request worker for {hosts}: {e}"),
                    })?;
                Ok(Self {
                    backend: Backend::Connected(Box::new(client)),
                    record: record_accesses.then(|| Arc::clone(ctx.session_record())),
                })
            }
            Err(e) if e.is_connectivity() => {
                warn!("Could not connect to zookeeper server {}: {e}", client.hosts());
                Ok(Self::fallback(ctx))
            }
            Err(e) => {
                if client.is_connected() {
                    let _ = client.disconnect();
                }
                Err(StoreError::Backend {
                    message: format!("connecting to {}: {e}", client.hosts()),
                })
            }
        }
    }

    fn fallback(ctx: &ConfigContext) -> Self {
        Self {
            backend: Backend::Fallback(Arc::clone(ctx.backup())),
            record: None,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Returns `true` if this session is served by the local backup.
    pub fn is_fallback(&self) -> bool {
        matches!(self.backend, Backend::Fallback(_))
    }

    pub fn backend_kind(&self) -> BackendKind {
        match self.backend {
            Backend::Connected(_) => BackendKind::Coordination,
            Backend::Fallback(_) => BackendKind::LocalFile,
        }
    }

    /// Child names of `path`.
    ///
    /// In fallback mode children are derived from the backup's keys.
    pub fn list_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        match &self.backend {
            Backend::Connected(client) => client
                .list_children(path)
                .map_err(|e| remote_error(client.as_ref(), path, e)),
            Backend::Fallback(backup) => Ok(backup_children(backup, path)),
        }
    }

    /// Classify `path` as a leaf carrying a value or a pure container.
    ///
    /// A node whose payload is absent or decodes to an empty map is a
    /// container. Only a missing node is `KeyNotFound`; any other backend
    /// failure surfaces as `StoreError::Backend`.
    pub fn node(&self, path: &str) -> Result<NodeContent, StoreError> {
        match &self.backend {
            Backend::Connected(client) => {
                let bytes = client
                    .get_node(path)
                    .map_err(|e| remote_error(client.as_ref(), path, e))?;
                let value = codec::decode(bytes.as_deref().unwrap_or_default(), Format::Yaml)?;
                if value.is_empty() {
                    return Ok(NodeContent::Container);
                }
                self.record(path, &value);
                Ok(NodeContent::Leaf(value))
            }
            Backend::Fallback(backup) => {
                if backup.contains(path) || backup_children(backup, path).is_empty() {
                    return backup.get(path).map(NodeContent::Leaf);
                }
                Ok(NodeContent::Container)
            }
        }
    }

    fn record(&self, key: &str, value: &ConfigMap) {
        if let Some(record) = &self.record {
            let _ = record.set(key, value.clone());
        }
    }
}

impl ConfigStore for RemoteSession {
    fn get(&self, key: &str) -> Result<ConfigMap, StoreError> {
        match &self.backend {
            Backend::Connected(client) => {
                let bytes = client.get_node(key).map_err(|e| {
                    debug!("Reading {key} from {} failed: {e}", client.hosts());
                    not_found(client.as_ref(), key)
                })?;
                let value = codec::decode(bytes.as_deref().unwrap_or_default(), Format::Yaml)?;
                self.record(key, &value);
                Ok(value)
            }
            Backend::Fallback(backup) => backup.get(key),
        }
    }

    fn set(&self, key: &str, value: ConfigMap) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Connected(client) => {
                client
                    .ensure_path(key)
                    .map_err(|e| remote_error(client.as_ref(), key, e))?;
                let bytes = codec::encode(&value, Format::Yaml)?;
                client
                    .set_node(key, &bytes)
                    .map_err(|e| remote_error(client.as_ref(), key, e))?;
                self.record(key, &value);
                Ok(())
            }
            Backend::Fallback(backup) => backup.set(key, value),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Connected(client) => client.delete_node(key).map_err(|e| {
                debug!("Deleting {key} from {} failed: {e}", client.hosts());
                not_found(client.as_ref(), key)
            }),
            Backend::Fallback(backup) => backup.delete(key),
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if let Backend::Connected(client) = &mut self.backend {
            if !client.is_connected() {
                return;
            }
            match client.disconnect() {
                Ok(()) => debug!("Disconnected from zookeeper server {}", client.hosts()),
                Err(e) => warn!("Failed to disconnect from {}: {e}", client.hosts()),
            }
        }
    }
}

fn not_found(client: &dyn CoordinationClient, key: &str) -> StoreError {
    StoreError::KeyNotFound {
        backend: BackendKind::Coordination,
        key: key.to_string(),
        location: client.hosts().to_string(),
    }
}

fn remote_error(client: &dyn CoordinationClient, path: &str, error: ClientError) -> StoreError {
    match error {
        ClientError::NoNode { .. } => not_found(client, path),
        other => StoreError::Backend {
            message: format!("{path} on {}: {other}", client.hosts()),
        },
    }
}

fn backup_children(backup: &LocalStore, path: &str) -> Vec<String> {
    let prefix = child_path(path, "");
    let mut children: Vec<String> = Vec::new();
    for key in backup.keys() {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        if let Some(name) = rest.split('/').next().filter(|n| !n.is_empty()) {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
    }
    children
}
