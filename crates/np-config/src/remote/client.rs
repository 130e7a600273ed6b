//! Coordination-service client contract
//!
//! The wire protocol is someone else's problem. A client only has to offer
//! connect/disconnect plus node get/set/delete/ensure/list over
//! slash-delimited paths. Implementations include an in-memory tree
//! (fixtures and tests) and ZooKeeper (behind the `zookeeper` feature).

use crate::settings::CoordinationSettings;
use std::time::Duration;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Service could not be reached at all
    #[error("Coordination service {hosts} unreachable: {message}")]
    Unreachable { hosts: String, message: String },

    /// Connect or request did not complete in time
    #[error("Coordination service {hosts} timed out after {after:?}")]
    Timeout { hosts: String, after: Duration },

    /// Node does not exist
    #[error("No node at {path}")]
    NoNode { path: String },

    /// Anything else the service reported
    #[error("{message}")]
    Other { message: String },
}

impl ClientError {
    /// Unreachable and timeout conditions degrade to the local backup;
    /// everything else propagates.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}

/// A single client over the coordination service
///
/// Clients are owned by one session at a time, so only `Send` is required.
pub trait CoordinationClient: Send {
    /// Host string this client talks to (e.g. `eng-mindscope:2181`)
    fn hosts(&self) -> &str;

    /// Open the connection, giving up after `timeout`.
    fn connect(&mut self, timeout: Duration) -> Result<()>;

    /// Close the connection. Must leave `is_connected()` false.
    fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Raw node payload; `None` when the node exists but holds no data.
    fn get_node(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite the payload of an existing node.
    fn set_node(&self, path: &str, data: &[u8]) -> Result<()>;

    fn delete_node(&self, path: &str) -> Result<()>;

    /// Create `path` and any missing ancestors with empty payloads.
    fn ensure_path(&self, path: &str) -> Result<()>;

    /// Child names (not full paths) of `path`.
    fn list_children(&self, path: &str) -> Result<Vec<String>>;
}

/// Creates clients for new sessions
pub trait ClientFactory: Send + Sync {
    fn create(&self, settings: &CoordinationSettings) -> Box<dyn CoordinationClient>;
}

/// Factory used when no coordination backend is compiled in
///
/// Every client it creates reports the service as unreachable, so sessions
/// always run from the local backup.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineClientFactory;

impl ClientFactory for OfflineClientFactory {
    fn create(&self, settings: &CoordinationSettings) -> Box<dyn CoordinationClient> {
        Box::new(OfflineClient {
            hosts: settings.hosts.clone(),
        })
    }
}

struct OfflineClient {
    hosts: String,
}

impl OfflineClient {
    fn unreachable(&self) -> ClientError {
        ClientError::Unreachable {
            hosts: self.hosts.clone(),
            message: "no coordination backend compiled in".to_string(),
        }
    }
}

impl CoordinationClient for OfflineClient {
    fn hosts(&self) -> &str {
        &self.hosts
    }

    fn connect(&mut self, _timeout: Duration) -> Result<()> {
        Err(self.unreachable())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn get_node(&self, _path: &str) -> Result<Option<Vec<u8>>> {
        Err(self.unreachable())
    }

    fn set_node(&self, _path: &str, _data: &[u8]) -> Result<()> {
        Err(self.unreachable())
    }

    fn delete_node(&self, _path: &str) -> Result<()> {
        Err(self.unreachable())
    }

    fn ensure_path(&self, _path: &str) -> Result<()> {
        Err(self.unreachable())
    }

    fn list_children(&self, _path: &str) -> Result<Vec<String>> {
        Err(self.unreachable())
    }
}

/// Join a parent path and a child name.
pub fn child_path(parent: &str, child: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{child}")
    } else {
        format!("{}/{child}", parent.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("/", "rigs"), "/rigs");
        assert_eq!(child_path("/rigs", "NP.1"), "/rigs/NP.1");
        assert_eq!(child_path("/rigs/", "NP.1"), "/rigs/NP.1");
    }

    #[test]
    fn test_connectivity_classification() {
        let unreachable = ClientError::Unreachable {
            hosts: "h:2181".into(),
            message: "refused".into(),
        };
        let timeout = ClientError::Timeout {
            hosts: "h:2181".into(),
            after: Duration::from_secs(1),
        };
        assert!(unreachable.is_connectivity());
        assert!(timeout.is_connectivity());
        assert!(!ClientError::NoNode { path: "/a".into() }.is_connectivity());
        assert!(!ClientError::Other { message: "auth".into() }.is_connectivity());
    }

    #[test]
    fn test_offline_factory_never_connects() {
        let settings = CoordinationSettings::default();
        let mut client = OfflineClientFactory.create(&settings);
        let err = client.connect(Duration::from_millis(10)).unwrap_err();
        assert!(err.is_connectivity());
        assert!(!client.is_connected());
        assert_eq!(client.hosts(), settings.hosts);
    }
}
