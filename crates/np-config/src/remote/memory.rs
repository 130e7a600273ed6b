//! In-memory coordination tree
//!
//! A thread-safe hierarchical node store implementing the client contract
//! without a network. Every client created from one `InMemoryCoordination`
//! shares the same tree, like several connections to one live service.
//! Failure injection switches simulate an unreachable, slow or misbehaving
//! service.

use super::client::{ClientError, ClientFactory, CoordinationClient, Result, child_path};
use crate::codec::{self, ConfigMap, Format};
use crate::settings::CoordinationSettings;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Simulated connect outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    #[default]
    Succeed,
    /// Connect fails as unreachable
    Unreachable,
    /// Connect fails with a timeout
    Timeout,
    /// Connect fails with an unexpected error
    Unexpected,
}

#[derive(Debug)]
struct TreeState {
    /// path -> payload; the root always exists
    nodes: BTreeMap<String, Option<Vec<u8>>>,
    connect: ConnectBehavior,
    fail_reads: bool,
    /// Added to every request made through a connected client
    request_delay: Duration,
    connects: usize,
    disconnects: usize,
    open: usize,
}

impl Default for TreeState {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), None);
        Self {
            nodes,
            connect: ConnectBehavior::Succeed,
            fail_reads: false,
            request_delay: Duration::ZERO,
            connects: 0,
            disconnects: 0,
            open: 0,
        }
    }
}

impl TreeState {
    fn children(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    fn ensure(&mut self, path: &str) {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.nodes.entry(current.clone()).or_insert(None);
        }
    }
}

/// Shared in-memory coordination service
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoordination {
    state: Arc<Mutex<TreeState>>,
}

impl InMemoryCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a raw payload at `path`, creating ancestors.
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        state.ensure(path);
        state.nodes.insert(normalize(path), Some(data.into()));
    }

    /// Store `value` YAML-encoded at `path`, creating ancestors.
    pub fn put_map(&self, path: &str, value: &ConfigMap) {
        let bytes = codec::encode(value, Format::Yaml).unwrap_or_default();
        self.put(path, bytes);
    }

    /// Create an empty container node (and ancestors).
    pub fn put_container(&self, path: &str) {
        self.lock().ensure(path);
    }

    /// Raw payload at `path`, if the node exists and holds data.
    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().nodes.get(&normalize(path)).cloned().flatten()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(&normalize(path))
    }

    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        self.lock().connect = behavior;
    }

    /// Make every read fail with an unexpected error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make every request sleep for `delay` before touching the tree.
    pub fn set_request_delay(&self, delay: Duration) {
        self.lock().request_delay = delay;
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnect_count(&self) -> usize {
        self.lock().disconnects
    }

    /// Number of clients currently connected.
    pub fn open_sessions(&self) -> usize {
        self.lock().open
    }
}

impl ClientFactory for InMemoryCoordination {
    fn create(&self, settings: &CoordinationSettings) -> Box<dyn CoordinationClient> {
        Box::new(InMemoryClient {
            tree: self.clone(),
            hosts: settings.hosts.clone(),
            connected: false,
        })
    }
}

/// One connection to an [`InMemoryCoordination`] tree
#[derive(Debug)]
pub struct InMemoryClient {
    tree: InMemoryCoordination,
    hosts: String,
    connected: bool,
}

impl InMemoryClient {
    fn checked(&self) -> Result<MutexGuard<'_, TreeState>> {
        if !self.connected {
            return Err(ClientError::Other {
                message: "connection not open".to_string(),
            });
        }
        let delay = self.tree.lock().request_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(self.tree.lock())
    }
}

impl CoordinationClient for InMemoryClient {
    fn hosts(&self) -> &str {
        &self.hosts
    }

    fn connect(&mut self, timeout: Duration) -> Result<()> {
        let behavior = self.tree.lock().connect;
        match behavior {
            ConnectBehavior::Succeed => {
                let mut state = self.tree.lock();
                state.connects += 1;
                state.open += 1;
                self.connected = true;
                Ok(())
            }
            ConnectBehavior::Unreachable => Err(ClientError::Unreachable {
                hosts: self.hosts.clone(),
                message: "connection refused".to_string(),
            }),
            ConnectBehavior::Timeout => Err(ClientError::Timeout {
                hosts: self.hosts.clone(),
                after: timeout,
            }),
            ConnectBehavior::Unexpected => Err(ClientError::Other {
                message: "authentication failed".to_string(),
            }),
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            let mut state = self.tree.lock();
            state.disconnects += 1;
            state.open = state.open.saturating_sub(1);
            self.connected = false;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_node(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let state = self.checked()?;
        if state.fail_reads {
            return Err(ClientError::Other {
                message: format!("simulated read failure at {path}"),
            });
        }
        state
            .nodes
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| ClientError::NoNode {
                path: path.to_string(),
            })
    }

    fn set_node(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut state = self.checked()?;
        match state.nodes.get_mut(&normalize(path)) {
            Some(slot) => {
                *slot = Some(data.to_vec());
                Ok(())
            }
            None => Err(ClientError::NoNode {
                path: path.to_string(),
            }),
        }
    }

    fn delete_node(&self, path: &str) -> Result<()> {
        let mut state = self.checked()?;
        let key = normalize(path);
        if key == "/" {
            return Err(ClientError::Other {
                message: "cannot delete root".to_string(),
            });
        }
        if !state.nodes.contains_key(&key) {
            return Err(ClientError::NoNode {
                path: path.to_string(),
            });
        }
        if !state.children(&key).is_empty() {
            return Err(ClientError::Other {
                message: format!("node {path} not empty"),
            });
        }
        state.nodes.remove(&key);
        Ok(())
    }

    fn ensure_path(&self, path: &str) -> Result<()> {
        self.checked()?.ensure(path);
        Ok(())
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        let state = self.checked()?;
        if state.fail_reads {
            return Err(ClientError::Other {
                message: format!("simulated read failure at {path}"),
            });
        }
        let key = normalize(path);
        if !state.nodes.contains_key(&key) {
            return Err(ClientError::NoNode {
                path: path.to_string(),
            });
        }
        Ok(state.children(&key))
    }
}

impl Drop for InMemoryClient {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        child_path("/", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(tree: &InMemoryCoordination) -> Box<dyn CoordinationClient> {
        let mut client = tree.create(&CoordinationSettings::default());
        client.connect(Duration::from_secs(1)).unwrap();
        client
    }

    #[test]
    fn test_put_creates_ancestors() {
        let tree = InMemoryCoordination::new();
        tree.put("/b/c", "y: 2\n");
        assert!(tree.exists("/b"));
        assert!(tree.data("/b").is_none());
        assert_eq!(tree.data("/b/c").unwrap(), b"y: 2\n");
    }

    #[test]
    fn test_list_children_direct_only() {
        let tree = InMemoryCoordination::new();
        tree.put("/a", "x: 1\n");
        tree.put("/b/c", "y: 2\n");
        tree.put("/b/d/e", "z: 3\n");
        tree.put("/bb", "w: 4\n");
        let client = connected(&tree);

        assert_eq!(client.list_children("/").unwrap(), vec!["a", "b", "bb"]);
        assert_eq!(client.list_children("/b").unwrap(), vec!["c", "d"]);
        assert!(client.list_children("/b/c").unwrap().is_empty());
        assert!(matches!(
            client.list_children("/missing"),
            Err(ClientError::NoNode { .. })
        ));
    }

    #[test]
    fn test_operations_require_connection() {
        let tree = InMemoryCoordination::new();
        let client = tree.create(&CoordinationSettings::default());
        assert!(matches!(client.get_node("/"), Err(ClientError::Other { .. })));
    }

    #[test]
    fn test_set_requires_existing_node() {
        let tree = InMemoryCoordination::new();
        let client = connected(&tree);
        assert!(matches!(
            client.set_node("/new", b"a: 1"),
            Err(ClientError::NoNode { .. })
        ));
        client.ensure_path("/new").unwrap();
        client.set_node("/new", b"a: 1").unwrap();
        assert_eq!(client.get_node("/new").unwrap(), Some(b"a: 1".to_vec()));
    }

    #[test]
    fn test_delete_rejects_non_empty() {
        let tree = InMemoryCoordination::new();
        tree.put("/b/c", "y: 2\n");
        let client = connected(&tree);
        assert!(matches!(client.delete_node("/b"), Err(ClientError::Other { .. })));
        client.delete_node("/b/c").unwrap();
        client.delete_node("/b").unwrap();
        assert!(!tree.exists("/b"));
    }

    #[test]
    fn test_connect_behaviors() {
        let tree = InMemoryCoordination::new();
        let settings = CoordinationSettings::default();

        tree.set_connect_behavior(ConnectBehavior::Timeout);
        let mut client = tree.create(&settings);
        assert!(matches!(
            client.connect(Duration::from_millis(5)),
            Err(ClientError::Timeout { .. })
        ));

        tree.set_connect_behavior(ConnectBehavior::Unexpected);
        assert!(matches!(
            client.connect(Duration::from_millis(5)),
            Err(ClientError::Other { .. })
        ));
        assert_eq!(tree.connect_count(), 0);
    }

    #[test]
    fn test_session_counters() {
        let tree = InMemoryCoordination::new();
        {
            let _client = connected(&tree);
            assert_eq!(tree.open_sessions(), 1);
        }
        assert_eq!(tree.open_sessions(), 0);
        assert_eq!(tree.connect_count(), 1);
        assert_eq!(tree.disconnect_count(), 1);
    }
}
