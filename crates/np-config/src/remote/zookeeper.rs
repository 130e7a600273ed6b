//! ZooKeeper client implementation
//!
//! Uses the `zookeeper` crate. Connecting happens on a helper thread so the
//! scope-entry timeout can be enforced even when the handshake hangs; a
//! connection that completes after the deadline is dropped. Requests are
//! plain blocking calls; sessions bound them with
//! [`DeadlineClient`](super::deadline::DeadlineClient).

use super::client::{ClientError, ClientFactory, CoordinationClient, Result};
use crate::settings::CoordinationSettings;
use std::sync::mpsc;
use std::time::Duration;
use tracing::debug;
use zookeeper::{WatchedEvent, Watcher, ZkError, ZooKeeper, ZooKeeperExt};

/// Creates [`ZooKeeperClient`]s from coordination settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ZooKeeperClientFactory;

impl ClientFactory for ZooKeeperClientFactory {
    fn create(&self, settings: &CoordinationSettings) -> Box<dyn CoordinationClient> {
        Box::new(ZooKeeperClient::new(
            settings.hosts.clone(),
            settings.session_timeout(),
        ))
    }
}

struct LoggingWatcher;

impl Watcher for LoggingWatcher {
    fn handle(&self, event: WatchedEvent) {
        debug!("Zookeeper event: {event:?}");
    }
}

/// Client over a ZooKeeper ensemble
pub struct ZooKeeperClient {
    hosts: String,
    session_timeout: Duration,
    zk: Option<ZooKeeper>,
}

impl ZooKeeperClient {
    pub fn new(hosts: String, session_timeout: Duration) -> Self {
        Self {
            hosts,
            session_timeout,
            zk: None,
        }
    }

    fn zk(&self) -> Result<&ZooKeeper> {
        self.zk.as_ref().ok_or_else(|| ClientError::Other {
            message: "connection not open".to_string(),
        })
    }

    fn map_error(&self, path: &str, error: ZkError) -> ClientError {
        match error {
            ZkError::NoNode => ClientError::NoNode {
                path: path.to_string(),
            },
            ZkError::ConnectionLoss | ZkError::SessionExpired => ClientError::Unreachable {
                hosts: self.hosts.clone(),
                message: error.to_string(),
            },
            ZkError::OperationTimeout => ClientError::Timeout {
                hosts: self.hosts.clone(),
                after: self.session_timeout,
            },
            other => ClientError::Other {
                message: format!("{path}: {other}"),
            },
        }
    }
}

impl CoordinationClient for ZooKeeperClient {
    fn hosts(&self) -> &str {
        &self.hosts
    }

    fn connect(&mut self, timeout: Duration) -> Result<()> {
        let hosts = self.hosts.clone();
        let session_timeout = self.session_timeout;
        let (tx, rx) = mpsc::channel();

        std::thread::Builder::new()
            .name("np-config-zk-connect".to_string())
            .spawn(move || {
                let result = ZooKeeper::connect(&hosts, session_timeout, LoggingWatcher)
                    .and_then(|zk| zk.exists("/", false).map(|_| zk));
                let _ = tx.send(result);
            })
            .map_err(|e| ClientError::Other {
                message: format!("failed to spawn connect thread: {e}"),
            })?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(zk)) => {
                self.zk = Some(zk);
                Ok(())
            }
            Ok(Err(e)) => Err(self.map_error("/", e)),
            Err(_) => Err(ClientError::Timeout {
                hosts: self.hosts.clone(),
                after: timeout,
            }),
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        match self.zk.take() {
            Some(zk) => zk.close().map_err(|e| self.map_error("/", e)),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.zk.is_some()
    }

    fn get_node(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let (data, _stat) = self
            .zk()?
            .get_data(path, false)
            .map_err(|e| self.map_error(path, e))?;
        Ok((!data.is_empty()).then_some(data))
    }

    fn set_node(&self, path: &str, data: &[u8]) -> Result<()> {
        self.zk()?
            .set_data(path, data.to_vec(), None)
            .map(|_| ())
            .map_err(|e| self.map_error(path, e))
    }

    fn delete_node(&self, path: &str) -> Result<()> {
        self.zk()?
            .delete(path, None)
            .map_err(|e| self.map_error(path, e))
    }

    fn ensure_path(&self, path: &str) -> Result<()> {
        self.zk()?
            .ensure_path(path)
            .map_err(|e| self.map_error(path, e))
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        self.zk()?
            .get_children(path, false)
            .map_err(|e| self.map_error(path, e))
    }
}

impl Drop for ZooKeeperClient {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
