//! Request deadlines for connected clients
//!
//! A connected client is moved onto a dedicated worker thread. Each request
//! is sent to that thread and the caller waits at most `request_timeout` for
//! the reply. A request that overruns leaves the worker busy; later requests
//! queue behind it and time out the same way, so no caller ever blocks past
//! its deadline. Dropping a stalled client detaches the worker instead of
//! joining it.

use super::client::{ClientError, CoordinationClient, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

type Job = Box<dyn FnOnce(&mut Box<dyn CoordinationClient>) + Send>;

/// A [`CoordinationClient`] whose every request is bounded by a timeout
pub struct DeadlineClient {
    hosts: String,
    request_timeout: Duration,
    connected: AtomicBool,
    stalled: AtomicBool,
    jobs: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl DeadlineClient {
    /// Move `client` onto a worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned. The client
    /// is dropped in that case.
    pub fn spawn(
        client: Box<dyn CoordinationClient>,
        request_timeout: Duration,
    ) -> std::io::Result<Self> {
        let hosts = client.hosts().to_string();
        let connected = client.is_connected();
        let (jobs, queue) = mpsc::channel::<Job>();

        let handle = std::thread::Builder::new()
            .name("np-config-zk-requests".to_string())
            .spawn(move || {
                let mut client = client;
                for job in queue {
                    job(&mut client);
                }
            })?;

        Ok(Self {
            hosts,
            request_timeout,
            connected: AtomicBool::new(connected),
            stalled: AtomicBool::new(false),
            jobs: Some(jobs),
            handle: Some(handle),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns `true` once a request has overrun its deadline.
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn CoordinationClient>) -> Result<T> + Send + 'static,
    {
        let (reply, answer) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |client| {
            let _ = reply.send(op(client));
        });

        let queued = self.jobs.as_ref().is_some_and(|jobs| jobs.send(job).is_ok());
        if !queued {
            return Err(ClientError::Other {
                message: "request worker stopped".to_string(),
            });
        }

        match answer.recv_timeout(self.request_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.stalled.store(true, Ordering::Release);
                Err(ClientError::Timeout {
                    hosts: self.hosts.clone(),
                    after: self.request_timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::Other {
                message: "request worker stopped".to_string(),
            }),
        }
    }
}

impl CoordinationClient for DeadlineClient {
    fn hosts(&self) -> &str {
        &self.hosts
    }

    fn connect(&mut self, timeout: Duration) -> Result<()> {
        self.call(move |client| client.connect(timeout))?;
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let result = self.call(|client| client.disconnect());
        self.connected.store(false, Ordering::Release);
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn get_node(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = path.to_string();
        self.call(move |client| client.get_node(&path))
    }

    fn set_node(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = path.to_string();
        let data = data.to_vec();
        self.call(move |client| client.set_node(&path, &data))
    }

    fn delete_node(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.call(move |client| client.delete_node(&path))
    }

    fn ensure_path(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.call(move |client| client.ensure_path(&path))
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        let path = path.to_string();
        self.call(move |client| client.list_children(&path))
    }
}

impl Drop for DeadlineClient {
    fn drop(&mut self) {
        // Closing the queue ends the worker once its current job returns.
        self.jobs.take();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.is_stalled() {
            warn!("Leaving a stalled request to {} running in the background", self.hosts);
            return;
        }
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::client::ClientFactory;
    use crate::remote::memory::InMemoryCoordination;
    use crate::settings::CoordinationSettings;
    use std::time::Instant;

    fn connected(tree: &InMemoryCoordination, timeout: Duration) -> DeadlineClient {
        let mut client = tree.create(&CoordinationSettings::default());
        client.connect(Duration::from_secs(1)).unwrap();
        DeadlineClient::spawn(client, timeout).unwrap()
    }

    #[test]
    fn test_requests_pass_through() {
        let tree = InMemoryCoordination::new();
        tree.put("/a", "x: 1\n");
        let client = connected(&tree, Duration::from_secs(5));

        assert!(client.is_connected());
        assert_eq!(client.get_node("/a").unwrap().unwrap(), b"x: 1\n");
        client.ensure_path("/b/c").unwrap();
        client.set_node("/b/c", b"y: 2\n").unwrap();
        assert_eq!(client.list_children("/").unwrap(), vec!["a", "b"]);
        client.delete_node("/a").unwrap();
        assert!(matches!(client.get_node("/a"), Err(ClientError::NoNode { .. })));
        assert!(!client.is_stalled());
    }

    #[test]
    fn test_slow_request_times_out() {
        let tree = InMemoryCoordination::new();
        tree.put("/a", "x: 1\n");
        let client = connected(&tree, Duration::from_millis(100));
        tree.set_request_delay(Duration::from_secs(2));

        let start = Instant::now();
        let result = client.get_node("/a");

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(matches!(result, Err(ClientError::Timeout { .. })));
        assert!(client.is_stalled());

        // Queued behind the stalled request, still bounded.
        let start = Instant::now();
        assert!(client.list_children("/").is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_drop_joins_idle_worker() {
        let tree = InMemoryCoordination::new();
        let mut client = connected(&tree, Duration::from_secs(5));
        client.disconnect().unwrap();
        assert!(!client.is_connected());
        drop(client);

        assert_eq!(tree.open_sessions(), 0);
        assert_eq!(tree.disconnect_count(), 1);
    }
}
