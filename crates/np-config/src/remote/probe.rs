//! Host liveness probing
//!
//! A probe answers one question: does the coordination host answer a single
//! echo request right now? It never fails. Any error (missing `ping`, DNS
//! failure, timeout) is reported as unreachable, which sends the caller down
//! the local-backup path.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// Boolean reachability gate
pub trait LivenessProbe: Send + Sync {
    /// Returns `true` if `host` answered.
    fn is_reachable(&self, host: &str) -> bool;
}

/// One ICMP echo through the system `ping` binary
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
}

// Extra time allowed for process start and name resolution.
const SPAWN_GRACE: Duration = Duration::from_millis(1500);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(&self, host: &str) -> Command {
        let mut cmd = Command::new("ping");

        #[cfg(windows)]
        cmd.args(["-n", "1", "-w"]).arg(self.timeout.as_millis().max(1).to_string());

        #[cfg(target_os = "macos")]
        cmd.args(["-c", "1", "-t"]).arg(self.timeout_secs().to_string());

        #[cfg(all(unix, not(target_os = "macos")))]
        cmd.args(["-c", "1", "-W"]).arg(self.timeout_secs().to_string());

        cmd.arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    #[allow(dead_code)]
    fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs_f64().ceil().max(1.0) as u64
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl LivenessProbe for PingProbe {
    fn is_reachable(&self, host: &str) -> bool {
        if host.trim().is_empty() {
            return false;
        }

        let mut child = match self.command(host).spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!("Could not run ping for {host}: {e}");
                return false;
            }
        };

        let deadline = Instant::now() + self.timeout + SPAWN_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Ping {host}: {status}");
                    return status.success();
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(POLL_INTERVAL),
                Ok(None) => {
                    debug!("Ping {host} did not finish in time");
                    let _ = child.kill();
                    let _ = child.wait();
                    return false;
                }
                Err(e) => {
                    debug!("Ping {host} failed: {e}");
                    let _ = child.kill();
                    return false;
                }
            }
        }
    }
}

/// Probe with a fixed answer, for offline installations and tests
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl LivenessProbe for StaticProbe {
    fn is_reachable(&self, _host: &str) -> bool {
        self.0
    }
}
