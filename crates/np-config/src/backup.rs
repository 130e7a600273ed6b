//! Full backup of the coordination tree into the local backup store
//!
//! The walk starts at `/`, descends through container nodes and copies
//! every leaf value into the backup at the same path. Intermediate nodes
//! are never stored. The whole walk runs inside one session.
//!
//! A staleness gate decides when a backup is due: the backup file is
//! missing, or was last written more than `backup.max_age_days` ago. It runs
//! once at process start and, for long-lived processes, from a
//! [`BackupWorker`] thread.

use crate::codec::ConfigMap;
use crate::context::ConfigContext;
use crate::remote::client::child_path;
use crate::remote::{NodeContent, RemoteSession};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// ZooKeeper's own bookkeeping subtree, never backed up.
const RESERVED_ROOTS: [&str; 1] = ["/zookeeper"];

/// Result of a backup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Session was already serving the backup; nothing to copy
    Skipped,
    /// Walk finished and this many leaves were written
    Completed { leaves: usize },
}

impl fmt::Display for BackupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped, coordination service unavailable"),
            Self::Completed { leaves } => write!(f, "{leaves} entries backed up"),
        }
    }
}

/// Copy every leaf of the coordination tree into the backup store.
///
/// With no `session`, an unrecorded session is opened for the walk and
/// closed afterwards. A session in fallback mode would copy the backup onto
/// itself, so the call returns `Skipped` instead.
///
/// # Errors
///
/// Returns `StoreError::Backend` if the service fails mid-walk. Leaves
/// collected before the failure are still written.
pub fn backup_all(
    ctx: &ConfigContext,
    session: Option<&RemoteSession>,
) -> Result<BackupOutcome, StoreError> {
    let owned;
    let session = match session {
        Some(session) => session,
        None => {
            owned = RemoteSession::open_unrecorded(ctx)?;
            &owned
        }
    };

    if session.is_fallback() {
        debug!("Could not connect to zookeeper, skipping backup");
        return Ok(BackupOutcome::Skipped);
    }

    let mut leaves = Vec::new();
    let walked = walk(session, "/", &mut leaves);

    let count = leaves.len();
    if leaves.is_empty() {
        // Still touch the file so the staleness gate sees this run.
        ctx.backup().persist();
    } else {
        ctx.backup().set_many(leaves);
    }
    walked?;

    info!("Backed up {count} entries to {}", ctx.backup().path().display());
    Ok(BackupOutcome::Completed { leaves: count })
}

fn walk(
    session: &RemoteSession,
    parent: &str,
    leaves: &mut Vec<(String, ConfigMap)>,
) -> Result<(), StoreError> {
    let children = match session.list_children(parent) {
        Ok(children) => children,
        // Container deleted after it was classified.
        Err(e) if e.is_not_found() && parent != "/" => {
            debug!("{parent} disappeared during backup");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    for child in children {
        let path = child_path(parent, &child);
        if RESERVED_ROOTS.contains(&path.as_str()) {
            continue;
        }
        match session.node(&path) {
            Ok(NodeContent::Leaf(value)) => leaves.push((path, value)),
            Ok(NodeContent::Container) => walk(session, &path, leaves)?,
            // Deleted between listing and reading.
            Err(e) if e.is_not_found() => debug!("{path} disappeared during backup"),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Returns `true` if the file at `path` is missing or older than `max_age`.
pub fn backup_is_stale(path: &Path, max_age: chrono::Duration) -> bool {
    let modified = match path.metadata().and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified),
        Err(_) => return true,
    };
    Utc::now() - modified > max_age
}

/// Run [`backup_all`] if the backup is missing or stale.
///
/// Returns `Ok(None)` when the backup is fresh.
pub fn backup_if_stale(ctx: &ConfigContext) -> Result<Option<BackupOutcome>, StoreError> {
    let path = ctx.backup().path();
    if !backup_is_stale(path, ctx.settings().backup.max_age()) {
        return Ok(None);
    }
    debug!("Backup at {} is missing or stale", path.display());
    backup_all(ctx, None).map(Some)
}

/// Background thread re-running the staleness gate at a fixed interval
///
/// Dropping the worker stops and joins the thread.
pub struct BackupWorker {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackupWorker {
    /// Spawn a worker that checks every `every`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(ctx: Arc<ConfigContext>, every: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("np-config-backup".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(every) {
                        Err(RecvTimeoutError::Timeout) => match backup_if_stale(&ctx) {
                            Ok(Some(outcome)) => info!("Periodic backup: {outcome}"),
                            Ok(None) => {}
                            Err(e) => warn!("Periodic backup failed: {e}"),
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Backup worker stopped");
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Spawn with the interval from settings.
    pub fn spawn_from_settings(ctx: Arc<ConfigContext>) -> std::io::Result<Self> {
        let every = ctx.settings().backup.check_interval();
        Self::spawn(ctx, every)
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackupWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
