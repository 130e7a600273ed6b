//! Write serialization for backing files
//!
//! Two layers guard every persist of a backing file:
//!
//! - a process-wide mutex per canonical path, shared by every `LocalStore`
//!   that points at the same file
//! - an advisory lock on a `<file>.lock` sidecar, acquired with exponential
//!   backoff, which serializes writers in other processes

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Errors acquiring a write lock
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process held the lock through every retry
    #[error("Failed to acquire lock on {path} after {retries} retries")]
    Timeout { path: PathBuf, retries: u32 },

    /// The lock file could not be opened or locked
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Default retry count for cross-process acquisition (~1.5s worst case).
pub const DEFAULT_RETRIES: u32 = 5;

static PATH_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// Return the process-wide mutex for `path`.
///
/// Every caller passing the same file gets the same mutex, regardless of how
/// many stores were constructed over it.
pub fn path_mutex(path: &Path) -> Arc<Mutex<()>> {
    let key = canonical_key(path);
    let registry = PATH_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(map.entry(key).or_default())
}

fn canonical_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    // File may not exist yet: canonicalize the parent and re-attach the name.
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Held for the duration of one persist; releases both layers on drop.
pub struct WriteGuard<'a> {
    _file_lock: FileLock,
    _process: MutexGuard<'a, ()>,
}

/// Acquire both write-lock layers for `target`.
pub fn lock_for_write<'a>(
    process_mutex: &'a Mutex<()>,
    target: &Path,
    max_retries: u32,
) -> Result<WriteGuard<'a>, LockError> {
    let process = process_mutex.lock().unwrap_or_else(|e| e.into_inner());
    let file_lock = acquire_lock(&sidecar_path(target), max_retries)?;
    Ok(WriteGuard {
        _file_lock: file_lock,
        _process: process,
    })
}

/// `<file>.lock` next to the backing file.
pub fn sidecar_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// File lock guard that automatically releases on drop
pub struct FileLock {
    #[allow(dead_code)]
    file: File,
    #[cfg(unix)]
    fd: i32,
    #[cfg(not(unix))]
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::flock(self.fd, libc::LOCK_UN);
        }

        #[cfg(not(unix))]
        {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Acquire an exclusive advisory lock on `path` with backoff retry
///
/// Waits 50ms, 100ms, 200ms, ... between attempts.
pub fn acquire_lock(path: &Path, max_retries: u32) -> Result<FileLock, LockError> {
    #[cfg(unix)]
    {
        unix_acquire_lock(path, max_retries)
    }

    #[cfg(not(unix))]
    {
        create_new_acquire_lock(path, max_retries)
    }
}

#[cfg(unix)]
fn unix_acquire_lock(path: &Path, max_retries: u32) -> Result<FileLock, LockError> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| LockError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    let fd = file.as_raw_fd();

    for attempt in 0..=max_retries {
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(FileLock { file, fd });
        }

        let err = std::io::Error::last_os_error();
        let would_block = err.raw_os_error() == Some(libc::EWOULDBLOCK)
            || err.raw_os_error() == Some(libc::EAGAIN);
        if !would_block {
            return Err(LockError::Io {
                path: path.to_path_buf(),
                source: err,
            });
        }

        if attempt < max_retries {
            std::thread::sleep(Duration::from_millis(50u64 * (1 << attempt)));
        }
    }

    Err(LockError::Timeout {
        path: path.to_path_buf(),
        retries: max_retries,
    })
}

#[cfg(not(unix))]
fn create_new_acquire_lock(path: &Path, max_retries: u32) -> Result<FileLock, LockError> {
    use std::fs::OpenOptions;

    // No flock here: exclusive creation of the sidecar is the lock.
    for attempt in 0..=max_retries {
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => {
                return Ok(FileLock {
                    file,
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if attempt < max_retries {
                    std::thread::sleep(Duration::from_millis(50u64 * (1 << attempt)));
                }
            }
            Err(e) => {
                return Err(LockError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }

    Err(LockError::Timeout {
        path: path.to_path_buf(),
        retries: max_retries,
    })
}
