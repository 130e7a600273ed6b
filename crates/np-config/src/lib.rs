//! Cached, dual-source access to lab-rig configuration (np_config)
//!
//! Rig configuration lives authoritatively in a ZooKeeper-style coordination
//! service. This crate sits between callers and that service:
//!
//! - **Codec**: YAML/JSON encode/decode of config maps, key order preserved
//! - **LocalStore**: file-backed key → map store with serialized writes
//! - **RemoteSession**: scoped session over the coordination service that
//!   degrades to the local backup when the service is unreachable
//! - **Backup**: recursive mirror of the coordination tree into a local file
//! - **Resolver**: a single `fetch` entry point for maps, files and keys
//!
//! All process-wide state (the backup store and this run's session record)
//! is held by an explicitly constructed [`ConfigContext`].

pub mod backup;
pub mod codec;
pub mod context;
pub mod home;
pub mod logging;
pub mod remote;
pub mod resolver;
pub mod rigs;
pub mod settings;
pub mod store;

pub use backup::{BackupOutcome, BackupWorker, backup_all, backup_if_stale};
pub use codec::{ConfigMap, Format};
pub use context::ConfigContext;
pub use remote::{ClientFactory, CoordinationClient, InMemoryCoordination, RemoteSession};
pub use resolver::{FetchArg, dump_file, fetch, from_file, from_zk};
pub use settings::Settings;
pub use store::{BackendKind, ConfigStore, LocalStore, StoreError};
