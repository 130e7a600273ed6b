//! Coordination-service access with local fallback
//!
//! [`RemoteSession`] is the entry point: it probes, connects, and serves
//! get/set/delete from either the live service or the local backup.

pub mod client;
pub mod deadline;
pub mod memory;
pub mod probe;
pub mod session;
#[cfg(feature = "zookeeper")]
pub mod zookeeper;

pub use client::{ClientError, ClientFactory, CoordinationClient, OfflineClientFactory};
pub use deadline::DeadlineClient;
pub use memory::{ConnectBehavior, InMemoryCoordination};
pub use probe::{LivenessProbe, PingProbe, StaticProbe};
pub use session::{Backend, NodeContent, RemoteSession};
#[cfg(feature = "zookeeper")]
pub use zookeeper::ZooKeeperClientFactory;
