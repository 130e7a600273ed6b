//! Dictionary-like config stores
//!
//! Both backends (the coordination service and local files) are exposed
//! through [`ConfigStore`], so callers never need to know which one is
//! serving a request.

pub mod error;
pub mod local;
pub mod lock;

pub use error::{BackendKind, StoreError};
pub use local::LocalStore;

use crate::codec::ConfigMap;

/// Shared get/set/delete contract over hierarchical keys
pub trait ConfigStore {
    /// Fetch the map stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyNotFound` if the key is absent.
    fn get(&self, key: &str) -> Result<ConfigMap, StoreError>;

    /// Insert or replace the map stored at `key`.
    fn set(&self, key: &str, value: ConfigMap) -> Result<(), StoreError>;

    /// Remove `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyNotFound` if the key is absent; the store is
    /// left unchanged.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
