//! Settings resolution
//!
//! Resolves settings from multiple sources with priority:
//! 1. Caller overrides (passed as parameters)
//! 2. Environment variables
//! 3. Repo-local settings (.np_config.toml)
//! 4. Global settings (~/.config/np_config/config.toml)
//! 5. Defaults

mod discovery;
mod types;

pub use discovery::{SettingsError, SettingsOverrides, load_settings_file, resolve_settings};
pub use types::{
    BackupSettings, CoordinationSettings, Settings, StorageSettings, TopologySettings,
};
