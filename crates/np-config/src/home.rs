//! Home directory resolution
//!
//! Settings files and the default data directory live under the home
//! directory. `NP_CONFIG_HOME` overrides it for tests and shared rig
//! installations.
//!
//! # Precedence
//!
//! 1. `NP_CONFIG_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Get the home directory for np_config files
///
/// # Errors
///
/// Returns an error if `NP_CONFIG_HOME` is unset and the platform home
/// directory cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("NP_CONFIG_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("Could not determine home directory")
}
