//! Settings discovery and resolution

use super::types::Settings;
use crate::codec::Format;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Settings error
#[derive(Debug, Error)]
pub enum SettingsError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Caller-supplied overrides
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    /// Override coordination hosts
    pub hosts: Option<String>,
    /// Override liveness probe host
    pub probe_host: Option<String>,
    /// Override data directory
    pub data_dir: Option<PathBuf>,
    /// Override backing file format
    pub format: Option<Format>,
    /// Disable the startup and periodic backup
    pub disable_backup: bool,
    /// Path to settings file override
    pub settings_path: Option<PathBuf>,
}

const REPO_SETTINGS_FILE: &str = ".np_config.toml";
const GLOBAL_SETTINGS_FILE: &str = ".config/np_config/config.toml";
const DEFAULT_DATA_SUBDIR: &str = ".np_config/resources";

/// Resolve settings from all sources
///
/// Priority (highest to lowest):
/// 1. Caller overrides
/// 2. Environment variables
/// 3. Explicit settings file, else repo-local `.np_config.toml`
///    (current dir up to git root)
/// 4. Global settings (`<home>/.config/np_config/config.toml`)
/// 5. Defaults
///
/// Unparseable files are logged and skipped.
pub fn resolve_settings(
    overrides: &SettingsOverrides,
    current_dir: &Path,
    home_dir: &Path,
) -> Settings {
    let mut settings = Settings::default();

    // 4. Global settings
    let global_path = home_dir.join(GLOBAL_SETTINGS_FILE);
    if global_path.exists() {
        match load_settings_file(&global_path) {
            Ok(file) => merge_settings(&mut settings, file),
            Err(e) => warn!("Failed to parse global settings at {global_path:?}: {e}"),
        }
    }

    // 3. Explicit or repo-local settings
    let local_path = overrides
        .settings_path
        .clone()
        .or_else(|| find_repo_local_settings(current_dir));
    if let Some(path) = local_path {
        match load_settings_file(&path) {
            Ok(file) => merge_settings(&mut settings, file),
            Err(e) => warn!("Failed to parse settings at {path:?}: {e}"),
        }
    }

    // 2. Environment
    apply_env_overrides(&mut settings);

    // 1. Caller overrides
    apply_overrides(&mut settings, overrides);

    if settings.storage.data_dir.is_none() {
        settings.storage.data_dir = Some(home_dir.join(DEFAULT_DATA_SUBDIR));
    }

    settings
}

/// Find repo-local settings file
///
/// Searches current directory and parent directories up to git root
fn find_repo_local_settings(current_dir: &Path) -> Option<PathBuf> {
    let mut dir = current_dir;

    loop {
        let path = dir.join(REPO_SETTINGS_FILE);
        if path.exists() {
            return Some(path);
        }

        if dir.join(".git").exists() {
            break;
        }

        dir = dir.parent()?;
    }

    None
}

/// Load settings from a TOML file
pub fn load_settings_file(path: &Path) -> Result<Settings, SettingsError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Merge file settings into base settings, section by section
fn merge_settings(base: &mut Settings, file: Settings) {
    base.coordination = file.coordination;
    base.backup = file.backup;
    base.topology = file.topology;

    base.storage.format = file.storage.format;
    if file.storage.data_dir.is_some() {
        base.storage.data_dir = file.storage.data_dir;
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Some(hosts) = non_empty_env("NP_CONFIG_HOSTS") {
        settings.coordination.hosts = hosts;
    }

    if let Some(host) = non_empty_env("NP_CONFIG_PROBE_HOST") {
        settings.coordination.probe_host = host;
    }

    if let Some(dir) = non_empty_env("NP_CONFIG_DATA_DIR") {
        settings.storage.data_dir = Some(PathBuf::from(dir));
    }

    if std::env::var("NP_CONFIG_DISABLE_BACKUP").is_ok() {
        settings.backup.enabled = false;
    }
}

fn apply_overrides(settings: &mut Settings, overrides: &SettingsOverrides) {
    if let Some(ref hosts) = overrides.hosts {
        settings.coordination.hosts = hosts.clone();
    }

    if let Some(ref host) = overrides.probe_host {
        settings.coordination.probe_host = host.clone();
    }

    if let Some(ref dir) = overrides.data_dir {
        settings.storage.data_dir = Some(dir.clone());
    }

    if let Some(format) = overrides.format {
        settings.storage.format = format;
    }

    if overrides.disable_backup {
        settings.backup.enabled = false;
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 4] = [
        "NP_CONFIG_HOSTS",
        "NP_CONFIG_PROBE_HOST",
        "NP_CONFIG_DATA_DIR",
        "NP_CONFIG_DISABLE_BACKUP",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults_fill_data_dir_under_home() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();

        let settings = resolve_settings(&SettingsOverrides::default(), cwd.path(), home.path());

        assert_eq!(
            settings.storage.data_dir,
            Some(home.path().join(".np_config/resources"))
        );
        assert_eq!(settings.coordination.hosts, "eng-mindscope:2181");
    }

    #[test]
    #[serial]
    fn test_repo_local_overrides_global() {
        clear_env();
        let home = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join(".config/np_config")).unwrap();
        fs::write(
            home.path().join(GLOBAL_SETTINGS_FILE),
            "[coordination]\nhosts = \"global:2181\"\n[storage]\ndata_dir = \"/global/data\"\n",
        )
        .unwrap();
        fs::create_dir(repo.path().join(".git")).unwrap();
        fs::write(
            repo.path().join(REPO_SETTINGS_FILE),
            "[coordination]\nhosts = \"local:2181\"\n",
        )
        .unwrap();
        let nested = repo.path().join("src/module");
        fs::create_dir_all(&nested).unwrap();

        let settings = resolve_settings(&SettingsOverrides::default(), &nested, home.path());

        assert_eq!(settings.coordination.hosts, "local:2181");
        assert_eq!(settings.storage.data_dir, Some(PathBuf::from("/global/data")));
    }

    #[test]
    #[serial]
    fn test_invalid_file_is_skipped() {
        clear_env();
        let home = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join(REPO_SETTINGS_FILE), "not = [valid").unwrap();

        let settings = resolve_settings(&SettingsOverrides::default(), repo.path(), home.path());
        assert_eq!(settings.coordination.hosts, "eng-mindscope:2181");
    }

    #[test]
    #[serial]
    fn test_env_then_overrides_precedence() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        unsafe {
            std::env::set_var("NP_CONFIG_HOSTS", "env:2181");
            std::env::set_var("NP_CONFIG_PROBE_HOST", "env-host");
            std::env::set_var("NP_CONFIG_DISABLE_BACKUP", "1");
        }

        let overrides = SettingsOverrides {
            hosts: Some("cli:2181".to_string()),
            format: Some(Format::Json),
            ..Default::default()
        };
        let settings = resolve_settings(&overrides, cwd.path(), home.path());
        clear_env();

        assert_eq!(settings.coordination.hosts, "cli:2181");
        assert_eq!(settings.coordination.probe_host, "env-host");
        assert_eq!(settings.storage.format, Format::Json);
        assert!(!settings.backup.enabled);
    }

    #[test]
    #[serial]
    fn test_explicit_settings_path() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let explicit = cwd.path().join("custom.toml");
        fs::write(&explicit, "[backup]\nenabled = false\n").unwrap();

        let overrides = SettingsOverrides {
            settings_path: Some(explicit),
            ..Default::default()
        };
        let settings = resolve_settings(&overrides, cwd.path(), home.path());
        assert!(!settings.backup.enabled);
    }
}
