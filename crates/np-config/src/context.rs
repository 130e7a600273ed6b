//! Process-wide config context
//!
//! Holds the two shared stores (backup and session record) together with the
//! settings, liveness probe and client factory every session needs. Build
//! one per process and pass it by reference; sessions borrow from it but
//! never own its stores.

use crate::backup;
use crate::home::get_home_dir;
use crate::remote::{ClientFactory, LivenessProbe, PingProbe};
use crate::settings::{Settings, SettingsOverrides, resolve_settings};
use crate::store::{LocalStore, StoreError};
use anyhow::Context as _;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state for one process
pub struct ConfigContext {
    settings: Settings,
    backup: Arc<LocalStore>,
    session_record: Arc<LocalStore>,
    probe: Arc<dyn LivenessProbe>,
    clients: Arc<dyn ClientFactory>,
}

impl ConfigContext {
    pub fn builder(settings: Settings) -> ConfigContextBuilder {
        ConfigContextBuilder {
            settings,
            probe: None,
            clients: None,
            started_at: None,
            working_dir_name: None,
        }
    }

    /// Build with default probe and client factory, then run the startup
    /// backup gate.
    pub fn bootstrap(settings: Settings) -> Result<Self, StoreError> {
        Self::builder(settings).bootstrap()
    }

    /// Resolve settings from the home directory, working directory and
    /// environment, then bootstrap.
    pub fn from_environment(overrides: &SettingsOverrides) -> anyhow::Result<Self> {
        let home = get_home_dir()?;
        let cwd = std::env::current_dir().context("Could not determine working directory")?;
        let settings = resolve_settings(overrides, &cwd, &home);
        Ok(Self::bootstrap(settings)?)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Full local mirror of the coordination service.
    pub fn backup(&self) -> &Arc<LocalStore> {
        &self.backup
    }

    /// Keys fetched from the coordination service during this run.
    pub fn session_record(&self) -> &Arc<LocalStore> {
        &self.session_record
    }

    pub fn probe(&self) -> &dyn LivenessProbe {
        self.probe.as_ref()
    }

    pub fn clients(&self) -> &dyn ClientFactory {
        self.clients.as_ref()
    }
}

/// Builder for [`ConfigContext`]
pub struct ConfigContextBuilder {
    settings: Settings,
    probe: Option<Arc<dyn LivenessProbe>>,
    clients: Option<Arc<dyn ClientFactory>>,
    started_at: Option<DateTime<Local>>,
    working_dir_name: Option<String>,
}

impl ConfigContextBuilder {
    pub fn probe<P: LivenessProbe + 'static>(mut self, probe: P) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    pub fn client_factory<F: ClientFactory + 'static>(mut self, factory: F) -> Self {
        self.clients = Some(Arc::new(factory));
        self
    }

    /// Session start time used in the session record file name.
    pub fn started_at(mut self, started_at: DateTime<Local>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Working directory name used in the session record file name.
    pub fn working_dir_name(mut self, name: impl Into<String>) -> Self {
        self.working_dir_name = Some(name.into());
        self
    }

    /// Open both stores. No backup is attempted.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing backing file cannot be read or
    /// decoded.
    pub fn build(self) -> Result<ConfigContext, StoreError> {
        let storage = &self.settings.storage;
        let started_at = self.started_at.unwrap_or_else(Local::now);
        let cwd_name = self.working_dir_name.unwrap_or_else(current_dir_name);

        let backup = LocalStore::open(storage.backup_path())?;
        let session_record = LocalStore::open(storage.session_record_path(&cwd_name, &started_at))?;
        debug!(
            "Backup at {}, session record at {}",
            backup.path().display(),
            session_record.path().display()
        );

        let probe = self.probe.unwrap_or_else(|| -> Arc<dyn LivenessProbe> {
            Arc::new(PingProbe::new(self.settings.coordination.probe_timeout()))
        });
        let clients = self.clients.unwrap_or_else(default_client_factory);

        Ok(ConfigContext {
            settings: self.settings,
            backup: Arc::new(backup),
            session_record: Arc::new(session_record),
            probe,
            clients,
        })
    }

    /// Build, then refresh the backup if it is missing or stale.
    ///
    /// A failed startup backup is logged and does not fail the build.
    pub fn bootstrap(self) -> Result<ConfigContext, StoreError> {
        let ctx = self.build()?;
        if !ctx.settings.backup.enabled {
            debug!("Startup backup disabled");
            return Ok(ctx);
        }
        match backup::backup_if_stale(&ctx) {
            Ok(Some(outcome)) => info!("Startup backup: {outcome}"),
            Ok(None) => debug!("Backup at {} is fresh", ctx.backup.path().display()),
            Err(e) => warn!("Startup backup failed: {e}"),
        }
        Ok(ctx)
    }
}

fn current_dir_name() -> String {
    std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(feature = "zookeeper")]
fn default_client_factory() -> Arc<dyn ClientFactory> {
    Arc::new(crate::remote::ZooKeeperClientFactory)
}

#[cfg(not(feature = "zookeeper"))]
fn default_client_factory() -> Arc<dyn ClientFactory> {
    Arc::new(crate::remote::OfflineClientFactory)
}
