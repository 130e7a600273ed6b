//! Settings types

use crate::codec::Format;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Coordination service connection settings
    #[serde(default)]
    pub coordination: CoordinationSettings,
    /// Local backing files
    #[serde(default)]
    pub storage: StorageSettings,
    /// Backup schedule
    #[serde(default)]
    pub backup: BackupSettings,
    /// Rig topology service
    #[serde(default)]
    pub topology: TopologySettings,
}

/// Coordination service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationSettings {
    /// Comma-separated `host:port` list
    pub hosts: String,
    /// Host probed for liveness before connecting
    pub probe_host: String,
    /// Scope-entry connect timeout
    pub connect_timeout_ms: u64,
    /// Session timeout negotiated with the service
    pub session_timeout_ms: u64,
    /// Upper bound on a single get/set/delete/list request
    pub request_timeout_ms: u64,
    /// Liveness probe timeout
    pub probe_timeout_ms: u64,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            hosts: "eng-mindscope:2181".to_string(),
            probe_host: "eng-mindscope.corp.alleninstitute.org".to_string(),
            connect_timeout_ms: 1000,
            session_timeout_ms: 10_000,
            request_timeout_ms: 5000,
            probe_timeout_ms: 1000,
        }
    }
}

impl CoordinationSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

const BACKUP_STEM: &str = "zk_backup";
const RECORD_STEM: &str = "zk_record";
const DEFAULT_DATA_DIR: &str = "resources";

/// Local backing file settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the backup and session records
    /// (default: `<home>/.np_config/resources`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Format of files this crate creates
    pub format: Format,
}

impl StorageSettings {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Full backup of the coordination service.
    pub fn backup_path(&self) -> PathBuf {
        self.data_dir()
            .join(format!("{BACKUP_STEM}.{}", self.format.extension()))
    }

    /// Record of keys fetched during one run, named by the invoking
    /// directory and the session start time.
    pub fn session_record_path(&self, cwd_name: &str, started: &DateTime<Local>) -> PathBuf {
        self.data_dir().join(format!(
            "{RECORD_STEM}-{cwd_name}-{}.{}",
            started.format("%Y-%m-%d_%H%M%S"),
            self.format.extension()
        ))
    }
}

/// Backup schedule settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Run the staleness gate at startup and in the periodic worker
    pub enabled: bool,
    /// Backup older than this is refreshed
    pub max_age_days: u32,
    /// How often the periodic worker re-checks staleness
    pub check_interval_secs: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: 7,
            check_interval_secs: 3600,
        }
    }
}

impl BackupSettings {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_age_days))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Rig topology service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologySettings {
    pub server_url: String,
    pub timeout_ms: u64,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            server_url: "http://mpe-computers/v2.0".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl TopologySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
