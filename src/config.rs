//! Configuration for the backup engine.
//!
//! Loads configuration from a TOML file; every field has a default so a
//! partial (or missing) file still yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub backup: BackupConfig,
    pub schedule: ScheduleConfig,
    pub retention: RetentionConfig,
    pub notify: NotifyConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Root directory of the live server tree
    pub root: PathBuf,

    /// Directory holding world folders, relative to the root ("." = the root itself)
    pub world_container: PathBuf,

    /// Plugin data directory, relative to the root
    pub plugin_dir: PathBuf,

    /// Name of the live log file, excluded from whole-tree backups
    pub log_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Final store for backup artifacts
    pub path: PathBuf,

    /// Staging directory; empty means `<path>/temp`
    pub staging_path: Option<PathBuf>,

    /// Assemble backups in the staging directory before promoting them
    pub use_staging: bool,

    /// Compress promoted artifacts into zip files
    pub zip_archives: bool,

    /// Promote each world and the plugin tree independently
    pub split_backup: bool,

    /// Back up the whole server tree instead of worlds + plugins
    pub backup_everything: bool,

    pub backup_worlds: bool,
    pub backup_plugins: bool,

    /// Write a `worldSeed.txt` sidecar next to each backed-up world
    pub backup_world_seeds: bool,

    /// World names to skip
    pub ignored_worlds: Vec<String>,

    /// Plugin names the list filter applies to
    pub plugin_list: Vec<String>,

    /// true: `plugin_list` names plugins to skip; false: only listed plugins are kept
    pub plugin_list_is_denylist: bool,

    /// chrono format string used for backup names
    pub date_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Interval string: minutes, `<n><unit>`, `-1`, or `ta[HH:MM,...]`
    pub interval: String,

    /// Fire the interval once instead of repeating
    pub no_repeat: bool,

    /// Run scheduled backups even with nobody online
    pub backup_empty_server: bool,

    /// Grace period before the one deferred backup after the last user leaves
    pub last_backup_grace_minutes: u64,

    /// Flush live state on every trigger, admitted or not
    pub always_flush: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Count (`25`), size (`1g`), or `-1` to keep everything
    pub max_backups: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Broadcast to everyone instead of only capability holders
    pub notify_all_users: bool,

    /// Templates; `;;` separates multiple lines, empty disables the message
    pub started_message: String,
    pub finished_message: String,

    /// Re-enable the host's autosave once the backup finishes
    pub enable_autosave_after: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            world_container: PathBuf::from("."),
            plugin_dir: PathBuf::from("plugins"),
            log_name: "server.log".to_string(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("backups"),
            staging_path: None,
            use_staging: true,
            zip_archives: true,
            split_backup: false,
            backup_everything: false,
            backup_worlds: true,
            backup_plugins: true,
            backup_world_seeds: true,
            ignored_worlds: Vec::new(),
            plugin_list: Vec::new(),
            plugin_list_is_denylist: true,
            date_format: "%Y-%m-%d-%H-%M-%S".to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: "15m".to_string(),
            no_repeat: false,
            backup_empty_server: false,
            last_backup_grace_minutes: 15,
            always_flush: false,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_backups: "25".to_string(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            notify_all_users: true,
            started_message: "Backup started.".to_string(),
            finished_message: "Backup finished.".to_string(),
            enable_autosave_after: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Staging root: the configured path, or `<backup path>/temp`
    pub fn staging_root(&self) -> PathBuf {
        match &self.backup.staging_path {
            Some(p) if !p.as_os_str().is_empty() => p.clone(),
            _ => self.backup.path.join("temp"),
        }
    }
}
