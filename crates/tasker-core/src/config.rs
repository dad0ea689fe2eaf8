use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 3;
/// Directory under `$HOME` that holds the database, logs and config file.
pub const HOME_DIR_NAME: &str = ".tasker";

/// Top-level config (tasker.toml + TASKER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskerConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding the `processes` registry and the `process_stats` ledger.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Directory of `{job_name}.txt` / `{job_name}_stdout.txt` files.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long a worker sleeps between due-checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long the reaper waits for descendants after SIGTERM before SIGKILL.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn grace_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.grace_period_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_grace_period_secs() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}
fn default_db_path() -> PathBuf {
    home_dir().join("data").join("process.db")
}
fn default_log_dir() -> PathBuf {
    home_dir().join("logs")
}

/// `~/.tasker`, or `./.tasker` when `$HOME` is unset.
pub fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(HOME_DIR_NAME)
}

impl TaskerConfig {
    /// Load config from a TOML file with TASKER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.tasker/tasker.toml
    ///
    /// Nested keys in env vars are separated by a double underscore, e.g.
    /// `TASKER_SCHEDULER__POLL_INTERVAL_MS=500`.
    pub fn load(config_path: Option<&Path>) -> crate::error::Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        let config: TaskerConfig = Figment::from(Serialized::defaults(TaskerConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TASKER_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Create the database parent folder and the log folder if they are missing.
    pub fn ensure_dirs(&self) -> crate::error::Result<()> {
        if let Some(parent) = self.storage.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(&self.logs.dir)?;
        Ok(())
    }
}

fn default_config_path() -> PathBuf {
    home_dir().join("tasker.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_home_dir() {
        let config = TaskerConfig::default();
        assert!(config.storage.path.ends_with("data/process.db"));
        assert!(config.logs.dir.ends_with("logs"));
        assert_eq!(config.scheduler.poll_interval_ms, 1_000);
        assert_eq!(config.scheduler.grace_period_secs, 3);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasker.toml");
        std::fs::write(
            &path,
            "[storage]\npath = \"/tmp/t.db\"\n\n[scheduler]\npoll_interval_ms = 250\n",
        )
        .unwrap();

        let config = TaskerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.storage.path, PathBuf::from("/tmp/t.db"));
        assert_eq!(config.scheduler.poll_interval_ms, 250);
        // Untouched sections keep their defaults.
        assert_eq!(config.scheduler.grace_period_secs, 3);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TaskerConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.scheduler.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn ensure_dirs_creates_folders() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TaskerConfig::default();
        config.storage.path = dir.path().join("data").join("process.db");
        config.logs.dir = dir.path().join("logs");

        config.ensure_dirs().unwrap();
        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let cfg = SchedulerConfig {
            poll_interval_ms: 0,
            grace_period_secs: 3,
        };
        assert_eq!(cfg.poll_interval(), std::time::Duration::from_millis(1));
    }
}
