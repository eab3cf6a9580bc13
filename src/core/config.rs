use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::system_monitor::DEFAULT_HISTORY_SIZE;
use crate::core::tasks::PoolConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Async threads driving timers and periodic loops
    pub worker_threads: usize,
    /// Cap on concurrently running loaders (`None` = unbounded)
    pub max_blocking_threads: Option<usize>,
    /// How long a periodic task may take to stop before it is aborted
    pub stop_grace_ms: u64,
    /// Interval of the CPU-only process update
    pub fast_refresh_ms: u64,
    /// Interval of the full process table refresh
    pub full_refresh_ms: u64,
    /// Points kept per sparkline series
    pub history_capacity: usize,
    /// Deadline for one-shot cache loads (0 = none)
    pub load_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_blocking_threads: None,
            stop_grace_ms: 1000,
            fast_refresh_ms: 500,
            full_refresh_ms: 3000,
            history_capacity: DEFAULT_HISTORY_SIZE,
            load_timeout_ms: 0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Read `path`, falling back to defaults when it is missing, empty or not
    /// valid JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if data.is_empty() {
            return Ok(Config::default());
        }

        Ok(serde_json::from_slice(&data).unwrap_or_else(|err| {
            log::warn!("Ignoring unreadable config {:?}: {}", path, err);
            Config::default()
        }))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_vec_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, data)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Overwrite the stored config with defaults.
    pub fn reset() -> Result<Self> {
        let config = Config::default();
        config.save()?;
        Ok(config)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("sysdash").join("config.json"))
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            worker_threads: self.worker_threads.max(1),
            max_blocking_threads: self.max_blocking_threads,
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            ..PoolConfig::default()
        }
    }

    pub fn fast_refresh(&self) -> Duration {
        Duration::from_millis(self.fast_refresh_ms.max(1))
    }

    pub fn full_refresh(&self) -> Duration {
        Duration::from_millis(self.full_refresh_ms.max(1))
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_ms > 0).then(|| Duration::from_millis(self.load_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            max_blocking_threads: Some(4),
            fast_refresh_ms: 250,
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "history_capacity": 120 }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.history_capacity, 120);
        assert_eq!(config.stop_grace_ms, 1000);
    }

    #[test]
    fn test_corrupted_or_empty_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, b"not json {").unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        fs::write(&path, b"").unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_derived_settings() {
        let config = Config {
            worker_threads: 0,
            stop_grace_ms: 250,
            load_timeout_ms: 0,
            ..Default::default()
        };
        let pool = config.pool_config();
        assert_eq!(pool.worker_threads, 1);
        assert_eq!(pool.stop_grace, Duration::from_millis(250));
        assert_eq!(config.load_timeout(), None);

        let with_timeout = Config {
            load_timeout_ms: 5000,
            ..Default::default()
        };
        assert_eq!(with_timeout.load_timeout(), Some(Duration::from_secs(5)));
    }
}
