//! Chomka configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use chomkastore::{DEFAULT_DATA_DIR, write_atomic};

/// Project-local config file name
pub const LOCAL_CONFIG: &str = "chomka.yml";

/// Main Chomka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding state, layout and assets
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Bounds on waiting for queued persistence work
    pub timeouts: TimeoutConfig,

    /// Shutdown handshake timing
    pub lifecycle: LifecycleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_level: None,
            timeouts: TimeoutConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Returns the config and the path it should be saved back to.
    pub fn load(config_path: Option<&PathBuf>) -> Result<(Self, PathBuf)> {
        // If explicit config path provided, it must load (or not exist yet)
        if let Some(path) = config_path {
            if !path.exists() {
                tracing::info!("Config {} does not exist yet, using defaults", path.display());
                return Ok((Self::default(), path.clone()));
            }
            let config =
                Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?;
            return Ok((config, path.clone()));
        }

        // Try project-local config: ./chomka.yml
        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok((config, local_config)),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/chomka/chomka.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("chomka").join(LOCAL_CONFIG);
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok((config, user_config)),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults and save next to the app
        tracing::info!("No config file found, using defaults");
        Ok((Self::default(), local_config))
    }

    /// Load only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = config_path.cloned().unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG));
        let content = fs::read_to_string(path).ok()?;
        let config: Self = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save config atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        write_atomic(path, content)?;
        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Data directory as an absolute path (relative paths hang off `base`)
    pub fn resolved_data_dir(&self, base: &Path) -> PathBuf {
        if self.data_dir.is_absolute() {
            self.data_dir.clone()
        } else {
            base.join(&self.data_dir)
        }
    }
}

/// Bounds on waiting for queued persistence work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Waited file and state saves
    #[serde(rename = "save-ms")]
    pub save_ms: u64,

    /// Waited asset saves (payloads can be large)
    #[serde(rename = "asset-ms")]
    pub asset_ms: u64,

    /// Queued reads
    #[serde(rename = "read-ms")]
    pub read_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            save_ms: 10_000,
            asset_ms: 30_000,
            read_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn save(&self) -> Duration {
        Duration::from_millis(self.save_ms)
    }

    pub fn asset(&self) -> Duration {
        Duration::from_millis(self.asset_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

/// Shutdown handshake timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Safety timer: force termination if the UI never finishes saving
    #[serde(rename = "shutdown-timeout-ms")]
    pub shutdown_timeout_ms: u64,

    /// Delay before telling the UI to start its shutdown sequence
    #[serde(rename = "trigger-delay-ms")]
    pub trigger_delay_ms: u64,

    /// Delay between the UI's quit call and window destruction
    #[serde(rename = "quit-grace-ms")]
    pub quit_grace_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 60_000,
            trigger_delay_ms: 10,
            quit_grace_ms: 100,
        }
    }
}

impl LifecycleConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn trigger_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_delay_ms)
    }

    pub fn quit_grace(&self) -> Duration {
        Duration::from_millis(self.quit_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("shared_data"));
        assert_eq!(config.timeouts.save(), Duration::from_secs(10));
        assert_eq!(config.timeouts.asset(), Duration::from_secs(30));
        assert_eq!(config.lifecycle.shutdown_timeout(), Duration::from_secs(60));
        assert_eq!(config.lifecycle.trigger_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "data-dir: /srv/chomka\nlifecycle:\n  shutdown-timeout-ms: 5000\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/chomka"));
        assert_eq!(config.lifecycle.shutdown_timeout_ms, 5000);
        assert_eq!(config.lifecycle.quit_grace_ms, 100);
        assert_eq!(config.timeouts.save_ms, 10_000);
    }

    #[test]
    fn test_save_and_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chomka.yml");
        let config = Config {
            data_dir: temp.path().join("data"),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        config.save(&path).unwrap();
        let (loaded, loaded_path) = Config::load(Some(&path)).unwrap();

        assert_eq!(loaded_path, path);
        assert_eq!(loaded.data_dir, temp.path().join("data"));
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("debug"));
    }

    #[test]
    fn test_explicit_missing_path_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.yml");

        let (config, saved_to) = Config::load(Some(&path)).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("shared_data"));
        assert_eq!(saved_to, path);
    }

    #[test]
    fn test_explicit_invalid_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.yml");
        fs::write(&path, "data-dir: [unclosed").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_resolved_data_dir() {
        let base = Path::new("/opt/app");
        let relative = Config::default();
        assert_eq!(relative.resolved_data_dir(base), PathBuf::from("/opt/app/shared_data"));

        let absolute = Config {
            data_dir: PathBuf::from("/data"),
            ..Default::default()
        };
        assert_eq!(absolute.resolved_data_dir(base), PathBuf::from("/data"));
    }
}
