//! BillMinder configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BillMinderError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BillMinderConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl BillMinderConfig {
    /// Load config from the default path (~/.billminder/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BillMinderError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BillMinderError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BillMinderError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.schedule.dispatch_hour > 23 {
            return Err(BillMinderError::Config(format!(
                "schedule.dispatch_hour must be 0-23, got {}",
                self.schedule.dispatch_hour
            )));
        }
        match self.storage.backend.as_str() {
            "sqlite" | "json" => {}
            other => {
                return Err(BillMinderError::Config(format!(
                    "storage.backend must be 'sqlite' or 'json', got '{other}'"
                )));
            }
        }
        match self.notify.channel.as_str() {
            "smtp" | "webhook" | "none" => Ok(()),
            other => Err(BillMinderError::Config(format!(
                "notify.channel must be 'smtp', 'webhook' or 'none', got '{other}'"
            ))),
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the BillMinder home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".billminder")
    }
}

/// Daily dispatch timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local wall-clock hour of the daily dispatch slot.
    #[serde(default = "default_dispatch_hour")]
    pub dispatch_hour: u32,
    /// Pause between two consecutive sends of one run.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
}

fn default_dispatch_hour() -> u32 { 6 }
fn default_send_delay_ms() -> u64 { 2500 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            dispatch_hour: default_dispatch_hour(),
            send_delay_ms: default_send_delay_ms(),
        }
    }
}

/// Where obligations, the dispatch log and bookkeeping are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "json".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Store location; empty means the backend's default under the home dir.
    #[serde(default)]
    pub path: String,
}

fn default_backend() -> String { "sqlite".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: String::new(),
        }
    }
}

impl StorageConfig {
    /// Resolved store path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        if self.path.is_empty() {
            let file = if self.backend == "json" { "state.json" } else { "billminder.db" };
            BillMinderConfig::home_dir().join(file)
        } else {
            PathBuf::from(shellexpand::tilde(&self.path).to_string())
        }
    }
}

/// Notification channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// "smtp", "webhook" or "none".
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Upper bound for a single delivery attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

fn default_channel() -> String { "none".into() }
fn default_timeout_secs() -> u64 { 15 }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            timeout_secs: default_timeout_secs(),
            smtp: None,
            webhook: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender, e.g. "BillMinder <bills@example.com>".
    #[serde(default)]
    pub from: String,
}

fn default_smtp_port() -> u16 { 587 }

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BillMinderConfig::default();
        assert_eq!(config.schedule.dispatch_hour, 6);
        assert_eq!(config.schedule.send_delay_ms, 2500);
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.notify.channel, "none");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [schedule]
            dispatch_hour = 7

            [notify]
            channel = "smtp"

            [notify.smtp]
            host = "smtp.example.com"
            from = "Bills <bills@example.com>"
        "#;

        let config: BillMinderConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.schedule.dispatch_hour, 7);
        assert_eq!(config.schedule.send_delay_ms, 2500);
        let smtp = config.notify.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 587);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: BillMinderConfig = toml::from_str("").unwrap();
        assert_eq!(config.notify.timeout_secs, 15);
        assert!(config.notify.webhook.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BillMinderConfig::default();
        config.schedule.dispatch_hour = 24;
        assert!(config.validate().is_err());

        let mut config = BillMinderConfig::default();
        config.storage.backend = "redis".into();
        assert!(config.validate().is_err());

        let mut config = BillMinderConfig::default();
        config.notify.channel = "pigeon".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = BillMinderConfig::default();
        config.storage.backend = "json".into();
        config.save_to(&path).unwrap();

        let loaded = BillMinderConfig::load_from(&path).unwrap();
        assert_eq!(loaded.storage.backend, "json");
    }

    #[test]
    fn test_storage_default_paths() {
        let json = StorageConfig {
            backend: "json".into(),
            path: String::new(),
        };
        assert!(json.resolved_path().ends_with("state.json"));
        assert!(StorageConfig::default().resolved_path().ends_with("billminder.db"));
    }
}
