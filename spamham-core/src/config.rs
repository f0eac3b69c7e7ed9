use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryConfig;

/// Configuration for the spamham service and CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamhamConfig {
    pub server: ServerSection,
    pub store: StoreSection,
    /// Retry policy for pending counter transactions
    pub counter: RetryConfig,
    pub auth: AuthSection,
    pub reconcile: ReconcileSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    /// Allow any origin (development only)
    pub cors_permissive: bool,
    /// Deadline applied to every request's store calls
    pub request_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            cors_permissive: false,
            request_timeout_secs: 10,
        }
    }
}

impl ServerSection {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Postgres URL; `None` means the caller must use the in-memory store
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Rows fetched per cursor page when listing
    pub page_size: i64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            page_size: 500,
        }
    }
}

/// Names of the headers set by the fronting auth proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub user_header: String,
    pub admin_header: String,
    /// Where anonymous moderators are redirected
    pub login_url: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            user_header: "x-spamham-user".to_string(),
            admin_header: "x-spamham-admin".to_string(),
            login_url: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    /// 0 disables the background task
    pub interval_secs: u64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl ReconcileSection {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl SpamhamConfig {
    /// Load from ~/.spamham/config.toml, falling back to defaults when the
    /// file does not exist. Environment overrides are applied either way.
    pub fn load() -> Result<Self> {
        Self::load_or_default(&Self::config_path())
    }

    /// Config file path: ~/.spamham/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".spamham/config.toml")
    }

    /// Load an explicit file; a missing file is an error
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;

        let mut config: Self =
            toml::from_str(&content).context("Failed to parse config file (invalid TOML)")?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }

        tracing::debug!(path = %path.display(), "No config file, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// DATABASE_URL and SPAMHAM_BIND win over the file
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.store.database_url = Some(url);
            }
        }
        if let Ok(bind) = env::var("SPAMHAM_BIND") {
            if !bind.is_empty() {
                self.server.bind = bind;
            }
        }
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(path, toml_str).context(format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [auth]
            login_url = "/login"

            [counter]
            max_attempts = 8
            "#,
        )
        .unwrap();

        let config = SpamhamConfig::load_from(&path).unwrap();
        assert_eq!(config.auth.login_url, "/login");
        assert_eq!(config.auth.user_header, "x-spamham-user");
        assert_eq!(config.counter.max_attempts, 8);
        assert_eq!(config.counter.initial_delay, RetryConfig::DEFAULT.initial_delay);
        assert_eq!(config.reconcile.interval_secs, 300);
    }

    #[test]
    fn negative_backoff_multiplier_from_file_is_usable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[counter]\nbackoff_multiplier = -2.0\njitter = false\n").unwrap();

        let config = SpamhamConfig::load_from(&path).unwrap();
        assert_eq!(config.counter.backoff_multiplier, -2.0);
        assert_eq!(config.counter.delay_for_attempt(1), config.counter.initial_delay);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = SpamhamConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.request_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.store.max_connections, 5);
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(SpamhamConfig::load_from(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn invalid_toml_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nbind = ").unwrap();

        let err = SpamhamConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = SpamhamConfig::default();
        config.reconcile.interval_secs = 0;
        config.server.cors_permissive = true;
        config.save_to(&path).unwrap();

        let loaded = SpamhamConfig::load_from(&path).unwrap();
        assert_eq!(loaded.reconcile.interval(), None);
        assert!(loaded.server.cors_permissive);
    }
}
