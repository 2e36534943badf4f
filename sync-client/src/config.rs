//! Configuration loading for the sync client.
//!
//! Configuration is loaded from a TOML file (default: `cultura.toml` in the
//! data directory). Every key is optional.

use cultura_sync_core::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name inside the data directory.
pub const CONFIG_FILE_NAME: &str = "cultura.toml";

/// Root configuration for the sync client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Local storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Queue replay configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Remote endpoint configuration.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Local storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database, relative to the data directory unless absolute.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Queue replay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Failed attempts after which an item is dead-lettered (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base in seconds; delay is `base * 2^retries` (default: 1).
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Upper bound of random jitter added to each delay (default: 0, off).
    #[serde(default)]
    pub jitter_ms: u64,
    /// Pending-changes refresh interval in seconds (default: 5).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Remote endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the REST endpoint. Without it nothing is replayed remotely.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("cultura.db")
}

fn default_max_retries() -> u32 {
    cultura_sync_core::DEFAULT_MAX_RETRIES
}

fn default_backoff_base_secs() -> u64 {
    1
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            jitter_ms: 0,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `cultura.toml` from `data_dir`, falling back to defaults if it does not exist.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Render the configuration as TOML (used by `cultura init`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// Resolve the database path against the data directory.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.storage.database.is_absolute() {
            self.storage.database.clone()
        } else {
            data_dir.join(&self.storage.database)
        }
    }

    /// Retry schedule for the queue manager.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new()
            .with_max_retries(self.sync.max_retries)
            .with_base(Duration::from_secs(self.sync.backoff_base_secs))
            .with_jitter(Duration::from_millis(self.sync.jitter_ms))
    }

    /// Interval at which the pending-changes counter is refreshed.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs.max(1))
    }

    /// Timeout for each remote request.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// Failed to render the configuration.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.storage.database, PathBuf::from("cultura.db"));
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.backoff_base_secs, 1);
        assert_eq!(config.sync.jitter_ms, 0);
        assert_eq!(config.sync.poll_interval_secs, 5);
        assert_eq!(config.remote.base_url, None);
        assert_eq!(config.remote.timeout_secs, 10);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [sync]
            max_retries = 3

            [remote]
            base_url = "https://api.example.org"
            "#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.backoff_base_secs, 1);
        assert_eq!(config.remote.base_url.as_deref(), Some("https://api.example.org"));
        assert_eq!(config.remote.timeout_secs, 10);
        assert_eq!(config.storage.database, PathBuf::from("cultura.db"));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync]\nmax_retries = \"many\"").unwrap();

        let err = ClientConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(dir.path()).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn rendered_config_parses_back() {
        let mut config = ClientConfig::default();
        config.remote.base_url = Some("http://localhost:3000".into());

        let text = config.to_toml().unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn database_path_is_relative_to_data_dir() {
        let config = ClientConfig::default();
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/data/cultura.db")
        );

        let mut absolute = ClientConfig::default();
        absolute.storage.database = PathBuf::from("/var/lib/cultura.db");
        assert_eq!(
            absolute.database_path(Path::new("/data")),
            PathBuf::from("/var/lib/cultura.db")
        );
    }

    #[test]
    fn backoff_policy_uses_sync_section() {
        let mut config = ClientConfig::default();
        config.sync.max_retries = 2;
        config.sync.backoff_base_secs = 3;

        let policy = config.backoff_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base, Duration::from_secs(3));
        assert_eq!(policy.max_jitter, Duration::ZERO);
    }
}
