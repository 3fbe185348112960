use config::{Config, Environment, File as ConfigFile, FileFormat};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/qbit-mirror/config.toml";
pub const CONFIG_PATH_ENV: &str = "QBIT_MIRROR_CONFIG";
const ENV_PREFIX: &str = "QBIT_MIRROR";

/// States qBittorrent reports for a torrent that is complete and seeding.
pub const DEFAULT_SEEDING_STATES: [&str; 5] =
    ["uploading", "stalledUP", "queuedUP", "forcedUP", "checkingUP"];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: EndpointConfig,
    pub destination: EndpointConfig,
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// 0 = errors only, 1 = normal, 2 = debug.
    #[serde(default = "default_verbose")]
    pub verbose: u8,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_https: bool,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    pub username: String,
    pub password: String,
}

impl EndpointConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn redacted(&self) -> Self {
        Self {
            password: "********".to_string(),
            ..self.clone()
        }
    }
}

/// What happens to the payload when an orphan is removed from the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Drop the torrent, keep the downloaded files.
    #[default]
    Remove,
    /// Drop the torrent together with its files.
    Delete,
}

impl CleanupMode {
    pub fn deletes_files(self) -> bool {
        matches!(self, CleanupMode::Delete)
    }
}

impl std::fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupMode::Remove => write!(f, "remove"),
            CleanupMode::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub cleanup_mode: CleanupMode,
    pub skip_checking: bool,
    pub start_paused: bool,
    pub force_active: bool,
    /// Pause between two replications, in seconds.
    pub sync_interval_secs: f64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            cleanup_mode: CleanupMode::Remove,
            skip_checking: true,
            start_paused: false,
            force_active: true,
            sync_interval_secs: 0.5,
        }
    }
}

impl ReplicationConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sync_interval_secs.max(0.0))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub only_seeding_states: bool,
    pub seeding_states: Vec<String>,
    pub categories: Option<Vec<String>>,
    pub min_size_gb: Option<f64>,
    pub min_ratio: Option<f64>,
    pub min_upload_gb: Option<f64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            only_seeding_states: true,
            seeding_states: DEFAULT_SEEDING_STATES.iter().map(|s| s.to_string()).collect(),
            categories: None,
            min_size_gb: None,
            min_ratio: None,
            min_upload_gb: None,
        }
    }
}

impl PolicyConfig {
    /// True when `category` passes the category allow-set (or no allow-set is configured).
    pub fn allows_category(&self, category: &str) -> bool {
        match &self.categories {
            Some(allowed) => allowed.iter().any(|c| c == category),
            None => true,
        }
    }
}

fn default_database_file() -> PathBuf {
    PathBuf::from("/var/lib/qbit-mirror/state.db")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("/var/log/qbit-mirror.log")
}

fn default_verbose() -> u8 {
    1
}

fn default_request_timeout() -> u64 {
    30
}

fn default_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse a configuration from TOML text, without environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: AppConfig = Config::builder()
            .add_source(ConfigFile::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (side, endpoint) in [("source", &self.source), ("destination", &self.destination)] {
            if endpoint.host.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{}.host is empty", side)));
            }
            if endpoint.port == 0 {
                return Err(Error::InvalidConfig(format!("{}.port must be non-zero", side)));
            }
        }

        if self.replication.sync_interval_secs < 0.0 {
            return Err(Error::InvalidConfig(
                "replication.sync_interval_secs must not be negative".to_string(),
            ));
        }

        let thresholds = [
            ("policy.min_size_gb", self.policy.min_size_gb),
            ("policy.min_ratio", self.policy.min_ratio),
            ("policy.min_upload_gb", self.policy.min_upload_gb),
        ];
        for (name, value) in thresholds {
            if matches!(value, Some(v) if v < 0.0 || v.is_nan()) {
                return Err(Error::InvalidConfig(format!("{} must not be negative", name)));
            }
        }

        Ok(())
    }
}

/// Pick the configuration file: explicit argument, then `QBIT_MIRROR_CONFIG`, then the default.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load the TOML file at `path`, layered with `QBIT_MIRROR__*` environment overrides.
pub fn load_configuration(path: &Path) -> Result<AppConfig, Error> {
    if !path.is_file() {
        return Err(Error::InvalidConfig(format!(
            "configuration file {} not found",
            path.display()
        )));
    }

    let builder = Config::builder()
        .add_source(ConfigFile::from(path).format(FileFormat::Toml).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [source]
        host = "src.example.org"
        username = "admin"
        password = "one"

        [destination]
        host = "dst.example.org"
        port = 8080
        use_https = false
        username = "admin"
        password = "two"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.source.base_url(), "https://src.example.org:443");
        assert_eq!(config.destination.base_url(), "http://dst.example.org:8080");
        assert_eq!(config.verbose, 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.replication.cleanup_mode, CleanupMode::Remove);
        assert!(config.replication.skip_checking);
        assert!(config.replication.force_active);
        assert_eq!(config.replication.sync_interval(), Duration::from_millis(500));
        assert!(config.policy.only_seeding_states);
        assert_eq!(config.policy.seeding_states.len(), 5);
        assert!(config.policy.categories.is_none());
    }

    #[test]
    fn test_policy_and_cleanup_mode_parse() {
        let text = format!(
            "{}\n[replication]\ncleanup_mode = \"delete\"\n\n\
             [policy]\ncategories = [\"movies\"]\nmin_ratio = 1.5\n",
            MINIMAL
        );
        let config = AppConfig::from_toml_str(&text).unwrap();
        assert!(config.replication.cleanup_mode.deletes_files());
        assert_eq!(config.policy.min_ratio, Some(1.5));
        assert!(config.policy.allows_category("movies"));
        assert!(!config.policy.allows_category("tv"));
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let text = format!("{}\n[policy]\nmin_size_gb = -1.0\n", MINIMAL);
        let err = AppConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_configuration(Path::new("/nonexistent/qbit-mirror.toml")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_load_configuration_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = load_configuration(&path).unwrap();
        assert_eq!(config.destination.port, 8080);
    }

    #[test]
    fn test_redacted_hides_password() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        let redacted = config.source.redacted();
        assert_ne!(redacted.password, "one");
        assert_eq!(redacted.username, "admin");
    }
}
