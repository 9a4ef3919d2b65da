use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_DRY_RUN: &str = "FEEDRELAY_DRY_RUN";
pub const ENV_THUMBNAILS: &str = "FEEDRELAY_THUMBNAILS";
pub const ENV_RETENTION_DAYS: &str = "FEEDRELAY_RETENTION_DAYS";
pub const ENV_MAX_CHECK_ENTRIES: &str = "FEEDRELAY_MAX_CHECK_ENTRIES";
pub const ENV_FEEDS_URL: &str = "FEEDRELAY_FEEDS_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the ledger database, checkpoint file and sentinels
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory for the append-only warn/error logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Local feed list document
    #[serde(default = "default_feeds_path")]
    pub path: PathBuf,
    /// Remote feed list document, takes precedence over `path` when set
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            path: default_feeds_path(),
            remote_url: None,
        }
    }
}

/// How the feed-level update marker is compared against the checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDetection {
    /// Plain string equality of the raw markers
    #[default]
    Marker,
    /// Parse both markers and compare the instants
    Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum entries evaluated per feed per run
    #[serde(default = "default_max_check_entries")]
    pub max_check_entries: usize,
    /// Pause after every successful post, in seconds
    #[serde(default = "default_post_interval")]
    pub post_interval_secs: u64,
    /// Hard wall-clock limit for a whole run, in seconds
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub change_detection: ChangeDetection,
    /// Attach a preview image scraped from the entry page
    #[serde(default = "default_true")]
    pub thumbnails: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_check_entries: default_max_check_entries(),
            post_interval_secs: default_post_interval(),
            run_timeout_secs: default_run_timeout(),
            request_timeout_secs: default_request_timeout(),
            change_detection: ChangeDetection::default(),
            thumbnails: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Posted-entry records older than this many days are removed by `prune`
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Base URL of the AT Protocol service
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// Log posts instead of sending them
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            dry_run: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedrelay")
}

fn default_log_dir() -> PathBuf {
    default_data_dir().join("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_feeds_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("feedrelay")
        .join("feeds.json")
}

fn default_true() -> bool {
    true
}

fn default_max_check_entries() -> usize {
    50
}

fn default_post_interval() -> u64 {
    5
}

fn default_run_timeout() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retention_days() -> u32 {
    30
}

fn default_service_url() -> String {
    "https://bsky.social".to_string()
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl AppConfig {
    /// Load configuration from the default location, then apply environment overrides
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path` (defaults when the file is absent)
    pub fn load_from(path: &std::path::Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?
        } else {
            Self::default()
        };

        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DRY_RUN) {
            self.publisher.dry_run = parse_flag(&value).ok_or_else(|| {
                crate::Error::Config(format!("{} must be a boolean, got {:?}", ENV_DRY_RUN, value))
            })?;
        }

        if let Some(value) = lookup(ENV_THUMBNAILS) {
            self.scan.thumbnails = parse_flag(&value).ok_or_else(|| {
                crate::Error::Config(format!("{} must be a boolean, got {:?}", ENV_THUMBNAILS, value))
            })?;
        }

        if let Some(value) = lookup(ENV_RETENTION_DAYS) {
            self.ledger.retention_days = value.trim().parse().map_err(|_| {
                crate::Error::Config(format!("{} must be a number of days, got {:?}", ENV_RETENTION_DAYS, value))
            })?;
        }

        if let Some(value) = lookup(ENV_MAX_CHECK_ENTRIES) {
            self.scan.max_check_entries = value.trim().parse().map_err(|_| {
                crate::Error::Config(format!("{} must be a count, got {:?}", ENV_MAX_CHECK_ENTRIES, value))
            })?;
        }

        if let Some(value) = lookup(ENV_FEEDS_URL) {
            let value = value.trim();
            if !value.is_empty() {
                url::Url::parse(value)?;
                self.feeds.remote_url = Some(value.to_string());
            }
        }

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("feedrelay")
            .join("config.toml")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        expand_tilde(&self.general.log_dir)
    }

    pub fn feeds_path(&self) -> PathBuf {
        expand_tilde(&self.feeds.path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("posted.db")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir().join("last.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir().join("feedrelay.lock")
    }

    /// Presence of this file halts every run until it is removed
    pub fn stop_path(&self) -> PathBuf {
        self.data_dir().join("stop")
    }

    pub fn stacktrace_path(&self) -> PathBuf {
        self.log_dir().join("stacktrace.log")
    }

    /// Stored Bluesky session tokens, reused across runs
    pub fn session_path(&self) -> PathBuf {
        self.data_dir().join("bsky_session.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.scan.max_check_entries, 50);
        assert_eq!(config.scan.post_interval_secs, 5);
        assert_eq!(config.scan.run_timeout_secs, 300);
        assert_eq!(config.ledger.retention_days, 30);
        assert_eq!(config.scan.change_detection, ChangeDetection::Marker);
        assert!(!config.publisher.dry_run);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [scan]
            max_check_entries = 10
            change_detection = "instant"
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.max_check_entries, 10);
        assert_eq!(config.scan.change_detection, ChangeDetection::Instant);
        assert_eq!(config.scan.post_interval_secs, 5);
        assert_eq!(config.ledger.retention_days, 30);
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            (ENV_DRY_RUN, "true"),
            (ENV_THUMBNAILS, "0"),
            (ENV_RETENTION_DAYS, "7"),
            (ENV_MAX_CHECK_ENTRIES, "20"),
            (ENV_FEEDS_URL, "https://example.com/feeds.json"),
        ]);

        let mut config = AppConfig::default();
        config.apply_env_with(|k| vars.get(k).cloned()).unwrap();

        assert!(config.publisher.dry_run);
        assert!(!config.scan.thumbnails);
        assert_eq!(config.ledger.retention_days, 7);
        assert_eq!(config.scan.max_check_entries, 20);
        assert_eq!(
            config.feeds.remote_url.as_deref(),
            Some("https://example.com/feeds.json")
        );
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let vars = env(&[(ENV_RETENTION_DAYS, "a month")]);
        let mut config = AppConfig::default();
        let result = config.apply_env_with(|k| vars.get(k).cloned());
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_sentinel_paths_live_in_data_dir() {
        let mut config = AppConfig::default();
        config.general.data_dir = PathBuf::from("/var/lib/feedrelay");

        assert_eq!(config.stop_path(), PathBuf::from("/var/lib/feedrelay/stop"));
        assert_eq!(config.lock_path(), PathBuf::from("/var/lib/feedrelay/feedrelay.lock"));
        assert_eq!(config.checkpoint_path(), PathBuf::from("/var/lib/feedrelay/last.json"));
        assert_eq!(
            config.session_path(),
            PathBuf::from("/var/lib/feedrelay/bsky_session.json")
        );
    }
}
