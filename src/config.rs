//! Configuration file parser for ~/.config/skein/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings so typos are visible.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{ManagerSettings, TreeLimits};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minutes a source's cached posts are served before refetching.
    pub refresh_interval_minutes: u64,

    /// Minutes a cached comment tree is reused. 0 = always fetch live.
    pub comment_cache_minutes: u64,

    /// Deadline for every individual HTTP request.
    pub request_timeout_secs: u64,

    pub user_agent: String,

    /// Allow RSS feeds on localhost and private address ranges.
    pub allow_private_hosts: bool,

    /// Database file; defaults to `skein.db` in the config directory.
    pub database_path: Option<PathBuf>,

    pub comment_tree: CommentTreeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: 60,
            comment_cache_minutes: 0,
            request_timeout_secs: 30,
            user_agent: "skein/0.1".to_string(),
            allow_private_hosts: false,
            database_path: None,
            comment_tree: CommentTreeConfig::default(),
        }
    }
}

/// `[comment_tree]` table: limits for providers that fetch one node per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommentTreeConfig {
    pub max_depth: u32,
    pub max_top_level: usize,
    pub max_replies: usize,
    pub top_level_pool: usize,
    pub reply_pool: usize,
}

impl Default for CommentTreeConfig {
    fn default() -> Self {
        let limits = TreeLimits::default();
        Self {
            max_depth: limits.max_depth,
            max_top_level: limits.max_top_level,
            max_replies: limits.max_replies,
            top_level_pool: limits.top_level_pool,
            reply_pool: limits.reply_pool,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "refresh_interval_minutes",
        "comment_cache_minutes",
        "request_timeout_secs",
        "user_agent",
        "allow_private_hosts",
        "database_path",
        "comment_tree",
    ];

    const KNOWN_TREE_KEYS: [&'static str; 5] = [
        "max_depth",
        "max_top_level",
        "max_replies",
        "top_level_pool",
        "reply_pool",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Size check before reading so a corrupted file can't exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_interval_minutes = config.refresh_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse TOML text, warning about keys this version doesn't know.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
            if let Some(toml::Value::Table(tree)) = raw.get("comment_tree") {
                for key in tree.keys() {
                    if !Self::KNOWN_TREE_KEYS.contains(&key.as_str()) {
                        tracing::warn!(key = %key, "Unknown key in [comment_tree], ignoring");
                    }
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            refresh_interval: minutes(self.refresh_interval_minutes),
            comment_cache_ttl: (self.comment_cache_minutes > 0)
                .then(|| minutes(self.comment_cache_minutes)),
        }
    }

    pub fn tree_limits(&self) -> TreeLimits {
        let tree = self.comment_tree;
        TreeLimits {
            max_depth: tree.max_depth,
            max_top_level: tree.max_top_level,
            max_replies: tree.max_replies,
            top_level_pool: tree.top_level_pool.max(1),
            reply_pool: tree.reply_pool.max(1),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Configured database path, or `skein.db` under `config_dir`.
    pub fn database_path_in(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("skein.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("skein_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.refresh_interval_minutes, 60);
        assert_eq!(config.comment_cache_minutes, 0);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.user_agent.starts_with("skein/"));
        assert!(!config.allow_private_hosts);
        assert!(config.database_path.is_none());
        assert_eq!(config.tree_limits(), TreeLimits::default());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/skein_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "refresh_interval_minutes = 15\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_interval_minutes, 15);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.comment_tree, CommentTreeConfig::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
refresh_interval_minutes = 30
comment_cache_minutes = 10
request_timeout_secs = 5
user_agent = "my-agent/1.0"
allow_private_hosts = true
database_path = "/var/lib/skein/cache.db"

[comment_tree]
max_depth = 2
max_top_level = 50
max_replies = 8
top_level_pool = 16
reply_pool = 4
"#;
        let config = Config::parse(content).unwrap();

        assert_eq!(config.user_agent, "my-agent/1.0");
        assert!(config.allow_private_hosts);
        assert_eq!(
            config.database_path_in(Path::new("/home/u/.config/skein")),
            PathBuf::from("/var/lib/skein/cache.db")
        );
        assert_eq!(
            config.tree_limits(),
            TreeLimits {
                max_depth: 2,
                max_top_level: 50,
                max_replies: 8,
                top_level_pool: 16,
                reply_pool: 4,
            }
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_manager_settings_conversion() {
        let config = Config::parse("refresh_interval_minutes = 2\ncomment_cache_minutes = 3").unwrap();
        let settings = config.manager_settings();
        assert_eq!(settings.refresh_interval, Duration::from_secs(120));
        assert_eq!(settings.comment_cache_ttl, Some(Duration::from_secs(180)));

        assert_eq!(Config::default().manager_settings().comment_cache_ttl, None);
    }

    #[test]
    fn test_huge_minutes_saturate() {
        let config = Config {
            refresh_interval_minutes: u64::MAX,
            comment_cache_minutes: u64::MAX / 2,
            ..Config::default()
        };
        let settings = config.manager_settings();
        assert_eq!(settings.refresh_interval, Duration::from_secs(u64::MAX));
        assert_eq!(settings.comment_cache_ttl, Some(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn test_zero_pools_clamped() {
        let config = Config::parse("[comment_tree]\ntop_level_pool = 0\nreply_pool = 0\n").unwrap();
        let limits = config.tree_limits();
        assert_eq!(limits.top_level_pool, 1);
        assert_eq!(limits.reply_pool, 1);
    }

    #[test]
    fn test_default_database_path_under_config_dir() {
        assert_eq!(
            Config::default().database_path_in(Path::new("/cfg")),
            PathBuf::from("/cfg/skein.db")
        );
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = r#"
refresh_interval_minutes = 5
theme = "dark"

[comment_tree]
max_depht = 3
"#;
        let config = Config::parse(content).unwrap();
        assert_eq!(config.refresh_interval_minutes, 5);
        assert_eq!(config.comment_tree.max_depth, 1);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::parse("refresh_interval_minutes = \"hourly\"\n").is_err());
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
