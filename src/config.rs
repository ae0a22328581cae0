//! Configuration management for deckcrawl using the prefer crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::DataSource;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "deckcrawl.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("Unknown target '{0}'")]
    UnknownTarget(String),
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// User agent for HTTP requests (None uses the built-in one).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between requests in milliseconds.
    pub request_delay_ms: u64,
    /// Hops walked in each direction when reading a log chain.
    pub log_max_hops: u32,
    /// Seconds between scheduler ticks.
    pub scheduler_interval: u64,
    /// Targets the scheduler starts runs for when none is open.
    pub auto_start: Vec<DataSource>,
    /// First discovery page per target.
    pub endpoints: HashMap<DataSource, String>,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deckcrawl");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            user_agent: None,
            request_timeout: 30,
            request_delay_ms: 500,
            log_max_hops: crate::repository::DEFAULT_MAX_HOPS,
            scheduler_interval: 60,
            auto_start: Vec::new(),
            endpoints: HashMap::from([
                (
                    DataSource::Archidekt,
                    "https://archidekt.com/api/decks/v3/?orderBy=-updatedAt".to_string(),
                ),
                (
                    DataSource::Moxfield,
                    "https://api.moxfield.com/v2/decks/search?sortType=updated&sortDirection=Descending"
                        .to_string(),
                ),
            ]),
        }
    }
}

impl Settings {
    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval.max(1))
    }
}

/// Per-target source settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// First discovery page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
}

/// Scheduler settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Targets to keep a run open for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_start: Vec<String>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_max_hops: Option<u32>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Source settings keyed by target name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sources: HashMap<String, SourceConfig>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a deckcrawl config file in the standard locations.
    ///
    /// Falls back to defaults when nothing is found or the file is unusable.
    pub async fn load() -> Self {
        let discovered = match prefer::load("deckcrawl").await {
            Ok(pref_config) => pref_config.source_path().map(|p| p.to_path_buf()),
            Err(_) => None,
        };

        match discovered {
            Some(path) => match Self::load_from_path(&path).await {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("{}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file, by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory relative paths resolve against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(
        &self,
        settings: &mut Settings,
        base_dir: &Path,
    ) -> Result<(), ConfigError> {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(hops) = self.log_max_hops {
            settings.log_max_hops = hops;
        }
        if let Some(interval) = self.scheduler.interval {
            settings.scheduler_interval = interval;
        }
        if !self.scheduler.auto_start.is_empty() {
            settings.auto_start = self
                .scheduler
                .auto_start
                .iter()
                .map(|name| parse_target(name))
                .collect::<Result<_, _>>()?;
        }
        for (name, source) in &self.sources {
            let target = parse_target(name)?;
            if let Some(ref start_url) = source.start_url {
                settings.endpoints.insert(target, start_url.clone());
            }
        }
        Ok(())
    }
}

/// Parse a target name as used in config files and on the command line.
pub fn parse_target(name: &str) -> Result<DataSource, ConfigError> {
    DataSource::from_str(&name.to_ascii_lowercase())
        .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data-dir flag).
    pub data_dir: Option<PathBuf>,
}

/// Load settings: defaults, then the config file, then explicit overrides.
pub async fn load_settings(options: LoadOptions) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir)?;

    if let Some(data_dir) = options.data_dir {
        settings.data_dir = data_dir;
    }

    // DECKCRAWL_DATA_DIR takes precedence over the config file
    if let Some(dir) = std::env::var("DECKCRAWL_DATA_DIR")
        .ok()
        .filter(|s| !s.is_empty())
    {
        tracing::debug!("Using DECKCRAWL_DATA_DIR from environment: {}", dir);
        settings.data_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
    }

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_toml_config_overlays_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deckcrawl.toml");
        std::fs::write(
            &path,
            r#"
            data_dir = "state"
            request_delay_ms = 50

            [scheduler]
            interval = 15
            auto_start = ["archidekt"]

            [sources.moxfield]
            start_url = "https://feed.test/moxfield"
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config
            .apply_to_settings(&mut settings, &config.base_dir().unwrap())
            .unwrap();

        assert_eq!(settings.data_dir, dir.path().join("state"));
        assert_eq!(settings.request_delay_ms, 50);
        assert_eq!(settings.scheduler_interval, 15);
        assert_eq!(settings.auto_start, vec![DataSource::Archidekt]);
        assert_eq!(
            settings.endpoints[&DataSource::Moxfield],
            "https://feed.test/moxfield"
        );
    }

    #[tokio::test]
    async fn test_yaml_and_json_by_extension() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("deckcrawl.yaml");
        std::fs::write(&yaml, "database: other.db\nlog_max_hops: 4\n").unwrap();
        let json = dir.path().join("deckcrawl.json");
        std::fs::write(&json, r#"{"request_timeout": 5}"#).unwrap();

        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.database.as_deref(), Some("other.db"));
        assert_eq!(config.log_max_hops, Some(4));

        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.request_timeout, Some(5));
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut config = Config::default();
        config.scheduler.auto_start = vec!["tappedout".to_string()];

        let result = config.apply_to_settings(&mut Settings::default(), Path::new("."));
        assert!(matches!(result, Err(ConfigError::UnknownTarget(name)) if name == "tappedout"));
    }
}
