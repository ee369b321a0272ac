use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for table snapshots and the master table (overrides XDG default).
    pub data_dir: Option<PathBuf>,
    /// Custom master table path (overrides `<data_dir>/master.json`).
    pub master_path: Option<PathBuf>,
    /// Custom response-cache database path (overrides XDG default).
    pub cache_db_path: Option<PathBuf>,
    /// Spotify API settings.
    pub api: ApiConfig,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// Stored credentials, so they don't have to be passed on every fetch.
    pub spotify: Credentials,
}

/// Spotify Web API request settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry attempts for transport errors, 429 and 5xx responses.
    pub retries: u32,
    /// Politeness delay between API requests in milliseconds.
    pub rate_limit_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 10,
            rate_limit_ms: 100,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache TTL in days before re-fetching from the API.
    pub ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_days: 30 }
    }
}

/// Optional stored client credentials.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl AppConfig {
    /// Load config from `~/.config/tracklens/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve the snapshots/master data directory: config > XDG default.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        default_data_dir()
    }

    /// Resolve the master table path: config > `<data_dir>/master.json`.
    pub fn resolve_master_path(&self) -> PathBuf {
        if let Some(path) = &self.master_path {
            return path.clone();
        }
        self.resolve_data_dir().join("master.json")
    }

    /// Resolve the response-cache database path: config > XDG default.
    pub fn resolve_cache_db_path(&self) -> PathBuf {
        if let Some(path) = &self.cache_db_path {
            return path.clone();
        }
        default_cache_db_path()
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default data directory using XDG paths.
pub fn default_data_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().to_path_buf()
    } else {
        // Fallback: current directory
        PathBuf::from("tracklens-data")
    }
}

/// Resolve the default cache database path using XDG data directory.
pub fn default_cache_db_path() -> PathBuf {
    default_data_dir().join("cache.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.api.retries, 10);
        assert_eq!(config.cache.ttl_days, 30);
        assert!(config.spotify.client_id.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
            data_dir = "/tmp/tl"

            [api]
            timeout_secs = 5

            [spotify]
            client_id = "abc123"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.data_dir.as_deref(), Some(std::path::Path::new("/tmp/tl")));
        assert_eq!(config.api.timeout_secs, 5);
        // Unspecified fields keep defaults
        assert_eq!(config.api.retries, 10);
        assert_eq!(config.cache.ttl_days, 30);
        assert_eq!(config.spotify.client_id.as_deref(), Some("abc123"));
        assert_eq!(config.resolve_master_path(), PathBuf::from("/tmp/tl/master.json"));
    }
}
