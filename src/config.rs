use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::store::SqliteStore;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL relative request paths are resolved against
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Request timeout; requests wait indefinitely when unset
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long a cached read may be served while offline
  #[serde(default = "default_ttl_secs")]
  pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl_secs: default_ttl_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// State database location (default: $XDG_DATA_HOME/ledgersync/state.db)
  pub path: Option<PathBuf>,
}

fn default_base_url() -> String {
  "http://localhost:8000/api/".to_string()
}

fn default_ttl_secs() -> u64 {
  300
}

/// Convert a TTL in seconds, rejecting values chrono cannot represent.
pub fn ttl_from_secs(secs: u64) -> Result<Duration> {
  i64::try_from(secs)
    .ok()
    .and_then(Duration::try_seconds)
    .ok_or_else(|| eyre!("{} seconds is out of range", secs))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ledgersync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ledgersync/config.yaml
  ///
  /// Falls back to defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ledgersync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ledgersync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the bearer token from environment variables.
  ///
  /// Checks LEDGERSYNC_TOKEN first, then API_TOKEN as fallback. A missing
  /// token is not an error: reads still work and writes get queued.
  pub fn get_api_token() -> Option<String> {
    std::env::var("LEDGERSYNC_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }

  /// Parsed base URL, always ending in `/` so relative joins append.
  pub fn base_url(&self) -> Result<Url> {
    let mut raw = self.api.base_url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }
    Url::parse(&raw).map_err(|e| eyre!("Invalid api.base_url {}: {}", self.api.base_url, e))
  }

  pub fn default_ttl(&self) -> Result<Duration> {
    ttl_from_secs(self.cache.default_ttl_secs)
      .map_err(|e| eyre!("Invalid cache.default_ttl_secs: {}", e))
  }

  pub fn timeout(&self) -> Option<std::time::Duration> {
    self.api.timeout_secs.map(std::time::Duration::from_secs)
  }

  pub fn storage_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => SqliteStore::default_path(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.api.base_url, "http://localhost:8000/api/");
    assert_eq!(config.default_ttl().unwrap(), Duration::minutes(5));
    assert!(config.timeout().is_none());
    assert!(config.storage.path.is_none());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  base_url: https://money.example.com/api
  timeout_secs: 10
cache:
  default_ttl_secs: 60
storage:
  path: /tmp/ledgersync/state.db
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(
      config.base_url().unwrap().as_str(),
      "https://money.example.com/api/"
    );
    assert_eq!(config.timeout(), Some(std::time::Duration::from_secs(10)));
    assert_eq!(config.default_ttl().unwrap(), Duration::seconds(60));
    assert_eq!(
      config.storage_path().unwrap(),
      PathBuf::from("/tmp/ledgersync/state.db")
    );
  }

  #[test]
  fn test_out_of_range_ttl_is_an_error() {
    let config: Config =
      serde_yaml::from_str("cache:\n  default_ttl_secs: 18446744073709551615\n").unwrap();
    assert!(config.default_ttl().is_err());

    let config: Config =
      serde_yaml::from_str("cache:\n  default_ttl_secs: 100000000000000000\n").unwrap();
    assert!(config.default_ttl().is_err());
  }

  #[test]
  fn test_ttl_from_secs() {
    assert_eq!(ttl_from_secs(90).unwrap(), Duration::seconds(90));
    assert!(ttl_from_secs(u64::MAX).is_err());
  }

  #[test]
  fn test_invalid_base_url() {
    let config: Config = serde_yaml::from_str("api:\n  base_url: not a url\n").unwrap();
    assert!(config.base_url().is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
