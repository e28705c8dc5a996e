use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// How one logical snapshot read maps onto device requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// A single `GET /global_state`.
    #[default]
    Consolidated,
    /// `GET /video_state`, `/free_space_bytes` and `/video_preview_url`,
    /// for devices that predate `global_state`.
    Split,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Used when no endpoint has been saved yet.
    #[serde(default = "default_backend_url")]
    pub default_url: String,
    #[serde(default)]
    pub fetch_mode: FetchMode,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between the end of one state poll and the start of the next.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// User-configurable paths for downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for downloaded recordings.
    #[serde(default = "platform::default_downloads_dir")]
    pub downloads_dir: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            default_url: default_backend_url(),
            fetch_mode: FetchMode::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            downloads_dir: platform::default_downloads_dir(),
        }
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.default_url, "http://127.0.0.1:8080");
        assert_eq!(config.backend.fetch_mode, FetchMode::Consolidated);
        assert_eq!(config.backend.request_timeout_secs, 5);
        assert_eq!(config.sync.poll_interval_secs, 10);
        assert!(config.paths.downloads_dir.ends_with("camdeck-downloads"));
    }

    #[test]
    fn test_partial_config_file() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            default_url = "http://192.168.1.40:5000"
            fetch_mode = "split"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.default_url, "http://192.168.1.40:5000");
        assert_eq!(config.backend.fetch_mode, FetchMode::Split);
        assert_eq!(config.backend.request_timeout_secs, 5);
        assert_eq!(config.sync.poll_interval_secs, 10);
    }
}
