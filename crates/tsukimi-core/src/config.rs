use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TsukimiError;
use crate::models::Language;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub progress: ProgressConfig,
    pub sync: SyncConfig,
    pub mapping: MappingConfig,
    pub bridge: BridgeConfig,
    pub player: PlayerConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Name of the durable record holding the whole progress map.
    pub record_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    pub repeat_suppress_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub enabled: bool,
    pub debounce_secs: u64,
    /// Base URL of the remote progress service. Sync stays local-only without it.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub endpoint: String,
    pub episode_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Origins trusted in addition to the player hosts from the source catalog.
    #[serde(default)]
    pub extra_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub default_source: String,
    pub default_language: Language,
    pub episodes_per_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub resume_banner_secs: u64,
    pub unmute_prompt_delay_secs: u64,
    pub unmute_prompt_secs: u64,
    pub controls_idle_secs: u64,
    pub near_end_secs: u64,
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

impl AppConfig {
    /// Load config: user file (if exists) or the built-in defaults.
    pub fn load() -> Result<Self, TsukimiError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            let user_str = std::fs::read_to_string(&user_path)?;
            Self::from_toml(&user_str)
        } else {
            Self::from_toml(DEFAULT_CONFIG)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, TsukimiError> {
        toml::from_str(content).map_err(|e| TsukimiError::Config(e.to_string()))
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), TsukimiError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TsukimiError::Config(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// Directory holding durable records such as the progress map.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn data_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn data_dir() -> PathBuf {
        PathBuf::from(".")
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("", "", "tsukimi")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}
