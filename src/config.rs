//! Configuration system for xbell-notify
//!
//! Loads configuration from TOML file at `~/.config/xbell-notify/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bell::icons::{IconStrategy, MAX_ICON_PIXELS};
use crate::bell::IconOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub icons: IconsConfig,
    pub notification: NotificationConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("xbell-notify");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let default_config = Self::default();
        let toml_string = toml::to_string_pretty(&default_config)
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Display configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// X display to watch (falls back to $DISPLAY)
    pub name: Option<String>,
}

/// Icon extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IconsConfig {
    /// "direct" decodes pixmap icons in-process, "file" writes them as XPM files
    pub strategy: IconStrategy,
    /// Directory for XPM files (defaults to the system temp dir)
    pub temp_dir: Option<PathBuf>,
    /// Largest `_NET_WM_ICON` accepted, in pixels
    pub max_icon_pixels: u32,
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            strategy: IconStrategy::Direct,
            temp_dir: None,
            max_icon_pixels: MAX_ICON_PIXELS,
        }
    }
}

impl IconsConfig {
    pub fn icon_options(&self) -> IconOptions {
        IconOptions {
            strategy: self.strategy,
            temp_dir: self.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
            max_icon_pixels: self.max_icon_pixels,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Application name reported to the notification server
    pub app_name: String,
    /// Notification summary; the bell name is appended when present
    pub summary: String,
    /// Expiry in milliseconds (-1 = server default, 0 = never)
    pub expire_timeout_ms: i32,
    /// Urgency hint: 0 low, 1 normal, 2 critical
    pub urgency: u8,
    /// Also notify for event-only bells (no audible beep)
    pub include_event_only: bool,
}

/// How long icon files outlive a notification whose expiry is server-chosen
const ICON_FILE_GRACE: Duration = Duration::from_secs(10);

impl NotificationConfig {
    /// How long icon files must stay on disk after `Notify` returns
    ///
    /// Servers may load `app_icon` lazily, so files live until the
    /// notification expires.
    pub fn icon_file_retention(&self) -> Duration {
        match u64::try_from(self.expire_timeout_ms) {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => ICON_FILE_GRACE,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            app_name: "xbell-notify".to_string(),
            summary: "Bell".to_string(),
            expire_timeout_ms: 5000,
            urgency: 1,
            include_event_only: true,
        }
    }
}
