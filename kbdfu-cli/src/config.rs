//! Configuration file support for kbdfu.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (KBDFU_*)
//! 3. Local config file (./kbdfu.toml)
//! 4. Global config file (~/.config/kbdfu/config.toml)

use directories::ProjectDirs;
use kbdfu::{DEFAULT_PID, DEFAULT_VID, DiscoveryConfig, UsbConfig};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "kbdfu.toml";

/// Bootloader identification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// USB Vendor ID.
    pub vid: Option<u16>,
    /// USB Product ID.
    pub pid: Option<u16>,
}

/// Discovery and transfer timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryFileConfig {
    /// Number of discovery attempts.
    pub attempts: Option<usize>,
    /// Delay between discovery attempts in milliseconds.
    pub delay_ms: Option<u64>,
    /// USB transfer timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Device identification.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryFileConfig,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    /// `--vid` / `KBDFU_VID`.
    pub vid: Option<u16>,
    /// `--pid` / `KBDFU_PID`.
    pub pid: Option<u16>,
    /// `--attempts` / `KBDFU_ATTEMPTS`.
    pub attempts: Option<usize>,
    /// `--timeout-ms`.
    pub timeout_ms: Option<u64>,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "kbdfu").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.device.vid.is_some() {
            self.device.vid = other.device.vid;
        }
        if other.device.pid.is_some() {
            self.device.pid = other.device.pid;
        }

        if other.discovery.attempts.is_some() {
            self.discovery.attempts = other.discovery.attempts;
        }
        if other.discovery.delay_ms.is_some() {
            self.discovery.delay_ms = other.discovery.delay_ms;
        }
        if other.discovery.timeout_ms.is_some() {
            self.discovery.timeout_ms = other.discovery.timeout_ms;
        }
    }

    /// USB settings after applying `overrides`.
    pub fn usb_config(&self, overrides: &Overrides) -> UsbConfig {
        let vid = overrides.vid.or(self.device.vid).unwrap_or(DEFAULT_VID);
        let pid = overrides.pid.or(self.device.pid).unwrap_or(DEFAULT_PID);
        let usb = UsbConfig::new(vid, pid);
        match overrides.timeout_ms.or(self.discovery.timeout_ms) {
            Some(ms) => usb.with_timeout(Duration::from_millis(ms)),
            None => usb,
        }
    }

    /// Discovery settings after applying `overrides`.
    pub fn discovery_config(&self, overrides: &Overrides) -> DiscoveryConfig {
        let mut discovery = DiscoveryConfig::default();
        if let Some(attempts) = overrides.attempts.or(self.discovery.attempts) {
            discovery = discovery.with_attempts(attempts);
        }
        if let Some(ms) = self.discovery.delay_ms {
            discovery = discovery.with_delay(Duration::from_millis(ms));
        }
        discovery
    }
}
