//! Settings parser for .taskboard/config.toml

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use taskboard_core::prelude::*;
use taskboard_stream::ReaderConfig;

const CONFIG_FILENAME: &str = "config.toml";
const TASKBOARD_DIR: &str = ".taskboard";

/// Settings loaded from the project's config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Delay between scheduling a refresh and draining the update queue
    pub coalesce_delay_ms: u64,
    /// Cool-down between reconnect attempts
    pub reconnect_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            connection: ConnectionSettings::default(),
            timing: TimingSettings::default(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let defaults = ReaderConfig::default();
        ConnectionSettings {
            host: defaults.host,
            port: defaults.port,
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        let defaults = ReaderConfig::default();
        TimingSettings {
            coalesce_delay_ms: defaults.coalesce_delay.as_millis() as u64,
            reconnect_delay_secs: defaults.reconnect_delay.as_secs(),
        }
    }
}

impl Settings {
    /// Convert into the stream reader's config, applying CLI overrides last.
    pub fn reader_config(&self, host: Option<String>, port: Option<u16>) -> ReaderConfig {
        ReaderConfig {
            host: host.unwrap_or_else(|| self.connection.host.clone()),
            port: port.unwrap_or(self.connection.port),
            coalesce_delay: Duration::from_millis(self.timing.coalesce_delay_ms),
            reconnect_delay: Duration::from_secs(self.timing.reconnect_delay_secs),
        }
    }
}

/// Load settings from .taskboard/config.toml
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = project_path.join(TASKBOARD_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}
