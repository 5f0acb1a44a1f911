//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Environment override for the catalog API base URL
pub const API_URL_ENV: &str = "THEBOX_API_URL";

const DEFAULT_API_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_watchdog")]
    pub watchdog_secs: u64,
    #[serde(default = "default_volume")]
    pub initial_volume: f32,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(default = "default_true")]
    pub hw_accel: bool,
    // Saved state
    #[serde(default)]
    pub last_channel_id: String,
}

fn default_api_url() -> String { DEFAULT_API_URL.to_string() }
fn default_request_timeout() -> u64 { 10 }
fn default_watchdog() -> u64 { 10 }
fn default_volume() -> f32 { 0.8 }
fn default_true() -> bool { true }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            request_timeout_secs: 10,
            watchdog_secs: 10,
            initial_volume: 0.8,
            user_agent: String::new(),
            dark_mode: true,
            hw_accel: true,
            last_channel_id: String::new(),
        }
    }
}

impl AppConfig {
    fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("thebox_player");
        path.push("config.json");
        path
    }

    /// Load the saved config, falling back to defaults if it is missing or unreadable
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path)
            .map_err(ConfigError::from)
            .and_then(|content| Self::from_json(&content))
        {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Base URL with the environment override applied
    pub fn api_base_url(&self) -> String {
        match std::env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => self.api_base_url.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs.max(1))
    }

    pub fn volume(&self) -> f32 {
        if self.initial_volume.is_nan() {
            default_volume()
        } else {
            self.initial_volume.clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
