//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `monitor.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     environment overrides.
//!
//! structure:
//!     - DeviceConfig: where the esp32 lives and how long to wait for it.
//!     - ServerConfig: where the dashboard listens.
//!     - LoggingConfig: log level and whether to log every reading.
//!
//! the poll interval is deliberately absent; see poller::POLL_INTERVAL.
//!
//! ==============================================================================

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_DEVICE_IP: &str = "MONITOR_DEVICE_IP";
pub const ENV_BIND: &str = "MONITOR_BIND";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    pub ip: String,
    pub path: String,
    /// 0 = no timeout
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.0.100".to_string(),
            path: "/data".to_string(),
            request_timeout_ms: 0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: true,
        }
    }
}

impl DeviceConfig {
    /// full url of the data endpoint, e.g. http://192.168.0.100/data
    pub fn endpoint(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("http://{}/{}", self.ip.trim_end_matches('/'), path)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Load with default fallback, then apply environment overrides
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("monitor.toml"),
            std::path::PathBuf::from("..").join("config").join("monitor.toml"),
        ];

        let mut config = None;
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(loaded) => {
                        tracing::info!("config loaded from {}", path.display());
                        config = Some(loaded);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        let mut config = config.unwrap_or_else(|| {
            tracing::warn!("no config file found - using defaults");
            Self::default()
        });
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// override file values from the environment (or any lookup, for tests)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ip) = lookup(ENV_DEVICE_IP).filter(|v| !v.trim().is_empty()) {
            self.device.ip = ip.trim().to_string();
        }
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind.trim().to_string();
        }
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            endpoint = %self.device.endpoint(),
            timeout_ms = self.device.request_timeout_ms,
            bind = %self.server.bind,
            log_level = %self.logging.level,
            "configuration"
        );
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.device.endpoint(), "http://192.168.0.100/data");
        assert_eq!(config.device.request_timeout(), None);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert!(config.logging.show_sensor_data);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = MonitorConfig::parse(
            r#"
            [device]
            ip = "10.0.0.7"
            request_timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.device.endpoint(), "http://10.0.0.7/data");
        assert_eq!(config.device.request_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bad_toml_is_error() {
        assert!(MonitorConfig::parse("[device\nip = 1").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MonitorConfig::default();
        config.apply_overrides(|key| match key {
            ENV_DEVICE_IP => Some(" 192.168.4.1 ".to_string()),
            ENV_BIND => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.device.ip, "192.168.4.1");
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_endpoint_normalizes_slashes() {
        let device = DeviceConfig {
            ip: "esp32.local/".to_string(),
            path: "data".to_string(),
            request_timeout_ms: 0,
        };
        assert_eq!(device.endpoint(), "http://esp32.local/data");
    }
}
