//! Daemon configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gasoline_capture::CaptureSettings;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port on loopback.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Append-only JSONL mirror of console entries.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Whether the audit trail records tool calls.
    #[serde(default = "default_true")]
    pub audit_enabled: bool,

    /// Longest a `/next-command` long poll is held open, seconds.
    #[serde(default = "default_long_poll")]
    pub long_poll_seconds: u64,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Initial capture settings (overridden by `/sync` and `configure`).
    #[serde(default)]
    pub capture: CaptureSettings,
}

fn default_port() -> u16 {
    48100
}

fn default_true() -> bool {
    true
}

fn default_long_poll() -> u64 {
    25
}

fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_file: None,
            rate_limit: RateLimitConfig::default(),
            audit_enabled: true,
            long_poll_seconds: default_long_poll(),
            shutdown_timeout: default_shutdown_timeout(),
            capture: CaptureSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Load from environment variables; capture defaults come from the
    /// `GASOLINE_*` toggles.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.capture = CaptureSettings::from_env();

        if let Ok(port) = std::env::var("GASOLINE_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(path) = std::env::var("GASOLINE_LOG_FILE") {
            config.log_file = Some(PathBuf::from(path));
        }
        config
    }

    /// Loopback listen address.
    pub fn listen_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Long-poll hold time as a Duration.
    pub fn long_poll_duration(&self) -> Duration {
        Duration::from_secs(self.long_poll_seconds.min(25))
    }
}

/// Per-client tool-call rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Calls per minute per client.
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    /// Burst size.
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_rpm() -> u32 {
    500
}

fn default_burst() -> u32 {
    50
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_rpm(),
            burst_size: default_burst(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:48100");
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.requests_per_minute, 500);
    }

    #[test]
    fn test_long_poll_capped() {
        let mut config = ServerConfig::default();
        config.long_poll_seconds = 90;
        assert_eq!(config.long_poll_duration(), Duration::from_secs(25));
    }

    #[test]
    fn test_config_serialization() {
        let config = ServerConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.port, parsed.port);
    }
}
