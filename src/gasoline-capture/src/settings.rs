//! Capture settings.
//!
//! Defaults come from `GASOLINE_*` environment variables; the extension's
//! `/sync` posts and the `configure` tool update them at runtime. The
//! dispatcher uses them to explain empty results.

use serde::{Deserialize, Serialize};

/// Which console levels are captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevelFilter {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Everything.
    #[default]
    All,
}

impl LogLevelFilter {
    /// Parse the env/wire value; unknown values fall back to the default.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            _ => Self::All,
        }
    }

    /// Whether a console entry at `level` passes the filter.
    pub fn allows(&self, level: &str) -> bool {
        match self {
            Self::All => true,
            Self::Warn => matches!(level, "warn" | "warning" | "error"),
            Self::Error => level == "error",
        }
    }
}

/// WebSocket capture depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsMode {
    /// No WebSocket capture.
    Off,
    /// Open/close events only.
    #[default]
    Lifecycle,
    /// Full message capture.
    Messages,
}

impl WsMode {
    /// Parse the env/wire value; unknown values fall back to the default.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "messages" => Self::Messages,
            _ => Self::Lifecycle,
        }
    }
}

/// Runtime capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    /// Console level filter.
    pub log_level: LogLevelFilter,
    /// WebSocket capture depth.
    pub ws_mode: WsMode,
    /// Whether request/response bodies are captured.
    pub network_bodies: bool,
    /// Whether user actions are recorded for replay.
    pub action_replay: bool,
    /// Whether a screenshot is taken automatically on page errors.
    pub screenshot_on_error: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            log_level: LogLevelFilter::All,
            ws_mode: WsMode::Lifecycle,
            network_bodies: true,
            action_replay: true,
            screenshot_on_error: false,
        }
    }
}

impl CaptureSettings {
    /// Build settings from `GASOLINE_*` environment variables.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(level) = std::env::var("GASOLINE_LOG_LEVEL") {
            settings.log_level = LogLevelFilter::parse(&level);
        }
        if let Ok(mode) = std::env::var("GASOLINE_WS_MODE") {
            settings.ws_mode = WsMode::parse(&mode);
        }
        if let Ok(bodies) = std::env::var("GASOLINE_NETWORK_BODIES") {
            settings.network_bodies = bodies.trim().eq_ignore_ascii_case("true");
        }
        if let Ok(replay) = std::env::var("GASOLINE_ACTION_REPLAY") {
            settings.action_replay = replay.trim().eq_ignore_ascii_case("true");
        }
        settings
    }

    /// The configure call that would surface data of the given kind, when
    /// a capture setting explains its absence. Returns `None` when the
    /// current settings cannot be the reason.
    pub fn hint_for_empty(&self, kind: &str) -> Option<String> {
        match kind {
            "websocket" if self.ws_mode == WsMode::Off => Some(
                "configure(action=capture_settings, ws_mode=lifecycle) enables WebSocket capture"
                    .to_string(),
            ),
            "websocket" if self.ws_mode == WsMode::Lifecycle => Some(
                "configure(action=capture_settings, ws_mode=messages) captures message payloads"
                    .to_string(),
            ),
            "network" if !self.network_bodies => Some(
                "configure(action=capture_settings, network_bodies=true) enables body capture"
                    .to_string(),
            ),
            "actions" if !self.action_replay => Some(
                "configure(action=capture_settings, action_replay=true) enables action recording"
                    .to_string(),
            ),
            "logs" if self.log_level != LogLevelFilter::All => Some(
                "configure(action=capture_settings, log_level=all) captures every console level"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_filter() {
        assert!(LogLevelFilter::All.allows("debug"));
        assert!(LogLevelFilter::Warn.allows("error"));
        assert!(!LogLevelFilter::Warn.allows("info"));
        assert!(!LogLevelFilter::Error.allows("warn"));
    }

    #[test]
    fn test_parse_fallbacks() {
        assert_eq!(LogLevelFilter::parse("ERROR"), LogLevelFilter::Error);
        assert_eq!(LogLevelFilter::parse("bogus"), LogLevelFilter::All);
        assert_eq!(WsMode::parse("messages"), WsMode::Messages);
        assert_eq!(WsMode::parse("bogus"), WsMode::Lifecycle);
    }

    #[test]
    fn test_empty_result_hints() {
        let mut settings = CaptureSettings::default();
        settings.ws_mode = WsMode::Off;
        assert!(settings.hint_for_empty("websocket").is_some());
        assert!(settings.hint_for_empty("logs").is_none());

        settings.network_bodies = false;
        let hint = settings.hint_for_empty("network").unwrap();
        assert!(hint.contains("network_bodies=true"));
    }
}
