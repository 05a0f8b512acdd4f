//! Telemetry entities posted by the browser extension.
//!
//! All entities are immutable once buffered. Timestamps are the
//! extension's wall clock, parsed from RFC3339 (nanosecond precision
//! tolerated).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A captured console message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    /// Console level (log, info, warn, error, debug).
    pub level: String,
    /// Message text.
    pub message: String,
    /// Script source that emitted the message.
    #[serde(default)]
    pub source: String,
    /// Page URL at the time of the message.
    #[serde(default)]
    pub url: String,
    /// Source line.
    #[serde(default)]
    pub line: u32,
    /// Source column.
    #[serde(default)]
    pub column: u32,
    /// Stack trace for errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Capture timestamp.
    pub ts: DateTime<Utc>,
}

/// Timing and size data for one network request (waterfall view).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkWaterfallEntry {
    /// Request URL.
    pub name: String,
    /// Initiator type (script, fetch, xmlhttprequest, img, ...).
    #[serde(default)]
    pub initiator: String,
    /// Fetch start offset in ms.
    #[serde(default)]
    pub fetch_start: f64,
    /// Response end offset in ms.
    #[serde(default)]
    pub response_end: f64,
    /// Transfer size in bytes.
    #[serde(default)]
    pub transfer_size: u64,
    /// Page the request belongs to.
    #[serde(default)]
    pub page_url: String,
}

/// Captured request/response bodies for one network exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkBody {
    /// HTTP method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Response status code.
    pub status: u16,
    /// Request body, when captured.
    #[serde(default)]
    pub request_body: String,
    /// Response body, when captured.
    #[serde(default)]
    pub response_body: String,
    /// Response content type.
    #[serde(default)]
    pub content_type: String,
    /// Capture timestamp.
    pub ts: DateTime<Utc>,
}

impl NetworkBody {
    /// 401/403 responses carry credentials context and are never noise.
    pub fn is_auth_sensitive(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// A WebSocket lifecycle or message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketEvent {
    /// Socket URL.
    pub url: String,
    /// Event type: open, close, or message.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Direction for message events (sent | received).
    #[serde(default)]
    pub direction: String,
    /// Message payload, when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Capture timestamp.
    pub ts: DateTime<Utc>,
}

/// A user gesture captured for action replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedAction {
    /// Gesture type: click, input, select, scroll, keypress, navigate.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
    /// Page URL at the time of the gesture.
    #[serde(default)]
    pub url: String,
    /// Selector strategies for the target element (css, xpath, text, ...).
    #[serde(default)]
    pub selectors: HashMap<String, String>,
    /// Entered value for input/select.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Destination for navigate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_url: Option<String>,
    /// Scroll offset for scroll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_y: Option<f64>,
    /// Key for keypress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Who performed the gesture (user | ai).
    #[serde(default)]
    pub source: String,
}

/// Page timing metrics, all in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfTiming {
    /// Full load time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<f64>,
    /// First contentful paint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcp: Option<f64>,
    /// Largest contentful paint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lcp: Option<f64>,
    /// Time to first byte.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttfb: Option<f64>,
    /// DOMContentLoaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dcl: Option<f64>,
    /// DOM interactive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_interactive: Option<f64>,
}

/// Aggregate network counters for one snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfNetwork {
    /// Number of requests on the page.
    #[serde(default)]
    pub request_count: u32,
    /// Total transferred bytes.
    #[serde(default)]
    pub transfer_size: u64,
}

/// One performance snapshot for a page load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    /// Page URL.
    pub url: String,
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
    /// Timing metrics.
    #[serde(default)]
    pub timing: PerfTiming,
    /// Network counters.
    #[serde(default)]
    pub network: PerfNetwork,
    /// Count of long tasks observed.
    #[serde(default)]
    pub long_tasks: u32,
    /// Cumulative layout shift.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cls: Option<f64>,
}

/// A debug log entry from the extension itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionLog {
    /// Log level.
    pub level: String,
    /// Message text.
    pub message: String,
    /// Emitting component.
    #[serde(default)]
    pub source: String,
    /// Category tag.
    #[serde(default)]
    pub category: String,
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
}

/// The single browser tab whose telemetry is being captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedTab {
    /// Browser tab ID.
    pub id: i64,
    /// Current page URL.
    pub url: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Per-URL exponential-moving performance baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfBaseline {
    /// Page URL the baseline is for.
    pub url: String,
    /// Snapshots folded into the baseline.
    pub sample_count: u32,
    /// Mean timing metrics.
    pub timing: PerfTiming,
    /// Mean network counters.
    pub network: PerfNetwork,
    /// Last fold time.
    pub updated_at: DateTime<Utc>,
}

/// Exponential-moving-average weight for baseline folds.
const BASELINE_ALPHA: f64 = 0.3;

impl PerfBaseline {
    /// Start a baseline from the first observed snapshot.
    pub fn from_snapshot(snapshot: &PerformanceSnapshot) -> Self {
        Self {
            url: snapshot.url.clone(),
            sample_count: 1,
            timing: snapshot.timing.clone(),
            network: snapshot.network.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Fold one more snapshot into the moving averages.
    pub fn fold(&mut self, snapshot: &PerformanceSnapshot) {
        fn ema(current: Option<f64>, sample: Option<f64>) -> Option<f64> {
            match (current, sample) {
                (Some(c), Some(s)) => Some(c * (1.0 - BASELINE_ALPHA) + s * BASELINE_ALPHA),
                (None, s) => s,
                (c, None) => c,
            }
        }

        self.timing.load = ema(self.timing.load, snapshot.timing.load);
        self.timing.fcp = ema(self.timing.fcp, snapshot.timing.fcp);
        self.timing.lcp = ema(self.timing.lcp, snapshot.timing.lcp);
        self.timing.ttfb = ema(self.timing.ttfb, snapshot.timing.ttfb);
        self.timing.dcl = ema(self.timing.dcl, snapshot.timing.dcl);
        self.timing.dom_interactive =
            ema(self.timing.dom_interactive, snapshot.timing.dom_interactive);

        let count_ema = ema(
            Some(f64::from(self.network.request_count)),
            Some(f64::from(snapshot.network.request_count)),
        );
        let size_ema = ema(
            Some(self.network.transfer_size as f64),
            Some(snapshot.network.transfer_size as f64),
        );
        self.network.request_count = count_ema.unwrap_or(0.0).round() as u32;
        self.network.transfer_size = size_ema.unwrap_or(0.0).round() as u64;

        self.sample_count = self.sample_count.saturating_add(1);
        self.updated_at = Utc::now();
    }
}

/// A CI test boundary: active while `ended_at` is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBoundary {
    /// Boundary start.
    pub started_at: DateTime<Utc>,
    /// Boundary end, when the test finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_sensitive_statuses() {
        let mut body = NetworkBody {
            method: "GET".into(),
            url: "https://api.example.com/me".into(),
            status: 401,
            request_body: String::new(),
            response_body: String::new(),
            content_type: String::new(),
            ts: Utc::now(),
        };
        assert!(body.is_auth_sensitive());
        body.status = 403;
        assert!(body.is_auth_sensitive());
        body.status = 404;
        assert!(!body.is_auth_sensitive());
    }

    #[test]
    fn test_console_entry_roundtrip() {
        let json = r#"{"level":"error","message":"boom","ts":"2026-01-05T10:00:00.123456789Z"}"#;
        let entry: ConsoleEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.level, "error");
        assert_eq!(entry.source, "");
    }

    #[test]
    fn test_baseline_fold_moves_toward_sample() {
        let snap = |load: f64| PerformanceSnapshot {
            url: "https://app.test/".into(),
            timestamp: Utc::now(),
            timing: PerfTiming {
                load: Some(load),
                ..Default::default()
            },
            network: PerfNetwork::default(),
            long_tasks: 0,
            cls: None,
        };

        let mut baseline = PerfBaseline::from_snapshot(&snap(1000.0));
        baseline.fold(&snap(2000.0));
        let load = baseline.timing.load.unwrap();
        assert!(load > 1000.0 && load < 2000.0);
        assert_eq!(baseline.sample_count, 2);
    }
}
