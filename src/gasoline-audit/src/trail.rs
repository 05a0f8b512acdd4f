//! The bounded audit trail.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::redact::{RedactionEvent, redact_text};

/// Default audit trail capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// One recorded tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Monotonic entry ID.
    pub id: u64,
    /// Record time.
    pub timestamp: DateTime<Utc>,
    /// Session the call belonged to.
    pub session_id: String,
    /// Normalised client ID.
    pub client_id: String,
    /// Tool name (e.g. `observe`).
    pub tool_name: String,
    /// Redacted parameter string.
    pub parameters: String,
    /// Response size in bytes.
    pub response_size: usize,
    /// Handler duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error message for failed calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// What a handler hands the trail after a call completes.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// Session the call belonged to.
    pub session_id: String,
    /// Normalised client ID.
    pub client_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Raw parameter string; redacted before storage.
    pub parameters: String,
    /// Response size in bytes.
    pub response_size: usize,
    /// Handler duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error message for failed calls.
    pub error_message: Option<String>,
}

/// Filters for querying the trail.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Restrict to one session.
    pub session_id: Option<String>,
    /// Restrict to one tool.
    pub tool_name: Option<String>,
    /// Entries at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Maximum results (default 100).
    pub limit: Option<usize>,
}

struct TrailInner {
    entries: VecDeque<AuditEntry>,
    redactions: VecDeque<RedactionEvent>,
}

/// Bounded FIFO of tool-call records plus the parallel redaction log.
pub struct AuditTrail {
    inner: Mutex<TrailInner>,
    capacity: usize,
    enabled: AtomicBool,
    redaction_enabled: bool,
    next_id: AtomicU64,
}

impl AuditTrail {
    /// Create a trail with the default capacity.
    pub fn new(enabled: bool) -> Self {
        Self::with_capacity(enabled, DEFAULT_CAPACITY)
    }

    /// Create a trail with a custom capacity.
    pub fn with_capacity(enabled: bool, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TrailInner {
                entries: VecDeque::new(),
                redactions: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            enabled: AtomicBool::new(enabled),
            redaction_enabled: true,
            next_id: AtomicU64::new(1),
        }
    }

    /// Disable parameter redaction (testing escape hatch).
    pub fn set_redaction_enabled(&mut self, enabled: bool) {
        self.redaction_enabled = enabled;
    }

    /// Whether recording is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn recording on or off at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Record one tool call. A disabled trail silently drops the write.
    pub fn record(&self, record: ToolCallRecord) {
        if !self.is_enabled() {
            return;
        }

        let now = Utc::now();
        let (parameters, fired) = if self.redaction_enabled {
            redact_text(&record.parameters)
        } else {
            (record.parameters.clone(), Vec::new())
        };

        let entry = AuditEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: now,
            session_id: record.session_id.clone(),
            client_id: record.client_id,
            tool_name: record.tool_name.clone(),
            parameters,
            response_size: record.response_size,
            duration_ms: record.duration_ms,
            success: record.success,
            error_message: record.error_message,
        };

        let mut inner = self.inner.lock().expect("audit lock poisoned");
        for pattern_name in fired {
            if inner.redactions.len() == self.capacity {
                inner.redactions.pop_front();
            }
            inner.redactions.push_back(RedactionEvent {
                timestamp: now,
                session_id: record.session_id.clone(),
                tool_name: record.tool_name.clone(),
                field_path: "parameters".to_string(),
                pattern_name: pattern_name.to_string(),
            });
        }
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }

    /// Record redaction events produced elsewhere (payload redaction).
    pub fn record_redactions(&self, events: Vec<RedactionEvent>) {
        if !self.is_enabled() {
            return;
        }
        let mut inner = self.inner.lock().expect("audit lock poisoned");
        for event in events {
            if inner.redactions.len() == self.capacity {
                inner.redactions.pop_front();
            }
            inner.redactions.push_back(event);
        }
    }

    /// Query the trail, newest first. Disabled trails return nothing.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let limit = query.limit.unwrap_or(100);
        let inner = self.inner.lock().expect("audit lock poisoned");
        inner
            .entries
            .iter()
            .rev()
            .filter(|e| {
                query
                    .session_id
                    .as_ref()
                    .is_none_or(|s| &e.session_id == s)
                    && query.tool_name.as_ref().is_none_or(|t| &e.tool_name == t)
                    && query.since.is_none_or(|since| e.timestamp >= since)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Snapshot of redaction events, newest first.
    pub fn redaction_events(&self, limit: usize) -> Vec<RedactionEvent> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let inner = self.inner.lock().expect("audit lock poisoned");
        inner
            .redactions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Total recorded entries currently retained.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("audit lock poisoned").entries.len()
    }

    /// Whether the trail is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(tool: &str, params: &str) -> ToolCallRecord {
        ToolCallRecord {
            session_id: "s1".into(),
            client_id: "claude-code".into(),
            tool_name: tool.into(),
            parameters: params.into(),
            response_size: 128,
            duration_ms: 3,
            success: true,
            error_message: None,
        }
    }

    #[test]
    fn test_parameters_redacted_before_storage() {
        let trail = AuditTrail::new(true);
        trail.record(record(
            "interact",
            r#"{"authorization":"Bearer eyJhbGci.e30.sig"}"#,
        ));

        let entries = trail.query(&AuditQuery::default());
        assert_eq!(entries.len(), 1);
        assert!(entries[0].parameters.contains("[REDACTED]"));
        assert!(!entries[0].parameters.contains("eyJhbGci"));

        let redactions = trail.redaction_events(10);
        assert_eq!(redactions[0].pattern_name, "bearer_token");
        assert_eq!(redactions[0].field_path, "parameters");
    }

    #[test]
    fn test_plain_parameters_preserved() {
        let trail = AuditTrail::new(true);
        trail.record(record("observe", r#"{"what":"logs","limit":50}"#));
        let entries = trail.query(&AuditQuery::default());
        assert_eq!(entries[0].parameters, r#"{"what":"logs","limit":50}"#);
        assert!(trail.redaction_events(10).is_empty());
    }

    #[test]
    fn test_query_filters_and_order() {
        let trail = AuditTrail::new(true);
        trail.record(record("observe", "{}"));
        trail.record(record("configure", "{}"));
        trail.record(record("observe", "{}"));

        let observes = trail.query(&AuditQuery {
            tool_name: Some("observe".into()),
            ..Default::default()
        });
        assert_eq!(observes.len(), 2);
        // Reverse chronological: newer IDs first.
        assert!(observes[0].id > observes[1].id);
    }

    #[test]
    fn test_disabled_trail_drops_everything() {
        let trail = AuditTrail::new(false);
        trail.record(record("observe", "{}"));
        assert!(trail.query(&AuditQuery::default()).is_empty());
        assert!(trail.redaction_events(10).is_empty());
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let trail = AuditTrail::with_capacity(true, 5);
        for i in 0..8 {
            trail.record(record("observe", &format!("{{\"n\":{i}}}")));
        }
        assert_eq!(trail.len(), 5);
        let entries = trail.query(&AuditQuery::default());
        // Oldest three evicted.
        assert!(entries.iter().all(|e| e.id >= 4));
    }

    #[test]
    fn test_concurrent_writers_exact_capacity() {
        let trail = Arc::new(AuditTrail::with_capacity(true, 5000));
        let mut handles = Vec::new();
        for w in 0..50 {
            let trail = Arc::clone(&trail);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    trail.record(ToolCallRecord {
                        session_id: format!("s{w}"),
                        client_id: "cursor".into(),
                        tool_name: "observe".into(),
                        parameters: format!("{{\"i\":{i}}}"),
                        response_size: 0,
                        duration_ms: 0,
                        success: true,
                        error_message: None,
                    });
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(trail.len(), 5000);
    }
}
