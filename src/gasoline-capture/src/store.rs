//! The capture store: one ring buffer per telemetry kind plus tracked-tab
//! state, perf baselines, and CI test boundaries.
//!
//! All mutations go through a single RW lock; readers take snapshot
//! copies and never block writers for longer than the copy. No lock is
//! held across I/O.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::buffer::{BoundedBuffer, ReadPage};
use crate::entities::{
    ConsoleEntry, EnhancedAction, ExtensionLog, NetworkBody, NetworkWaterfallEntry, PerfBaseline,
    PerformanceSnapshot, TestBoundary, TrackedTab, WebSocketEvent,
};
use crate::settings::CaptureSettings;
use crate::summary::{self, SessionSummary};

/// Default ring capacities per telemetry kind.
pub const CONSOLE_CAPACITY: usize = 1000;
/// Network body ring capacity.
pub const NETWORK_BODY_CAPACITY: usize = 500;
/// Waterfall ring capacity.
pub const WATERFALL_CAPACITY: usize = 1000;
/// WebSocket event ring capacity.
pub const WEBSOCKET_CAPACITY: usize = 1000;
/// User action ring capacity.
pub const ACTION_CAPACITY: usize = 500;
/// Extension debug log ring capacity.
pub const EXTENSION_LOG_CAPACITY: usize = 200;
/// Performance snapshot ring capacity.
pub const PERF_CAPACITY: usize = 100;

/// How recently `/sync` must have fired for the extension to count as
/// connected.
const CONNECTIVITY_WINDOW_SECS: i64 = 15;

/// Utilisation stats for one buffer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStats {
    /// Buffer kind name.
    pub kind: String,
    /// Current entry count.
    pub entries: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Fill percentage.
    pub utilization_pct: f64,
}

/// Aggregated view served to CI via `GET /snapshot`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Console entries (optionally since-filtered).
    pub console: Vec<ConsoleEntry>,
    /// Network bodies.
    pub network_bodies: Vec<NetworkBody>,
    /// Waterfall entries.
    pub network_waterfall: Vec<NetworkWaterfallEntry>,
    /// WebSocket events.
    pub websocket_events: Vec<WebSocketEvent>,
    /// User actions.
    pub actions: Vec<EnhancedAction>,
    /// Performance snapshots.
    pub performance: Vec<PerformanceSnapshot>,
    /// Per-buffer utilisation.
    pub stats: Vec<BufferStats>,
    /// Tracked tab, when the extension has synced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_tab: Option<TrackedTab>,
    /// Echoed test label, when the caller supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
}

struct StoreInner {
    console: BoundedBuffer<ConsoleEntry>,
    network_bodies: BoundedBuffer<NetworkBody>,
    waterfall: BoundedBuffer<NetworkWaterfallEntry>,
    websocket: BoundedBuffer<WebSocketEvent>,
    actions: BoundedBuffer<EnhancedAction>,
    extension_logs: BoundedBuffer<ExtensionLog>,
    performance: BoundedBuffer<PerformanceSnapshot>,
    tracked_tab: Option<TrackedTab>,
    last_sync: Option<DateTime<Utc>>,
    settings: CaptureSettings,
    baselines: HashMap<String, PerfBaseline>,
    test_boundaries: HashMap<String, TestBoundary>,
    // First snapshot per URL for the current client session, plus the
    // order URLs were first seen in. The order list is the canonical
    // snapshot counter.
    first_snapshots: HashMap<String, PerformanceSnapshot>,
    snapshot_order: Vec<String>,
}

impl StoreInner {
    fn new(settings: CaptureSettings) -> Self {
        Self {
            console: BoundedBuffer::new(CONSOLE_CAPACITY),
            network_bodies: BoundedBuffer::new(NETWORK_BODY_CAPACITY),
            waterfall: BoundedBuffer::new(WATERFALL_CAPACITY),
            websocket: BoundedBuffer::new(WEBSOCKET_CAPACITY),
            actions: BoundedBuffer::new(ACTION_CAPACITY),
            extension_logs: BoundedBuffer::new(EXTENSION_LOG_CAPACITY),
            performance: BoundedBuffer::new(PERF_CAPACITY),
            tracked_tab: None,
            last_sync: None,
            settings,
            baselines: HashMap::new(),
            test_boundaries: HashMap::new(),
            first_snapshots: HashMap::new(),
            snapshot_order: Vec::new(),
        }
    }

    fn buffer_stats(&self) -> Vec<BufferStats> {
        fn stat<T: Clone>(kind: &str, buf: &BoundedBuffer<T>) -> BufferStats {
            BufferStats {
                kind: kind.to_string(),
                entries: buf.len(),
                capacity: buf.capacity(),
                utilization_pct: (buf.len() as f64 / buf.capacity() as f64) * 100.0,
            }
        }
        vec![
            stat("console", &self.console),
            stat("network_bodies", &self.network_bodies),
            stat("network_waterfall", &self.waterfall),
            stat("websocket", &self.websocket),
            stat("actions", &self.actions),
            stat("extension_logs", &self.extension_logs),
            stat("performance", &self.performance),
        ]
    }
}

/// Thread-safe capture store shared across request handlers.
pub struct CaptureStore {
    inner: RwLock<StoreInner>,
}

impl CaptureStore {
    /// Create a store with the given initial settings.
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            inner: RwLock::new(StoreInner::new(settings)),
        }
    }

    // ========================================================================
    // Write side (extension ingestion)
    // ========================================================================

    /// Append console entries, honouring the level filter.
    pub async fn add_console_entries(&self, entries: Vec<ConsoleEntry>) -> usize {
        let mut inner = self.inner.write().await;
        let filter = inner.settings.log_level;
        let kept: Vec<_> = entries
            .into_iter()
            .filter(|e| filter.allows(&e.level))
            .collect();
        let count = kept.len();
        inner.console.append(kept);
        count
    }

    /// Append network bodies.
    pub async fn add_network_bodies(&self, bodies: Vec<NetworkBody>) {
        self.inner.write().await.network_bodies.append(bodies);
    }

    /// Append waterfall entries.
    pub async fn add_network_waterfall_entries(&self, entries: Vec<NetworkWaterfallEntry>) {
        self.inner.write().await.waterfall.append(entries);
    }

    /// Append WebSocket events.
    pub async fn add_websocket_events(&self, events: Vec<WebSocketEvent>) {
        self.inner.write().await.websocket.append(events);
    }

    /// Append user actions.
    pub async fn add_enhanced_actions(&self, actions: Vec<EnhancedAction>) {
        self.inner.write().await.actions.append(actions);
    }

    /// Append extension debug logs.
    pub async fn add_extension_logs(&self, logs: Vec<ExtensionLog>) {
        self.inner.write().await.extension_logs.append(logs);
    }

    /// Record a performance snapshot: buffers it, pins the per-session
    /// first snapshot for its URL, and folds the per-URL baseline.
    pub async fn track_performance_snapshot(&self, snapshot: PerformanceSnapshot) {
        let mut inner = self.inner.write().await;
        let url = snapshot.url.clone();

        if !inner.first_snapshots.contains_key(&url) {
            inner.first_snapshots.insert(url.clone(), snapshot.clone());
            inner.snapshot_order.push(url.clone());
        }

        match inner.baselines.get_mut(&url) {
            Some(baseline) => baseline.fold(&snapshot),
            None => {
                inner
                    .baselines
                    .insert(url.clone(), PerfBaseline::from_snapshot(&snapshot));
            }
        }

        inner.performance.push(snapshot);
    }

    /// Update tracked-tab state and heartbeat the connectivity window.
    pub async fn record_sync(&self, tab: Option<TrackedTab>, settings: Option<CaptureSettings>) {
        let mut inner = self.inner.write().await;
        if let Some(tab) = tab {
            inner.tracked_tab = Some(tab);
        }
        if let Some(settings) = settings {
            inner.settings = settings;
        }
        inner.last_sync = Some(Utc::now());
    }

    /// Start a CI test boundary.
    pub async fn set_test_boundary_start(&self, test_id: &str) {
        let mut inner = self.inner.write().await;
        inner.test_boundaries.insert(
            test_id.to_string(),
            TestBoundary {
                started_at: Utc::now(),
                ended_at: None,
            },
        );
        debug!(test_id, "test boundary started");
    }

    /// End a CI test boundary. Unknown IDs are ignored.
    pub async fn set_test_boundary_end(&self, test_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(boundary) = inner.test_boundaries.get_mut(test_id) {
            boundary.ended_at = Some(Utc::now());
        }
    }

    /// Atomically clear every buffer; returns the prior entry count.
    /// Baselines and boundaries survive; first-snapshot state does not.
    pub async fn clear_all(&self) -> usize {
        let mut inner = self.inner.write().await;
        let total = inner.console.clear()
            + inner.network_bodies.clear()
            + inner.waterfall.clear()
            + inner.websocket.clear()
            + inner.actions.clear()
            + inner.extension_logs.clear()
            + inner.performance.clear();
        inner.first_snapshots.clear();
        inner.snapshot_order.clear();
        total
    }

    /// Reset the first-snapshot map for a fresh client session.
    pub async fn reset_session_snapshots(&self) {
        let mut inner = self.inner.write().await;
        inner.first_snapshots.clear();
        inner.snapshot_order.clear();
    }

    /// Replace capture settings.
    pub async fn update_settings(&self, settings: CaptureSettings) {
        self.inner.write().await.settings = settings;
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Snapshot of console entries.
    pub async fn get_console_entries(&self) -> Vec<ConsoleEntry> {
        self.inner.read().await.console.snapshot()
    }

    /// Cursor-based console read.
    pub async fn read_console_since(&self, cursor: &str, limit: usize) -> ReadPage<ConsoleEntry> {
        self.inner.read().await.console.read_since(cursor, limit)
    }

    /// Snapshot of network bodies.
    pub async fn get_network_bodies(&self) -> Vec<NetworkBody> {
        self.inner.read().await.network_bodies.snapshot()
    }

    /// Cursor-based network body read.
    pub async fn read_network_bodies_since(
        &self,
        cursor: &str,
        limit: usize,
    ) -> ReadPage<NetworkBody> {
        self.inner
            .read()
            .await
            .network_bodies
            .read_since(cursor, limit)
    }

    /// Snapshot of waterfall entries.
    pub async fn get_network_waterfall(&self) -> Vec<NetworkWaterfallEntry> {
        self.inner.read().await.waterfall.snapshot()
    }

    /// Snapshot of WebSocket events.
    pub async fn get_websocket_events(&self) -> Vec<WebSocketEvent> {
        self.inner.read().await.websocket.snapshot()
    }

    /// Cursor-based WebSocket read.
    pub async fn read_websocket_since(&self, cursor: &str, limit: usize) -> ReadPage<WebSocketEvent> {
        self.inner.read().await.websocket.read_since(cursor, limit)
    }

    /// Snapshot of user actions.
    pub async fn get_enhanced_actions(&self) -> Vec<EnhancedAction> {
        self.inner.read().await.actions.snapshot()
    }

    /// Snapshot of extension debug logs.
    pub async fn get_extension_logs(&self) -> Vec<ExtensionLog> {
        self.inner.read().await.extension_logs.snapshot()
    }

    /// Snapshot of performance snapshots.
    pub async fn get_performance_snapshots(&self) -> Vec<PerformanceSnapshot> {
        self.inner.read().await.performance.snapshot()
    }

    /// Current tracked tab.
    pub async fn tracked_tab(&self) -> Option<TrackedTab> {
        self.inner.read().await.tracked_tab.clone()
    }

    /// Current capture settings.
    pub async fn settings(&self) -> CaptureSettings {
        self.inner.read().await.settings.clone()
    }

    /// Whether `/sync` fired within the connectivity window.
    pub async fn is_extension_connected(&self) -> bool {
        let inner = self.inner.read().await;
        match inner.last_sync {
            Some(t) => Utc::now() - t < Duration::seconds(CONNECTIVITY_WINDOW_SECS),
            None => false,
        }
    }

    /// Seconds since the last extension sync, when one happened.
    pub async fn data_age_seconds(&self) -> Option<i64> {
        let inner = self.inner.read().await;
        inner.last_sync.map(|t| (Utc::now() - t).num_seconds())
    }

    /// Per-URL baseline, when one exists.
    pub async fn baseline_for(&self, url: &str) -> Option<PerfBaseline> {
        self.inner.read().await.baselines.get(url).cloned()
    }

    /// Test boundary IDs that have started but not ended.
    pub async fn active_test_boundaries(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut ids: Vec<_> = inner
            .test_boundaries
            .iter()
            .filter(|(_, b)| b.ended_at.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Per-buffer utilisation stats.
    pub async fn buffer_stats(&self) -> Vec<BufferStats> {
        self.inner.read().await.buffer_stats()
    }

    /// Aggregated CI snapshot, optionally filtered to entries newer than
    /// `since`. `test_id` is echoed back as a label.
    pub async fn snapshot_aggregate(
        &self,
        since: Option<DateTime<Utc>>,
        test_id: Option<String>,
    ) -> StoreSnapshot {
        let inner = self.inner.read().await;

        fn since_filter<T: Clone>(
            items: Vec<T>,
            since: Option<DateTime<Utc>>,
            ts: impl Fn(&T) -> DateTime<Utc>,
        ) -> Vec<T> {
            match since {
                Some(s) => items.into_iter().filter(|i| ts(i) >= s).collect(),
                None => items,
            }
        }

        StoreSnapshot {
            console: since_filter(inner.console.snapshot(), since, |e| e.ts),
            network_bodies: since_filter(inner.network_bodies.snapshot(), since, |e| e.ts),
            network_waterfall: inner.waterfall.snapshot(),
            websocket_events: since_filter(inner.websocket.snapshot(), since, |e| e.ts),
            actions: since_filter(inner.actions.snapshot(), since, |e| e.timestamp),
            performance: since_filter(inner.performance.snapshot(), since, |e| e.timestamp),
            stats: inner.buffer_stats(),
            tracked_tab: inner.tracked_tab.clone(),
            test_id,
        }
    }

    /// Compute the session performance summary (§ see summary module).
    pub async fn generate_session_summary(&self) -> SessionSummary {
        let inner = self.inner.read().await;

        // Latest snapshot per URL.
        let mut latest: HashMap<String, PerformanceSnapshot> = HashMap::new();
        for snap in inner.performance.snapshot() {
            latest.insert(snap.url.clone(), snap);
        }

        summary::session_summary(
            &inner.snapshot_order,
            &inner.first_snapshots,
            &latest,
            &inner.baselines,
            inner.performance.len(),
            &inner.actions.snapshot(),
        )
    }
}

impl Default for CaptureStore {
    fn default() -> Self {
        Self::new(CaptureSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PerfNetwork, PerfTiming};
    use crate::settings::LogLevelFilter;

    fn console(level: &str, message: &str) -> ConsoleEntry {
        ConsoleEntry {
            level: level.into(),
            message: message.into(),
            source: "app.js".into(),
            url: "https://app.test/".into(),
            line: 1,
            column: 1,
            stack: None,
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_console_level_filter_applied_on_write() {
        let mut settings = CaptureSettings::default();
        settings.log_level = LogLevelFilter::Error;
        let store = CaptureStore::new(settings);

        let kept = store
            .add_console_entries(vec![console("info", "a"), console("error", "b")])
            .await;
        assert_eq!(kept, 1);
        assert_eq!(store.get_console_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_returns_prior_count() {
        let store = CaptureStore::default();
        store
            .add_console_entries(vec![console("error", "x"), console("warn", "y")])
            .await;
        store
            .add_websocket_events(vec![WebSocketEvent {
                url: "wss://app.test/ws".into(),
                event_type: "open".into(),
                direction: String::new(),
                data: None,
                ts: Utc::now(),
            }])
            .await;

        assert_eq!(store.clear_all().await, 3);
        assert_eq!(store.clear_all().await, 0);
    }

    #[tokio::test]
    async fn test_connectivity_window() {
        let store = CaptureStore::default();
        assert!(!store.is_extension_connected().await);
        store.record_sync(None, None).await;
        assert!(store.is_extension_connected().await);
    }

    #[tokio::test]
    async fn test_first_snapshot_pinned_per_url() {
        let store = CaptureStore::default();
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
        store.track_performance_snapshot(snap(1000.0)).await;
        store.track_performance_snapshot(snap(1400.0)).await;

        let summary = store.generate_session_summary().await;
        let delta = summary
            .deltas
            .iter()
            .find(|d| d.url == "https://app.test/")
            .unwrap();
        let load = delta
            .metrics
            .iter()
            .find(|m| m.metric == "load")
            .unwrap();
        assert_eq!(load.delta, 400.0);
    }

    #[tokio::test]
    async fn test_test_boundaries() {
        let store = CaptureStore::default();
        store.set_test_boundary_start("login-flow").await;
        store.set_test_boundary_start("checkout").await;
        store.set_test_boundary_end("login-flow").await;

        assert_eq!(store.active_test_boundaries().await, vec!["checkout"]);
    }

    #[tokio::test]
    async fn test_buffer_stats_shape() {
        let store = CaptureStore::default();
        let stats = store.buffer_stats().await;
        assert_eq!(stats.len(), 7);
        assert!(stats.iter().any(|s| s.kind == "console"));
        assert!(stats.iter().all(|s| s.utilization_pct == 0.0));
    }
}
