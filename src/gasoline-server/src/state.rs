//! Application state shared across request handlers.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use gasoline_audit::{AuditTrail, SessionRegistry};
use gasoline_capture::CaptureStore;
use gasoline_noise::NoiseFilter;
use gasoline_pending::PendingRegistry;
use gasoline_verify::VerifyManager;

use crate::config::ServerConfig;
use crate::elements::ElementIndexStore;
use crate::error::AppResult;
use crate::logmirror::LogMirror;
use crate::metrics::Metrics;
use crate::ratelimit::RateLimiter;
use crate::recordings::RecordingStore;
use crate::updates::UpdateState;

/// Everything the daemon owns, shared across HTTP and MCP handlers.
pub struct AppState {
    /// Daemon configuration.
    pub config: ServerConfig,
    /// Telemetry buffers and tracked-tab state.
    pub capture: CaptureStore,
    /// Noise classifier.
    pub noise: NoiseFilter,
    /// Tool-call audit trail.
    pub audit: AuditTrail,
    /// MCP session registry.
    pub sessions: SessionRegistry,
    /// Verification sessions.
    pub verify: VerifyManager,
    /// Pending extension commands.
    pub pending: PendingRegistry,
    /// Per-client element-index maps.
    pub elements: ElementIndexStore,
    /// Per-client tool-call rate limiter.
    pub rate_limiter: RateLimiter,
    /// Per-tool counters.
    pub metrics: Metrics,
    /// Update-notice state.
    pub updates: Arc<UpdateState>,
    /// Recording/screenshot persistence.
    pub recordings: Option<RecordingStore>,
    /// JSONL console mirror, when `--log-file` is set.
    pub log_mirror: Option<LogMirror>,
}

impl AppState {
    /// Build the full state from configuration.
    pub fn new(config: ServerConfig) -> AppResult<Self> {
        let log_mirror = match &config.log_file {
            Some(path) => Some(
                LogMirror::open(path)
                    .map_err(|e| crate::error::AppError::Internal(format!("log file: {e}")))?,
            ),
            None => None,
        };

        // The recordings dir is best-effort: a read-only home must not
        // stop the daemon from serving telemetry.
        let recordings = RecordingStore::new().ok();

        Ok(Self {
            capture: CaptureStore::new(config.capture.clone()),
            noise: NoiseFilter::new(),
            audit: AuditTrail::new(config.audit_enabled),
            sessions: SessionRegistry::new(),
            verify: VerifyManager::new(),
            pending: PendingRegistry::new(),
            elements: ElementIndexStore::new(),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            metrics: Metrics::new(),
            updates: Arc::new(UpdateState::new()),
            recordings,
            log_mirror,
            config,
        })
    }

    /// Start the periodic cleanup task. Call after wrapping in Arc.
    pub fn start_cleanup_task(self: &Arc<Self>) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let evicted = state.pending.sweep().await;
                let buckets = state.rate_limiter.cleanup();
                if evicted > 0 || buckets > 0 {
                    debug!(evicted, buckets, "background cleanup completed");
                }
            }
        });
    }

    /// Tear down everything scoped to a disconnecting client.
    pub fn drop_client_state(&self, client_id: &str) {
        self.elements.remove_client(client_id);
        self.rate_limiter.remove_client(client_id);
        let removed = self.verify.remove_client(client_id);
        if removed > 0 {
            debug!(client_id, removed, "verification sessions dropped with client");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_construction() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        assert!(state.audit.is_enabled());
        assert!(state.capture.get_console_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_client_state_teardown() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        state
            .elements
            .replace_for_client("c1", [(1u32, "#x".to_string())].into_iter().collect());
        state.drop_client_state("c1");
        assert!(state.elements.resolve("c1", 1).is_none());
    }
}
