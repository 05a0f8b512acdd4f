//! Update-notice state and the background version-check loop.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use gasoline_update::{CURRENT_VERSION, ReleaseClient, VersionComparison, compare_versions};

/// How often the release endpoint is polled.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Minimum gap between injected update notices.
pub const NOTICE_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

struct UpdateInner {
    available_version: Option<String>,
    last_check: Option<Instant>,
    last_notice_shown: Option<Instant>,
}

/// Shared update state; the dispatcher reads, the check loop writes.
pub struct UpdateState {
    inner: Mutex<UpdateInner>,
}

impl UpdateState {
    /// Create empty state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(UpdateInner {
                available_version: None,
                last_check: None,
                last_notice_shown: None,
            }),
        }
    }

    /// Latest newer-than-running version, when known.
    pub fn available_version(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("update lock poisoned")
            .available_version
            .clone()
    }

    /// Record the outcome of a version check.
    pub fn record_check(&self, latest: Option<String>) {
        let mut inner = self.inner.lock().expect("update lock poisoned");
        inner.last_check = Some(Instant::now());
        if let Some(latest) = latest {
            if compare_versions(CURRENT_VERSION, &latest) == VersionComparison::Older {
                inner.available_version = Some(latest);
            }
        }
    }

    /// The notice to prepend to the next tool response, at most once per
    /// cooldown window. Taking the notice marks it shown.
    pub fn take_update_notice(&self) -> Option<String> {
        let mut inner = self.inner.lock().expect("update lock poisoned");
        let version = inner.available_version.clone()?;

        if let Some(shown) = inner.last_notice_shown {
            if shown.elapsed() < NOTICE_COOLDOWN {
                return None;
            }
        }
        inner.last_notice_shown = Some(Instant::now());
        Some(format!(
            "A newer Gasoline is available ({version}; running {CURRENT_VERSION}). Update when convenient.\n"
        ))
    }
}

impl Default for UpdateState {
    fn default() -> Self {
        Self::new()
    }
}

/// Background loop polling the release endpoint every `CHECK_INTERVAL`.
pub async fn version_check_loop(state: std::sync::Arc<UpdateState>) {
    let client = ReleaseClient::new();
    loop {
        match client.get_latest().await {
            Ok(info) => {
                debug!(latest = %info.version, "version check completed");
                state.record_check(Some(info.version));
            }
            Err(e) => {
                warn!(error = %e, "version check failed");
                state.record_check(None);
            }
        }
        tokio::time::sleep(CHECK_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_requires_newer_version() {
        let state = UpdateState::new();
        state.record_check(Some("0.0.1".to_string()));
        assert!(state.available_version().is_none());
        assert!(state.take_update_notice().is_none());
    }

    #[test]
    fn test_notice_cooldown() {
        let state = UpdateState::new();
        state.record_check(Some("99.0.0".to_string()));
        assert_eq!(state.available_version().as_deref(), Some("99.0.0"));

        let first = state.take_update_notice();
        assert!(first.is_some());
        assert!(first.unwrap().contains("99.0.0"));

        // Within the cooldown the notice is withheld.
        assert!(state.take_update_notice().is_none());
    }
}
