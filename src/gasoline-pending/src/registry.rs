//! The correlation-id keyed command table.
//!
//! Wake-ups use a central `Notify` plus predicate re-checks: long-poll
//! consumers wait on `queue_notify`, result waiters on `result_notify`.
//! Never busy-waits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for `record_stop` (encoding can be slow).
pub const RECORD_STOP_TIMEOUT: Duration = Duration::from_secs(90);

/// Timeout for `record_start` (waits on a user gesture).
pub const RECORD_START_TIMEOUT: Duration = Duration::from_secs(120);

/// How long terminal entries stay queryable before eviction.
pub const TERMINAL_GRACE: Duration = Duration::from_secs(120);

/// Registry capacity; the oldest entry is evicted past this.
const MAX_ENTRIES: usize = 500;

/// Errors from the registry.
#[derive(Debug, Error)]
pub enum PendingError {
    /// No command with the given correlation ID.
    #[error("command '{0}' not found")]
    NotFound(String),

    /// The command already reached a terminal state.
    #[error("command '{0}' already completed with state '{1}'")]
    AlreadyTerminal(String, String),
}

/// Lifecycle states. `Pending` is entered exactly once; exactly one
/// terminal state is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Waiting for the extension.
    Pending,
    /// Result posted successfully.
    Complete,
    /// Extension reported a failure.
    Error,
    /// Deadline elapsed before a result arrived.
    Timeout,
    /// Cancelled by `clear`.
    Cancelled,
    /// Evicted from the table while pending.
    Expired,
}

impl CommandState {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A command awaiting extension execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuery {
    /// Command type (execute_script, click, screenshot, ...).
    #[serde(rename = "type")]
    pub query_type: String,
    /// Opaque parameters forwarded to the extension.
    pub params: Value,
    /// Tab the command targets; `None` means the tracked tab.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    /// Correlation ID.
    pub correlation_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Client that enqueued the command.
    pub client_id: String,
}

/// What the long poll hands to the extension.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredCommand {
    /// Correlation ID.
    pub correlation_id: String,
    /// Command type.
    #[serde(rename = "type")]
    pub query_type: String,
    /// Opaque parameters.
    pub params: Value,
}

/// Point-in-time view of one command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSnapshot {
    /// The query as enqueued.
    pub query: PendingQuery,
    /// Current state.
    pub state: CommandState,
    /// Result payload for completed/errored commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// When the terminal state was reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

struct Entry {
    query: PendingQuery,
    state: CommandState,
    claimed: bool,
    result: Option<Value>,
    deadline: Instant,
    completed_at: Option<DateTime<Utc>>,
    terminal_at: Option<Instant>,
}

impl Entry {
    /// Apply the lazy timeout transition.
    fn refresh(&mut self, now: Instant) {
        if self.state == CommandState::Pending && now >= self.deadline {
            self.state = CommandState::Timeout;
            self.completed_at = Some(Utc::now());
            self.terminal_at = Some(now);
        }
    }

    fn snapshot(&self) -> CommandSnapshot {
        CommandSnapshot {
            query: self.query.clone(),
            state: self.state,
            result: self.result.clone(),
            completed_at: self.completed_at,
        }
    }
}

struct RegistryInner {
    entries: HashMap<String, Entry>,
    // FIFO order of enqueue, for long-poll delivery.
    order: Vec<String>,
}

/// The pending-command registry.
pub struct PendingRegistry {
    inner: Mutex<RegistryInner>,
    queue_notify: Notify,
    result_notify: Notify,
    id_prefix: String,
    next_id: AtomicU64,
}

impl PendingRegistry {
    /// Create an empty registry with a process-unique ID prefix.
    pub fn new() -> Self {
        let mut bytes = [0u8; 3];
        rand::rng().fill_bytes(&mut bytes);
        let prefix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self {
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            queue_notify: Notify::new(),
            result_notify: Notify::new(),
            id_prefix: prefix,
            next_id: AtomicU64::new(1),
        }
    }

    /// Enqueue a command. Returns its correlation ID.
    pub async fn create(
        &self,
        query_type: &str,
        params: Value,
        tab_id: Option<i64>,
        timeout: Duration,
        client_id: &str,
    ) -> String {
        let correlation_id = format!(
            "cmd_{}_{}",
            self.id_prefix,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );
        let entry = Entry {
            query: PendingQuery {
                query_type: query_type.to_string(),
                params,
                tab_id,
                correlation_id: correlation_id.clone(),
                created_at: Utc::now(),
                client_id: client_id.to_string(),
            },
            state: CommandState::Pending,
            claimed: false,
            result: None,
            deadline: Instant::now() + timeout,
            completed_at: None,
            terminal_at: None,
        };

        {
            let mut inner = self.inner.lock().await;
            // Capacity: evict the oldest entry; a pending one expires.
            if inner.entries.len() >= MAX_ENTRIES {
                if let Some(oldest) = inner.order.first().cloned() {
                    if let Some(mut evicted) = inner.entries.remove(&oldest) {
                        if evicted.state == CommandState::Pending {
                            evicted.state = CommandState::Expired;
                            warn!(correlation_id = %oldest, "pending command evicted at capacity");
                        }
                    }
                    inner.order.retain(|id| id != &oldest);
                }
            }
            inner.order.push(correlation_id.clone());
            inner.entries.insert(correlation_id.clone(), entry);
        }

        debug!(correlation_id = %correlation_id, query_type, "command enqueued");
        self.queue_notify.notify_waiters();
        correlation_id
    }

    /// The long poll: wait up to `max_wait` for the next undelivered
    /// pending command in FIFO order, scoped to `tab_id` when given.
    pub async fn next_for_extension(
        &self,
        tab_id: Option<i64>,
        max_wait: Duration,
    ) -> Option<DeliveredCommand> {
        let deadline = Instant::now() + max_wait;
        loop {
            let notified = self.queue_notify.notified();
            tokio::pin!(notified);

            {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();
                let order = inner.order.clone();
                for id in order {
                    let Some(entry) = inner.entries.get_mut(&id) else {
                        continue;
                    };
                    entry.refresh(now);
                    if entry.state != CommandState::Pending || entry.claimed {
                        continue;
                    }
                    // Commands pinned to a tab only go to that tab's poller.
                    if let (Some(want), Some(have)) = (entry.query.tab_id, tab_id) {
                        if want != have {
                            continue;
                        }
                    }
                    entry.claimed = true;
                    return Some(DeliveredCommand {
                        correlation_id: entry.query.correlation_id.clone(),
                        query_type: entry.query.query_type.clone(),
                        params: entry.query.params.clone(),
                    });
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return None,
            }
        }
    }

    /// Post a result. `status` other than `"complete"`/`"ok"` maps to the
    /// error state. Late results for terminal commands are rejected.
    pub async fn post_result(
        &self,
        correlation_id: &str,
        status: &str,
        result: Value,
    ) -> Result<(), PendingError> {
        {
            let mut inner = self.inner.lock().await;
            let entry = inner
                .entries
                .get_mut(correlation_id)
                .ok_or_else(|| PendingError::NotFound(correlation_id.to_string()))?;
            entry.refresh(Instant::now());
            if entry.state.is_terminal() {
                return Err(PendingError::AlreadyTerminal(
                    correlation_id.to_string(),
                    format!("{:?}", entry.state).to_lowercase(),
                ));
            }
            entry.state = match status {
                "complete" | "ok" | "success" => CommandState::Complete,
                _ => CommandState::Error,
            };
            entry.result = Some(result);
            entry.completed_at = Some(Utc::now());
            entry.terminal_at = Some(Instant::now());
        }
        self.result_notify.notify_waiters();
        Ok(())
    }

    /// Block until the command reaches a terminal state or the deadline
    /// passes. Returns `(snapshot, found)`.
    pub async fn wait_for(
        &self,
        correlation_id: &str,
        deadline: Instant,
    ) -> (Option<CommandSnapshot>, bool) {
        loop {
            let notified = self.result_notify.notified();
            tokio::pin!(notified);

            {
                let mut inner = self.inner.lock().await;
                match inner.entries.get_mut(correlation_id) {
                    None => return (None, false),
                    Some(entry) => {
                        entry.refresh(Instant::now());
                        if entry.state.is_terminal() {
                            return (Some(entry.snapshot()), true);
                        }
                    }
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    // Deadline hit while still pending: surface a timeout
                    // view without forcing the entry's own transition; its
                    // deadline may be longer than this waiter's.
                    let mut inner = self.inner.lock().await;
                    return match inner.entries.get_mut(correlation_id) {
                        None => (None, false),
                        Some(entry) => {
                            entry.refresh(Instant::now());
                            (Some(entry.snapshot()), true)
                        }
                    };
                }
            }
        }
    }

    /// Current state of a command; missing IDs are not-found.
    pub async fn get(&self, correlation_id: &str) -> Option<CommandSnapshot> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_mut(correlation_id)?;
        entry.refresh(Instant::now());
        Some(entry.snapshot())
    }

    /// Snapshot of every retained command, in enqueue order.
    pub async fn all(&self) -> Vec<CommandSnapshot> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let order = inner.order.clone();
        let mut out = Vec::with_capacity(order.len());
        for id in order {
            if let Some(entry) = inner.entries.get_mut(&id) {
                entry.refresh(now);
                out.push(entry.snapshot());
            }
        }
        out
    }

    /// Cancel every pending command; returns how many.
    pub async fn clear(&self) -> usize {
        let count = {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            let mut count = 0;
            for entry in inner.entries.values_mut() {
                entry.refresh(now);
                if entry.state == CommandState::Pending {
                    entry.state = CommandState::Cancelled;
                    entry.completed_at = Some(Utc::now());
                    entry.terminal_at = Some(now);
                    count += 1;
                }
            }
            count
        };
        self.result_notify.notify_waiters();
        count
    }

    /// Transition overdue commands and evict terminal entries past the
    /// grace window. Called from the daemon's cleanup task.
    pub async fn sweep(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        for entry in inner.entries.values_mut() {
            entry.refresh(now);
        }
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| match entry.terminal_at {
            Some(at) => now.duration_since(at) < TERMINAL_GRACE,
            None => true,
        });
        let retained: Vec<String> = inner.entries.keys().cloned().collect();
        inner.order.retain(|id| retained.contains(id));
        before - inner.entries.len()
    }

    /// Number of retained entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_deliver_fifo() {
        let registry = PendingRegistry::new();
        let first = registry
            .create("click", json!({"selector": "#a"}), None, DEFAULT_TIMEOUT, "c1")
            .await;
        let second = registry
            .create("screenshot", json!({}), None, DEFAULT_TIMEOUT, "c1")
            .await;

        let d1 = registry
            .next_for_extension(None, Duration::from_millis(50))
            .await
            .unwrap();
        let d2 = registry
            .next_for_extension(None, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(d1.correlation_id, first);
        assert_eq!(d2.correlation_id, second);

        // Claimed commands are not redelivered.
        assert!(
            registry
                .next_for_extension(None, Duration::from_millis(20))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_post_result_wakes_waiter() {
        let registry = std::sync::Arc::new(PendingRegistry::new());
        let id = registry
            .create("execute_script", json!({"code": "1+1"}), None, DEFAULT_TIMEOUT, "c1")
            .await;

        let waiter = {
            let registry = std::sync::Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move {
                registry
                    .wait_for(&id, Instant::now() + Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry
            .post_result(&id, "complete", json!({"value": 2}))
            .await
            .unwrap();

        let (snapshot, found) = waiter.await.unwrap();
        assert!(found);
        let snapshot = snapshot.unwrap();
        assert_eq!(snapshot.state, CommandState::Complete);
        assert_eq!(snapshot.result.unwrap()["value"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_transition() {
        let registry = PendingRegistry::new();
        let id = registry
            .create("query_dom", json!({}), None, Duration::from_secs(1), "c1")
            .await;

        tokio::time::advance(Duration::from_secs(2)).await;
        let snapshot = registry.get(&id).await.unwrap();
        assert_eq!(snapshot.state, CommandState::Timeout);

        // A late result does not overwrite the terminal state.
        let err = registry.post_result(&id, "complete", json!({})).await;
        assert!(matches!(err, Err(PendingError::AlreadyTerminal(_, _))));
        assert_eq!(registry.get(&id).await.unwrap().state, CommandState::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_then_eviction() {
        let registry = PendingRegistry::new();
        let id = registry
            .create("click", json!({}), None, Duration::from_secs(1), "c1")
            .await;

        tokio::time::advance(Duration::from_secs(2)).await;
        registry.sweep().await;
        // Still queryable inside the grace window.
        assert_eq!(registry.get(&id).await.unwrap().state, CommandState::Timeout);

        tokio::time::advance(TERMINAL_GRACE + Duration::from_secs(1)).await;
        registry.sweep().await;
        assert!(registry.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_cancels_pending() {
        let registry = PendingRegistry::new();
        registry
            .create("click", json!({}), None, DEFAULT_TIMEOUT, "c1")
            .await;
        let done = registry
            .create("screenshot", json!({}), None, DEFAULT_TIMEOUT, "c1")
            .await;
        registry
            .post_result(&done, "complete", json!({}))
            .await
            .unwrap();

        assert_eq!(registry.clear().await, 1);
        let states: Vec<_> = registry.all().await.into_iter().map(|s| s.state).collect();
        assert!(states.contains(&CommandState::Cancelled));
        assert!(states.contains(&CommandState::Complete));
    }

    #[tokio::test]
    async fn test_tab_scoping() {
        let registry = PendingRegistry::new();
        registry
            .create("click", json!({}), Some(7), DEFAULT_TIMEOUT, "c1")
            .await;

        // A poller for tab 9 does not receive tab 7's command.
        assert!(
            registry
                .next_for_extension(Some(9), Duration::from_millis(20))
                .await
                .is_none()
        );
        assert!(
            registry
                .next_for_extension(Some(7), Duration::from_millis(20))
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let registry = PendingRegistry::new();
        assert!(registry.get("cmd_zz_999").await.is_none());
        let err = registry.post_result("cmd_zz_999", "complete", json!({})).await;
        assert!(matches!(err, Err(PendingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_error_status_maps_to_error_state() {
        let registry = PendingRegistry::new();
        let id = registry
            .create("execute_script", json!({}), None, DEFAULT_TIMEOUT, "c1")
            .await;
        registry
            .post_result(&id, "error", json!({"message": "script threw"}))
            .await
            .unwrap();
        assert_eq!(registry.get(&id).await.unwrap().state, CommandState::Error);
    }
}
