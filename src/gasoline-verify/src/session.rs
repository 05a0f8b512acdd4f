//! Verification session lifecycle.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::diff::{VerifyDiff, VerifySnapshot, compute_diff};

/// Maximum concurrent sessions per daemon.
pub const MAX_SESSIONS: usize = 3;

/// Sessions older than this are garbage-collected on `start`.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Errors from session management.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// All session slots are taken.
    #[error("verification session limit reached ({MAX_SESSIONS} concurrent)")]
    CapacityReached,

    /// No session with the given ID.
    #[error("verification session '{0}' not found")]
    NotFound(String),

    /// Compare was called before watch.
    #[error("session '{0}' is in state '{1}'; call watch before compare")]
    NotWatching(String, String),
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Baseline captured, not yet watching.
    Baseline,
    /// Watching for the fix.
    Watching,
    /// After snapshot captured and diffed.
    Compared,
    /// Cancelled by the client.
    Cancelled,
}

/// One verification session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSession {
    /// Session ID.
    pub id: String,
    /// Client-supplied label for the fix under test.
    pub label: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Optional URL substring restricting captures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_filter: Option<String>,
    /// Frozen baseline.
    pub baseline: VerifySnapshot,
    /// Frozen after snapshot, once compared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<VerifySnapshot>,
    /// When watching began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_started_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Owner of all verification sessions, keyed by session ID, with the
/// owning client recorded for disconnect cleanup.
#[derive(Default)]
pub struct VerifyManager {
    sessions: Mutex<HashMap<String, (String, VerificationSession)>>,
}

impl VerifyManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session by freezing the given baseline. Expired sessions
    /// are collected first; a full table is an error.
    pub fn start(
        &self,
        client_id: &str,
        label: &str,
        url_filter: Option<String>,
        baseline: VerifySnapshot,
    ) -> Result<VerificationSession, VerifyError> {
        let mut sessions = self.sessions.lock().expect("verify lock poisoned");

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(SESSION_TTL).unwrap_or(chrono::Duration::minutes(30));
        let before = sessions.len();
        sessions.retain(|_, (_, s)| now - s.created_at < ttl);
        if before != sessions.len() {
            debug!(collected = before - sessions.len(), "expired verification sessions removed");
        }

        if sessions.len() >= MAX_SESSIONS {
            return Err(VerifyError::CapacityReached);
        }

        let session = VerificationSession {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            status: SessionStatus::Baseline,
            url_filter,
            baseline,
            after: None,
            watch_started_at: None,
            created_at: now,
        };
        sessions.insert(
            session.id.clone(),
            (client_id.to_string(), session.clone()),
        );
        Ok(session)
    }

    /// Transition to watching. Idempotent.
    pub fn watch(&self, session_id: &str) -> Result<VerificationSession, VerifyError> {
        let mut sessions = self.sessions.lock().expect("verify lock poisoned");
        let (_, session) = sessions
            .get_mut(session_id)
            .ok_or_else(|| VerifyError::NotFound(session_id.to_string()))?;
        if session.status == SessionStatus::Baseline {
            session.status = SessionStatus::Watching;
            session.watch_started_at = Some(Utc::now());
        }
        Ok(session.clone())
    }

    /// Freeze the after snapshot and compute the diff. Requires a prior
    /// `watch`.
    pub fn compare(
        &self,
        session_id: &str,
        after: VerifySnapshot,
    ) -> Result<(VerificationSession, VerifyDiff), VerifyError> {
        let mut sessions = self.sessions.lock().expect("verify lock poisoned");
        let (_, session) = sessions
            .get_mut(session_id)
            .ok_or_else(|| VerifyError::NotFound(session_id.to_string()))?;

        if session.status != SessionStatus::Watching {
            let state = format!("{:?}", session.status).to_lowercase();
            return Err(VerifyError::NotWatching(session_id.to_string(), state));
        }

        let diff = compute_diff(&session.baseline, &after);
        session.after = Some(after);
        session.status = SessionStatus::Compared;
        Ok((session.clone(), diff))
    }

    /// Look up a session.
    pub fn status(&self, session_id: &str) -> Result<VerificationSession, VerifyError> {
        let sessions = self.sessions.lock().expect("verify lock poisoned");
        sessions
            .get(session_id)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| VerifyError::NotFound(session_id.to_string()))
    }

    /// Cancel a session.
    pub fn cancel(&self, session_id: &str) -> Result<(), VerifyError> {
        let mut sessions = self.sessions.lock().expect("verify lock poisoned");
        match sessions.remove(session_id) {
            Some(_) => Ok(()),
            None => Err(VerifyError::NotFound(session_id.to_string())),
        }
    }

    /// Drop every session owned by a disconnecting client.
    pub fn remove_client(&self, client_id: &str) -> usize {
        let mut sessions = self.sessions.lock().expect("verify lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, (owner, _)| owner != client_id);
        before - sessions.len()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("verify lock poisoned").len()
    }

    /// Whether any sessions exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_snapshot() -> VerifySnapshot {
        VerifySnapshot::capture(&[], &[], None, None, None)
    }

    #[test]
    fn test_capacity_limit() {
        let manager = VerifyManager::new();
        for i in 0..MAX_SESSIONS {
            manager
                .start("c1", &format!("fix-{i}"), None, empty_snapshot())
                .unwrap();
        }
        let err = manager.start("c1", "overflow", None, empty_snapshot());
        assert!(matches!(err, Err(VerifyError::CapacityReached)));
    }

    #[test]
    fn test_watch_then_compare() {
        let manager = VerifyManager::new();
        let session = manager
            .start("c1", "login fix", None, empty_snapshot())
            .unwrap();

        // Compare before watch is rejected.
        let err = manager.compare(&session.id, empty_snapshot());
        assert!(matches!(err, Err(VerifyError::NotWatching(_, _))));

        manager.watch(&session.id).unwrap();
        // Idempotent.
        let watched = manager.watch(&session.id).unwrap();
        assert_eq!(watched.status, SessionStatus::Watching);

        let (session, diff) = manager.compare(&session.id, empty_snapshot()).unwrap();
        assert_eq!(session.status, SessionStatus::Compared);
        assert_eq!(diff.verdict, "no_issues_detected");
    }

    #[test]
    fn test_cancel_and_not_found() {
        let manager = VerifyManager::new();
        let session = manager.start("c1", "x", None, empty_snapshot()).unwrap();
        manager.cancel(&session.id).unwrap();
        assert!(matches!(
            manager.status(&session.id),
            Err(VerifyError::NotFound(_))
        ));
    }

    #[test]
    fn test_client_cleanup() {
        let manager = VerifyManager::new();
        manager.start("c1", "a", None, empty_snapshot()).unwrap();
        manager.start("c2", "b", None, empty_snapshot()).unwrap();
        assert_eq!(manager.remove_client("c1"), 1);
        assert_eq!(manager.len(), 1);
    }
}
