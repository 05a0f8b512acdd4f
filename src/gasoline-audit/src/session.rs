//! Client identification and session minting.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;

/// MCP client names we recognise and preserve as-is.
const KNOWN_CLIENTS: &[&str] = &["claude-code", "cursor", "windsurf", "cline"];

/// Normalise a client identity from `initialize`.
///
/// Names are lower-cased; empty names become `"unknown"`; both known and
/// unknown names pass through after normalisation.
pub fn identify_client(name: &str, _version: &str) -> String {
    let normalized = name.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return "unknown".to_string();
    }
    if let Some(known) = KNOWN_CLIENTS.iter().find(|k| **k == normalized) {
        return (*known).to_string();
    }
    normalized
}

/// Mint a cryptographically random 32-hex-char session ID.
pub fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Per-session bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Normalised client ID.
    pub client_id: String,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Tool calls made in this session.
    pub tool_calls: u64,
}

/// Registry of active MCP sessions, keyed by session ID.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionInfo>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for the given client identity; returns its ID.
    pub fn create_session(&self, name: &str, version: &str) -> String {
        let session_id = new_session_id();
        let info = SessionInfo {
            client_id: identify_client(name, version),
            started_at: Utc::now(),
            tool_calls: 0,
        };
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .insert(session_id.clone(), info);
        session_id
    }

    /// Look up a session.
    pub fn get_session(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .get(session_id)
            .cloned()
    }

    /// The client ID for a session, or `""` when the session is unknown
    /// (single-client fallback key).
    pub fn client_for(&self, session_id: &str) -> String {
        self.get_session(session_id)
            .map(|s| s.client_id)
            .unwrap_or_default()
    }

    /// Bump the session's tool-call counter.
    pub fn record_tool_call(&self, session_id: &str) {
        if let Some(info) = self
            .sessions
            .lock()
            .expect("session lock poisoned")
            .get_mut(session_id)
        {
            info.tool_calls += 1;
        }
    }

    /// Drop a session on client disconnect.
    pub fn remove_session(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .remove(session_id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session lock poisoned").len()
    }

    /// Whether any session exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_identify_client() {
        assert_eq!(identify_client("Claude-Code", "1.0"), "claude-code");
        assert_eq!(identify_client("CURSOR", "2.1"), "cursor");
        assert_eq!(identify_client("", "1.0"), "unknown");
        assert_eq!(identify_client("My-Custom-IDE", "0.1"), "my-custom-ide");
    }

    #[test]
    fn test_session_id_format() {
        let id = new_session_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_concurrent_session_ids_distinct() {
        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                (0..8)
                    .map(|_| registry.create_session("claude-code", "1.0"))
                    .collect::<Vec<_>>()
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert_eq!(id.len(), 32);
                assert!(all.insert(id), "duplicate session id");
            }
        }
        assert_eq!(all.len(), 128);
        assert_eq!(registry.len(), 128);
    }

    #[test]
    fn test_session_lifecycle() {
        let registry = SessionRegistry::new();
        let id = registry.create_session("cursor", "1.2");

        registry.record_tool_call(&id);
        registry.record_tool_call(&id);

        let info = registry.get_session(&id).unwrap();
        assert_eq!(info.client_id, "cursor");
        assert_eq!(info.tool_calls, 2);

        registry.remove_session(&id);
        assert!(registry.get_session(&id).is_none());
        assert_eq!(registry.client_for(&id), "");
    }
}
