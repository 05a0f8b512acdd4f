//! Per-client element-index store.
//!
//! Index-based click/type shortcuts resolve through this map. Each MCP
//! client gets its own `index -> selector` table so one client's
//! `list_interactive` rebuild never invalidates another's indices; `""`
//! is the single-client fallback key.

use std::collections::HashMap;
use std::sync::Mutex;

/// `client_id -> (index -> selector)`.
#[derive(Default)]
pub struct ElementIndexStore {
    inner: Mutex<HashMap<String, HashMap<u32, String>>>,
}

impl ElementIndexStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace one client's map. Other clients' maps are untouched.
    pub fn replace_for_client(&self, client_id: &str, map: HashMap<u32, String>) {
        self.inner
            .lock()
            .expect("element store lock poisoned")
            .insert(client_id.to_string(), map);
    }

    /// Resolve an index for a client, falling back to the `""` map.
    pub fn resolve(&self, client_id: &str, index: u32) -> Option<String> {
        let inner = self.inner.lock().expect("element store lock poisoned");
        inner
            .get(client_id)
            .and_then(|m| m.get(&index))
            .or_else(|| inner.get("").and_then(|m| m.get(&index)))
            .cloned()
    }

    /// Number of indices stored for a client.
    pub fn len_for_client(&self, client_id: &str) -> usize {
        self.inner
            .lock()
            .expect("element store lock poisoned")
            .get(client_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Drop one client's map on disconnect.
    pub fn remove_client(&self, client_id: &str) {
        self.inner
            .lock()
            .expect("element store lock poisoned")
            .remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(u32, &str)]) -> HashMap<u32, String> {
        entries.iter().map(|(i, s)| (*i, s.to_string())).collect()
    }

    #[test]
    fn test_per_client_isolation() {
        let store = ElementIndexStore::new();
        store.replace_for_client("a", map(&[(1, "#login")]));
        store.replace_for_client("b", map(&[(1, "#signup")]));

        assert_eq!(store.resolve("a", 1).unwrap(), "#login");
        assert_eq!(store.resolve("b", 1).unwrap(), "#signup");

        // Rebuilding client a does not clear client b.
        store.replace_for_client("a", map(&[(1, "#logout")]));
        assert_eq!(store.resolve("b", 1).unwrap(), "#signup");
    }

    #[test]
    fn test_single_client_fallback() {
        let store = ElementIndexStore::new();
        store.replace_for_client("", map(&[(3, ".submit")]));
        assert_eq!(store.resolve("any-client", 3).unwrap(), ".submit");
    }

    #[test]
    fn test_unknown_index() {
        let store = ElementIndexStore::new();
        store.replace_for_client("a", map(&[(1, "#x")]));
        assert!(store.resolve("a", 99).is_none());
    }
}
