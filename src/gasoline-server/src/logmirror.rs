//! Append-only JSONL mirror of console entries.
//!
//! Enabled by `--log-file`; every ingested console entry is appended as
//! one JSON line. Write failures are logged and do not fail ingestion.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use gasoline_capture::ConsoleEntry;

/// JSONL sink for console entries.
pub struct LogMirror {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl LogMirror {
    /// Open (or create) the mirror file for appending.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Mirror a batch of entries. Failures are logged, never propagated.
    pub fn append(&self, entries: &[ConsoleEntry]) {
        let mut file = self.file.lock().expect("log mirror lock poisoned");
        for entry in entries {
            match serde_json::to_string(entry) {
                Ok(line) => {
                    if let Err(e) = writeln!(file, "{line}") {
                        warn!(path = %self.path.display(), error = %e, "log mirror write failed");
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "log mirror serialization failed"),
            }
        }
        if let Err(e) = file.flush() {
            warn!(path = %self.path.display(), error = %e, "log mirror flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_append_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.jsonl");
        let mirror = LogMirror::open(&path).unwrap();

        let entry = ConsoleEntry {
            level: "error".into(),
            message: "boom".into(),
            source: "app.js".into(),
            url: String::new(),
            line: 1,
            column: 1,
            stack: None,
            ts: Utc::now(),
        };
        mirror.append(&[entry.clone(), entry]);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"boom\""));
    }
}
