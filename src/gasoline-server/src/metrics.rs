//! Per-tool counters and process stats.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

/// Request/error counts for one tool.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCounters {
    /// Total calls.
    pub requests: u64,
    /// Calls that returned a tool-level error.
    pub errors: u64,
}

/// Metrics collector.
pub struct Metrics {
    per_tool: Mutex<HashMap<String, ToolCounters>>,
    start_time: Instant,
}

impl Metrics {
    /// Create a collector anchored at daemon start.
    pub fn new() -> Self {
        Self {
            per_tool: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one tool call.
    pub fn record_tool_call(&self, tool: &str, success: bool) {
        let mut per_tool = self.per_tool.lock().expect("metrics lock poisoned");
        let counters = per_tool.entry(tool.to_string()).or_default();
        counters.requests += 1;
        if !success {
            counters.errors += 1;
        }
    }

    /// Snapshot of per-tool counters.
    pub fn per_tool(&self) -> HashMap<String, ToolCounters> {
        self.per_tool.lock().expect("metrics lock poisoned").clone()
    }

    /// Process uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Resident set size in bytes, where the platform exposes it.
pub fn resident_memory_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    let kb: u64 = rest
                        .trim()
                        .trim_end_matches(" kB")
                        .trim()
                        .parse()
                        .unwrap_or(0);
                    return kb * 1024;
                }
            }
        }
        0
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_counters() {
        let metrics = Metrics::new();
        metrics.record_tool_call("observe", true);
        metrics.record_tool_call("observe", false);
        metrics.record_tool_call("configure", true);

        let per_tool = metrics.per_tool();
        assert_eq!(per_tool["observe"].requests, 2);
        assert_eq!(per_tool["observe"].errors, 1);
        assert_eq!(per_tool["configure"].errors, 0);
    }
}
