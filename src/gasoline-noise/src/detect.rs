//! Frequency-based noise detection.
//!
//! Scans buffered telemetry for repeated messages, node_modules sources,
//! and polling-style endpoints, and turns them into rule proposals with a
//! confidence score. Proposals at or above 0.9 are applied by the filter;
//! the rest go back to the user.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;

use gasoline_capture::{ConsoleEntry, NetworkBody};

use crate::rules::{MatchSpec, RuleCategory};

/// Repeats before a console message becomes a proposal.
const CONSOLE_REPEAT_THRESHOLD: usize = 10;

/// Entries before a node_modules source becomes a proposal.
const SOURCE_REPEAT_THRESHOLD: usize = 2;

/// Hits before a polling path becomes a proposal.
const NETWORK_REPEAT_THRESHOLD: usize = 20;

/// Path fragments that mark polling/infrastructure endpoints.
const POLLING_PATH_MARKERS: &[&str] = &["/health", "/ping", "/ready", "/__", "/sockjs-node", "/ws"];

/// A proposed noise rule awaiting approval (or already applied).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseProposal {
    /// Telemetry kind the proposal covers.
    pub category: RuleCategory,
    /// Label for what would be filtered.
    pub classification: String,
    /// The match criteria the rule would get.
    pub match_spec: MatchSpec,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
    /// How many buffered entries supported the proposal.
    pub sample_count: usize,
    /// The literal sample the proposal came from.
    pub sample: String,
    /// Rule ID when the proposal was auto-applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_rule_id: Option<String>,
}

impl NoiseProposal {
    /// Probe entry used to check whether an existing rule already covers
    /// a console proposal.
    pub(crate) fn sample_console_entry(&self) -> ConsoleEntry {
        let is_source = self.match_spec.source_regex.is_some();
        ConsoleEntry {
            level: "log".to_string(),
            message: if is_source { String::new() } else { self.sample.clone() },
            source: if is_source { self.sample.clone() } else { String::new() },
            url: String::new(),
            line: 0,
            column: 0,
            stack: None,
            ts: Utc::now(),
        }
    }

    /// Probe body used to check whether an existing rule already covers a
    /// network proposal.
    pub(crate) fn sample_network_body(&self) -> NetworkBody {
        NetworkBody {
            method: "GET".to_string(),
            url: self.sample.clone(),
            status: 200,
            request_body: String::new(),
            response_body: String::new(),
            content_type: String::new(),
            ts: Utc::now(),
        }
    }
}

/// Extract the path component of a URL, without scheme/host/query.
fn url_path(url: &str) -> &str {
    let after_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let path = match after_scheme.find('/') {
        Some(idx) => &after_scheme[idx..],
        None => "/",
    };
    match path.find(['?', '#']) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Build proposals from buffered telemetry. Pure; dedup against existing
/// rules happens in the filter, which holds the rules lock.
pub fn propose(console: &[ConsoleEntry], network: &[NetworkBody]) -> Vec<NoiseProposal> {
    let mut proposals = Vec::new();

    // Console message frequency.
    let mut message_counts: HashMap<&str, usize> = HashMap::new();
    for entry in console {
        *message_counts.entry(entry.message.as_str()).or_insert(0) += 1;
    }
    for (message, count) in message_counts {
        if count >= CONSOLE_REPEAT_THRESHOLD {
            proposals.push(NoiseProposal {
                category: RuleCategory::Console,
                classification: "repeated console message".to_string(),
                match_spec: MatchSpec {
                    message_regex: Some(regex::escape(message)),
                    ..Default::default()
                },
                confidence: (0.7 + count as f64 / 100.0).min(0.99),
                sample_count: count,
                sample: message.to_string(),
                applied_rule_id: None,
            });
        }
    }

    // Console sources inside node_modules.
    let mut source_counts: HashMap<&str, usize> = HashMap::new();
    for entry in console {
        if entry.source.contains("node_modules") {
            *source_counts.entry(entry.source.as_str()).or_insert(0) += 1;
        }
    }
    for (source, count) in source_counts {
        if count >= SOURCE_REPEAT_THRESHOLD {
            proposals.push(NoiseProposal {
                category: RuleCategory::Console,
                classification: "third-party library logging".to_string(),
                match_spec: MatchSpec {
                    source_regex: Some(regex::escape(source)),
                    ..Default::default()
                },
                confidence: 0.75,
                sample_count: count,
                sample: source.to_string(),
                applied_rule_id: None,
            });
        }
    }

    // Polling-style network paths.
    let mut path_counts: HashMap<&str, usize> = HashMap::new();
    for body in network {
        let path = url_path(&body.url);
        if POLLING_PATH_MARKERS.iter().any(|m| path.contains(m)) {
            *path_counts.entry(url_path(&body.url)).or_insert(0) += 1;
        }
    }
    for (path, count) in path_counts {
        if count >= NETWORK_REPEAT_THRESHOLD {
            proposals.push(NoiseProposal {
                category: RuleCategory::Network,
                classification: "polling endpoint".to_string(),
                match_spec: MatchSpec {
                    url_regex: Some(regex::escape(path)),
                    ..Default::default()
                },
                confidence: 0.8,
                sample_count: count,
                sample: path.to_string(),
                applied_rule_id: None,
            });
        }
    }

    // Deterministic output order for callers and tests.
    proposals.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.sample.cmp(&b.sample))
    });
    proposals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::NoiseFilter;
    use chrono::Utc;

    fn console(message: &str, source: &str) -> ConsoleEntry {
        ConsoleEntry {
            level: "log".into(),
            message: message.into(),
            source: source.into(),
            url: String::new(),
            line: 0,
            column: 0,
            stack: None,
            ts: Utc::now(),
        }
    }

    fn body(url: &str) -> NetworkBody {
        NetworkBody {
            method: "GET".into(),
            url: url.into(),
            status: 200,
            request_body: String::new(),
            response_body: String::new(),
            content_type: String::new(),
            ts: Utc::now(),
        }
    }

    #[test]
    fn test_url_path_extraction() {
        assert_eq!(url_path("https://api.test/health?probe=1"), "/health");
        assert_eq!(url_path("http://host:3000/__vite_ping"), "/__vite_ping");
        assert_eq!(url_path("https://host"), "/");
    }

    #[test]
    fn test_repeated_message_confidence() {
        let entries: Vec<_> = (0..40).map(|_| console("tick", "app.js")).collect();
        let proposals = propose(&entries, &[]);
        assert_eq!(proposals.len(), 1);
        let p = &proposals[0];
        assert!((p.confidence - (0.7 + 0.4)).abs() < 1e-9 || p.confidence == 0.99);
        assert!(p.confidence <= 0.99);
        assert_eq!(p.match_spec.message_regex.as_deref(), Some("tick"));
    }

    #[test]
    fn test_confidence_capped() {
        let entries: Vec<_> = (0..500).map(|_| console("spam", "app.js")).collect();
        let proposals = propose(&entries, &[]);
        assert_eq!(proposals[0].confidence, 0.99);
    }

    #[test]
    fn test_node_modules_source_proposal() {
        let entries = vec![
            console("warn A", "node_modules/lodash/index.js"),
            console("warn B", "node_modules/lodash/index.js"),
        ];
        let proposals = propose(&entries, &[]);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].confidence, 0.75);
        assert!(proposals[0].match_spec.source_regex.is_some());
    }

    #[test]
    fn test_polling_endpoint_proposal() {
        let bodies: Vec<_> = (0..25).map(|_| body("https://api.test/health")).collect();
        let proposals = propose(&[], &bodies);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].confidence, 0.8);
    }

    #[test]
    fn test_below_thresholds_no_proposals() {
        let entries: Vec<_> = (0..9).map(|_| console("tick", "app.js")).collect();
        let bodies: Vec<_> = (0..19).map(|_| body("https://api.test/ping")).collect();
        assert!(propose(&entries, &bodies).is_empty());
    }

    #[test]
    fn test_auto_detect_skips_existing_coverage() {
        let filter = NoiseFilter::new();
        // builtin_hmr already covers [vite] messages.
        let entries: Vec<_> = (0..30).map(|_| console("[vite] hot updated", "x.js")).collect();
        let proposals = filter.auto_detect(&entries, &[]);
        assert!(proposals.is_empty());
    }

    #[test]
    fn test_auto_detect_applies_high_confidence() {
        let filter = NoiseFilter::new();
        let entries: Vec<_> = (0..50).map(|_| console("poll tick 42", "x.js")).collect();
        let proposals = filter.auto_detect(&entries, &[]);
        assert_eq!(proposals.len(), 1);
        // 0.7 + 50/100 caps at 0.99, above the auto-apply bar.
        assert!(proposals[0].applied_rule_id.is_some());
        let id = proposals[0].applied_rule_id.as_ref().unwrap();
        assert!(id.starts_with("auto_"));
        assert!(filter.list_rules().iter().any(|r| r.id == *id));
    }

    #[test]
    fn test_auto_detect_returns_medium_confidence_unapplied() {
        let filter = NoiseFilter::new();
        let entries = vec![
            console("warn A", "node_modules/lib/a.js"),
            console("warn B", "node_modules/lib/a.js"),
        ];
        let proposals = filter.auto_detect(&entries, &[]);
        assert_eq!(proposals.len(), 1);
        assert!(proposals[0].applied_rule_id.is_none());
    }
}
