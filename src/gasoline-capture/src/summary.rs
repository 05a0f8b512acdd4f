//! Session performance summaries.
//!
//! Deltas are computed first-snapshot-vs-latest per URL; when the current
//! session has no usable first snapshot the per-URL baseline stands in,
//! provided it has folded at least two samples.

use std::collections::HashMap;

use serde::Serialize;

use crate::entities::{EnhancedAction, PerfBaseline, PerformanceSnapshot};

/// One metric's before/after pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDelta {
    /// Metric name (load, fcp, lcp, cls, ttfb, dcl, dom_interactive,
    /// transfer_size).
    pub metric: String,
    /// Value in the "before" snapshot.
    pub before: f64,
    /// Value in the "after" snapshot.
    pub after: f64,
    /// after - before.
    pub delta: f64,
}

/// All metric deltas for one URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlDelta {
    /// Page URL.
    pub url: String,
    /// Whether the "before" side came from the historical baseline.
    pub from_baseline: bool,
    /// Field-by-field deltas; absent metrics contribute nothing.
    pub metrics: Vec<MetricDelta>,
}

/// The computed session summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// `ok`, `insufficient_data`, or `no_performance_data`.
    pub status: String,
    /// Per-URL deltas.
    pub deltas: Vec<UrlDelta>,
    /// Number of `navigate` actions in the session.
    pub reload_count: usize,
    /// Last minus first action timestamp.
    pub duration_ms: i64,
}

/// Outcome of one tracked error for the one-liner.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ErrorOutcome {
    /// True when the error disappeared after the fix.
    pub resolved: bool,
}

fn metric_pairs(before: &PerformanceSnapshot, after: &PerformanceSnapshot) -> Vec<MetricDelta> {
    fn push(out: &mut Vec<MetricDelta>, name: &str, before: Option<f64>, after: Option<f64>) {
        if let (Some(b), Some(a)) = (before, after) {
            out.push(MetricDelta {
                metric: name.to_string(),
                before: b,
                after: a,
                delta: a - b,
            });
        }
    }

    let mut out = Vec::new();
    push(&mut out, "load", before.timing.load, after.timing.load);
    push(&mut out, "fcp", before.timing.fcp, after.timing.fcp);
    push(&mut out, "lcp", before.timing.lcp, after.timing.lcp);
    push(&mut out, "cls", before.cls, after.cls);
    push(&mut out, "ttfb", before.timing.ttfb, after.timing.ttfb);
    push(&mut out, "dcl", before.timing.dcl, after.timing.dcl);
    push(
        &mut out,
        "dom_interactive",
        before.timing.dom_interactive,
        after.timing.dom_interactive,
    );
    push(
        &mut out,
        "transfer_size",
        Some(before.network.transfer_size as f64),
        Some(after.network.transfer_size as f64),
    );
    out
}

fn baseline_as_snapshot(baseline: &PerfBaseline) -> PerformanceSnapshot {
    PerformanceSnapshot {
        url: baseline.url.clone(),
        timestamp: baseline.updated_at,
        timing: baseline.timing.clone(),
        network: baseline.network.clone(),
        long_tasks: 0,
        cls: None,
    }
}

/// Compute the session summary. `snapshot_order` is the canonical list of
/// URLs seen this session, in first-seen order.
pub fn session_summary(
    snapshot_order: &[String],
    first_snapshots: &HashMap<String, PerformanceSnapshot>,
    latest: &HashMap<String, PerformanceSnapshot>,
    baselines: &HashMap<String, PerfBaseline>,
    snapshot_count: usize,
    actions: &[EnhancedAction],
) -> SessionSummary {
    let mut deltas = Vec::new();

    for url in snapshot_order {
        let Some(after) = latest.get(url) else {
            continue;
        };

        let first = first_snapshots
            .get(url)
            .filter(|f| f.timestamp != after.timestamp);

        let (before, from_baseline) = match first {
            Some(f) => (f.clone(), false),
            None => match baselines.get(url).filter(|b| b.sample_count >= 2) {
                Some(b) => (baseline_as_snapshot(b), true),
                None => continue,
            },
        };

        deltas.push(UrlDelta {
            url: url.clone(),
            from_baseline,
            metrics: metric_pairs(&before, after),
        });
    }

    let status = if deltas.is_empty() {
        if snapshot_count == 0 {
            "no_performance_data".to_string()
        } else {
            "insufficient_data".to_string()
        }
    } else {
        "ok".to_string()
    };

    let reload_count = actions
        .iter()
        .filter(|a| a.action_type == "navigate")
        .count();
    let duration_ms = match (actions.first(), actions.last()) {
        (Some(first), Some(last)) if actions.len() >= 2 => {
            (last.timestamp - first.timestamp).num_milliseconds()
        }
        _ => 0,
    };

    SessionSummary {
        status,
        deltas,
        reload_count,
        duration_ms,
    }
}

/// Render a markdown delta table for PR descriptions.
pub fn pr_summary(summary: &SessionSummary) -> String {
    if summary.deltas.is_empty() {
        return "no perf data".to_string();
    }

    let mut out = String::from("| Metric | Before | After | Delta |\n|---|---|---|---|\n");
    for url_delta in &summary.deltas {
        for m in &url_delta.metrics {
            let (before, after, delta) = if m.metric == "transfer_size" {
                (
                    format!("{:.1}KB", m.before / 1024.0),
                    format!("{:.1}KB", m.after / 1024.0),
                    format!("{:+.1}KB", m.delta / 1024.0),
                )
            } else if m.metric == "cls" {
                (
                    format!("{:.3}", m.before),
                    format!("{:.3}", m.after),
                    format!("{:+.3}", m.delta),
                )
            } else {
                (
                    format!("{:.0}ms", m.before),
                    format!("{:.0}ms", m.after),
                    format!("{:+.0}ms", m.delta),
                )
            };
            out.push_str(&format!(
                "| {} ({}) | {} | {} | {} |\n",
                m.metric, url_delta.url, before, after, delta
            ));
        }
    }
    out
}

/// Render the one-line summary, e.g.
/// `perf: +200ms load, +45.0KB bundle; errors: 1 fixed`.
pub fn one_liner(summary: &SessionSummary, errors: &[ErrorOutcome]) -> String {
    let perf_part = match summary.deltas.first() {
        None => "no perf data".to_string(),
        Some(primary) => {
            let load = primary.metrics.iter().find(|m| m.metric == "load");
            let bundle = primary.metrics.iter().find(|m| m.metric == "transfer_size");

            let mut parts = Vec::new();
            if let Some(load) = load {
                if load.delta != 0.0 {
                    parts.push(format!("{:+}ms load", load.delta.round() as i64));
                }
            }
            if let Some(bundle) = bundle {
                if bundle.delta != 0.0 {
                    parts.push(format!("{:+.1}KB bundle", bundle.delta / 1024.0));
                }
            }

            if parts.is_empty() {
                "perf: no change".to_string()
            } else {
                format!("perf: {}", parts.join(", "))
            }
        }
    };

    if errors.is_empty() {
        return perf_part;
    }

    let fixed = errors.iter().filter(|e| e.resolved).count();
    let new = errors.len() - fixed;
    let mut error_part = format!("errors: {fixed} fixed");
    if new > 0 {
        error_part.push_str(&format!(", {new} new"));
    }
    format!("{perf_part}; {error_part}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PerfNetwork, PerfTiming};
    use chrono::{Duration, Utc};

    fn snap(url: &str, load: f64, transfer_kib: u64, offset_secs: i64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            url: url.into(),
            timestamp: Utc::now() + Duration::seconds(offset_secs),
            timing: PerfTiming {
                load: Some(load),
                ..Default::default()
            },
            network: PerfNetwork {
                request_count: 10,
                transfer_size: transfer_kib * 1024,
            },
            long_tasks: 0,
            cls: None,
        }
    }

    fn summary_for(before: PerformanceSnapshot, after: PerformanceSnapshot) -> SessionSummary {
        let url = before.url.clone();
        let mut first = HashMap::new();
        first.insert(url.clone(), before);
        let mut latest = HashMap::new();
        latest.insert(url.clone(), after);
        session_summary(&[url], &first, &latest, &HashMap::new(), 2, &[])
    }

    #[test]
    fn test_one_liner_format() {
        let summary = summary_for(
            snap("https://app.test/", 1200.0, 340, 0),
            snap("https://app.test/", 1400.0, 385, 60),
        );
        let line = one_liner(&summary, &[ErrorOutcome { resolved: true }]);
        assert!(line.contains("perf: +200ms load"), "{line}");
        assert!(line.contains("+45.0KB bundle"), "{line}");
        assert!(line.contains("errors: 1 fixed"), "{line}");
        assert!(!line.contains("new"), "{line}");
    }

    #[test]
    fn test_one_liner_no_change() {
        let summary = summary_for(
            snap("https://app.test/", 900.0, 100, 0),
            snap("https://app.test/", 900.0, 100, 60),
        );
        assert_eq!(one_liner(&summary, &[]), "perf: no change");
    }

    #[test]
    fn test_no_performance_data() {
        let summary = session_summary(&[], &HashMap::new(), &HashMap::new(), &HashMap::new(), 0, &[]);
        assert_eq!(summary.status, "no_performance_data");
        assert_eq!(one_liner(&summary, &[]), "no perf data");
    }

    #[test]
    fn test_insufficient_data_with_single_snapshot() {
        let only = snap("https://app.test/", 800.0, 50, 0);
        let mut first = HashMap::new();
        first.insert(only.url.clone(), only.clone());
        let mut latest = HashMap::new();
        latest.insert(only.url.clone(), only.clone());

        let summary = session_summary(
            &[only.url.clone()],
            &first,
            &latest,
            &HashMap::new(),
            1,
            &[],
        );
        assert_eq!(summary.status, "insufficient_data");
    }

    #[test]
    fn test_baseline_fallback_requires_two_samples() {
        let after = snap("https://app.test/", 1000.0, 80, 120);
        let mut latest = HashMap::new();
        latest.insert(after.url.clone(), after.clone());

        // first snapshot == latest, so the baseline is consulted.
        let mut first = HashMap::new();
        first.insert(after.url.clone(), after.clone());

        let mut baselines = HashMap::new();
        let mut baseline = PerfBaseline::from_snapshot(&snap("https://app.test/", 700.0, 60, 0));
        baselines.insert(after.url.clone(), baseline.clone());

        // Single-sample baseline: not usable.
        let summary = session_summary(
            &[after.url.clone()],
            &first,
            &latest,
            &baselines,
            3,
            &[],
        );
        assert_eq!(summary.status, "insufficient_data");

        // Two samples: usable.
        baseline.fold(&snap("https://app.test/", 720.0, 62, 30));
        baselines.insert(after.url.clone(), baseline);
        let summary = session_summary(
            &[after.url.clone()],
            &first,
            &latest,
            &baselines,
            3,
            &[],
        );
        assert_eq!(summary.status, "ok");
        assert!(summary.deltas[0].from_baseline);
    }

    #[test]
    fn test_reload_count_and_duration() {
        let mk_action = |action_type: &str, offset: i64| EnhancedAction {
            action_type: action_type.into(),
            timestamp: Utc::now() + Duration::milliseconds(offset),
            url: String::new(),
            selectors: HashMap::new(),
            value: None,
            to_url: None,
            scroll_y: None,
            key: None,
            source: "user".into(),
        };
        let actions = vec![
            mk_action("click", 0),
            mk_action("navigate", 500),
            mk_action("navigate", 1500),
        ];
        let summary = session_summary(
            &[],
            &HashMap::new(),
            &HashMap::new(),
            &HashMap::new(),
            0,
            &actions,
        );
        assert_eq!(summary.reload_count, 2);
        assert_eq!(summary.duration_ms, 1500);
    }

    #[test]
    fn test_pr_summary_table() {
        let summary = summary_for(
            snap("https://app.test/", 1200.0, 340, 0),
            snap("https://app.test/", 1400.0, 385, 60),
        );
        let table = pr_summary(&summary);
        assert!(table.starts_with("| Metric | Before | After | Delta |"));
        assert!(table.contains("+200ms"));
        assert!(table.contains("+45.0KB"));
    }
}
