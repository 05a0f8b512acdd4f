//! Snapshot capture shape and the baseline/after diff.

use serde::{Deserialize, Serialize};

use gasoline_capture::{ConsoleEntry, NetworkBody, PerformanceSnapshot};

use crate::normalize::normalize;

/// Cap on each captured list inside a snapshot.
pub const SNAPSHOT_CAP: usize = 50;

/// Identity of a network error for matching: `"METHOD path"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkErrorKey {
    /// HTTP method.
    pub method: String,
    /// URL path (no scheme/host/query).
    pub path: String,
}

impl NetworkErrorKey {
    /// Build the key for a network body.
    pub fn for_body(body: &NetworkBody) -> Self {
        Self {
            method: body.method.clone(),
            path: url_path(&body.url).to_string(),
        }
    }

    /// Render as `"METHOD path"`.
    pub fn render(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

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

/// A frozen view of page health at one point in time.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySnapshot {
    /// Deduplicated, normalised console error messages.
    pub console_errors: Vec<String>,
    /// Network errors (status >= 400) with their observed status.
    pub network_errors: Vec<(NetworkErrorKey, u16)>,
    /// Latest status seen per request key, errors or not.
    pub all_requests: Vec<(NetworkErrorKey, u16)>,
    /// Performance snapshot at freeze time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf: Option<PerformanceSnapshot>,
    /// Page URL at freeze time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
}

impl VerifySnapshot {
    /// Freeze current console errors, network errors, and perf state.
    /// Lists are capped at `SNAPSHOT_CAP` entries each.
    pub fn capture(
        console: &[ConsoleEntry],
        network: &[NetworkBody],
        perf: Option<PerformanceSnapshot>,
        page_url: Option<String>,
        url_filter: Option<&str>,
    ) -> Self {
        let mut console_errors = Vec::new();
        for entry in console {
            if entry.level != "error" {
                continue;
            }
            if let Some(filter) = url_filter {
                if !entry.url.contains(filter) {
                    continue;
                }
            }
            let normalized = normalize(&entry.message);
            if !console_errors.contains(&normalized) {
                console_errors.push(normalized);
                if console_errors.len() == SNAPSHOT_CAP {
                    break;
                }
            }
        }

        let mut network_errors = Vec::new();
        let mut all_requests: Vec<(NetworkErrorKey, u16)> = Vec::new();
        for body in network {
            if let Some(filter) = url_filter {
                if !body.url.contains(filter) {
                    continue;
                }
            }
            let key = NetworkErrorKey::for_body(body);
            // Keep the latest status per key.
            match all_requests.iter().position(|(k, _)| *k == key) {
                Some(idx) => all_requests[idx].1 = body.status,
                None if all_requests.len() < SNAPSHOT_CAP => {
                    all_requests.push((key.clone(), body.status));
                }
                None => {}
            }
            if body.status >= 400 && !network_errors.iter().any(|(k, _)| *k == key) {
                if network_errors.len() < SNAPSHOT_CAP {
                    network_errors.push((key, body.status));
                }
            }
        }

        Self {
            console_errors,
            network_errors,
            all_requests,
            perf,
            page_url,
        }
    }

    /// Total distinct issues in the snapshot.
    pub fn total_issues(&self) -> usize {
        self.console_errors.len() + self.network_errors.len()
    }
}

/// Performance comparison between the two snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfDiff {
    /// Load in the baseline, ms.
    pub before_load: f64,
    /// Load in the after snapshot, ms.
    pub after_load: f64,
    /// ((after - before) / before) * 100.
    pub change_pct: f64,
    /// Signed display string, e.g. `+16.7%`.
    pub formatted: String,
}

/// The computed verification diff.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyDiff {
    /// One of: no_issues_detected, fixed, improved, different_issue,
    /// regressed, unchanged.
    pub verdict: String,
    /// Baseline issues that disappeared (or recovered to non-error).
    pub resolved: Vec<String>,
    /// Issues present only in the after snapshot.
    pub new_issues: Vec<String>,
    /// Baseline issues still present after.
    pub persisting: Vec<String>,
    /// Performance comparison, when both snapshots carry a Load value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf: Option<PerfDiff>,
}

/// Diff a baseline against an after snapshot and pick the verdict.
pub fn compute_diff(baseline: &VerifySnapshot, after: &VerifySnapshot) -> VerifyDiff {
    let mut resolved = Vec::new();
    let mut persisting = Vec::new();
    let mut new_issues = Vec::new();

    // Console errors match on normalised form.
    for message in &baseline.console_errors {
        if after.console_errors.contains(message) {
            persisting.push(message.clone());
        } else {
            resolved.push(message.clone());
        }
    }
    for message in &after.console_errors {
        if !baseline.console_errors.contains(message) {
            new_issues.push(message.clone());
        }
    }

    // Network errors match on "METHOD path". A request that reappears
    // with a 2xx/3xx status counts as resolved, not unchanged.
    for (key, _) in &baseline.network_errors {
        let after_status = after
            .all_requests
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, status)| *status);
        match after_status {
            Some(status) if status >= 400 => persisting.push(key.render()),
            _ => resolved.push(key.render()),
        }
    }
    for (key, _) in &after.network_errors {
        if !baseline.network_errors.iter().any(|(k, _)| k == key) {
            new_issues.push(key.render());
        }
    }

    let verdict = pick_verdict(
        baseline.total_issues(),
        after.total_issues(),
        resolved.len(),
        new_issues.len(),
    );

    let perf = match (
        baseline.perf.as_ref().and_then(|p| p.timing.load),
        after.perf.as_ref().and_then(|p| p.timing.load),
    ) {
        (Some(before_load), Some(after_load)) if before_load > 0.0 => {
            let change_pct = ((after_load - before_load) / before_load) * 100.0;
            Some(PerfDiff {
                before_load,
                after_load,
                change_pct,
                formatted: format!("{change_pct:+.1}%"),
            })
        }
        _ => None,
    };

    VerifyDiff {
        verdict,
        resolved,
        new_issues,
        persisting,
        perf,
    }
}

fn pick_verdict(baseline_total: usize, after_total: usize, resolved: usize, new: usize) -> String {
    let verdict = if baseline_total == 0 && after_total == 0 {
        "no_issues_detected"
    } else if resolved > 0 && new == 0 && after_total == 0 {
        "fixed"
    } else if resolved > 0 && new == 0 {
        "improved"
    } else if resolved > 0 && new > 0 {
        "different_issue"
    } else if new > 0 {
        "regressed"
    } else {
        "unchanged"
    };
    verdict.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gasoline_capture::{PerfNetwork, PerfTiming};

    fn console_error(message: &str) -> ConsoleEntry {
        ConsoleEntry {
            level: "error".into(),
            message: message.into(),
            source: String::new(),
            url: "https://app.test/".into(),
            line: 0,
            column: 0,
            stack: None,
            ts: Utc::now(),
        }
    }

    fn body(method: &str, url: &str, status: u16) -> NetworkBody {
        NetworkBody {
            method: method.into(),
            url: url.into(),
            status,
            request_body: String::new(),
            response_body: String::new(),
            content_type: String::new(),
            ts: Utc::now(),
        }
    }

    fn perf(load: f64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            url: "https://app.test/".into(),
            timestamp: Utc::now(),
            timing: PerfTiming {
                load: Some(load),
                ..Default::default()
            },
            network: PerfNetwork::default(),
            long_tasks: 0,
            cls: None,
        }
    }

    #[test]
    fn test_fixed_verdict_with_dedup() {
        let baseline = VerifySnapshot::capture(
            &[
                console_error("TypeError: x is undefined"),
                console_error("TypeError: x is undefined"),
                console_error("TypeError: x is undefined"),
            ],
            &[body("POST", "https://app.test/api/login", 500)],
            None,
            None,
            None,
        );
        let after = VerifySnapshot::capture(&[], &[], None, None, None);

        let diff = compute_diff(&baseline, &after);
        assert_eq!(diff.verdict, "fixed");
        assert_eq!(diff.resolved.len(), 2);
        assert!(diff.new_issues.is_empty());
    }

    #[test]
    fn test_regressed_verdict() {
        let baseline = VerifySnapshot::capture(&[], &[], None, None, None);
        let after = VerifySnapshot::capture(
            &[console_error("ReferenceError: y is not defined")],
            &[],
            None,
            None,
            None,
        );

        let diff = compute_diff(&baseline, &after);
        assert_eq!(diff.verdict, "regressed");
        assert_eq!(diff.new_issues.len(), 1);
    }

    #[test]
    fn test_recovered_network_error_counts_resolved() {
        let baseline = VerifySnapshot::capture(
            &[],
            &[body("GET", "https://app.test/users", 500)],
            None,
            None,
            None,
        );
        let after = VerifySnapshot::capture(
            &[],
            &[body("GET", "https://app.test/users", 200)],
            None,
            None,
            None,
        );

        let diff = compute_diff(&baseline, &after);
        assert_eq!(diff.verdict, "fixed");
        assert_eq!(diff.resolved, vec!["GET /users"]);
    }

    #[test]
    fn test_different_issue_verdict() {
        let baseline =
            VerifySnapshot::capture(&[console_error("Error X happened")], &[], None, None, None);
        let after =
            VerifySnapshot::capture(&[console_error("Error Y happened")], &[], None, None, None);

        let diff = compute_diff(&baseline, &after);
        assert_eq!(diff.verdict, "different_issue");
    }

    #[test]
    fn test_no_issues_detected() {
        let empty = VerifySnapshot::capture(&[], &[], None, None, None);
        let diff = compute_diff(&empty, &empty.clone());
        assert_eq!(diff.verdict, "no_issues_detected");
    }

    #[test]
    fn test_unchanged_verdict() {
        let snap =
            VerifySnapshot::capture(&[console_error("persistent problem")], &[], None, None, None);
        let diff = compute_diff(&snap, &snap.clone());
        assert_eq!(diff.verdict, "unchanged");
        assert_eq!(diff.persisting.len(), 1);
    }

    #[test]
    fn test_perf_diff_requires_both_loads() {
        let baseline = VerifySnapshot::capture(&[], &[], Some(perf(1200.0)), None, None);
        let after = VerifySnapshot::capture(&[], &[], Some(perf(1400.0)), None, None);

        let diff = compute_diff(&baseline, &after);
        let perf_diff = diff.perf.unwrap();
        assert!((perf_diff.change_pct - 16.666).abs() < 0.1);
        assert!(perf_diff.formatted.starts_with('+'));

        let no_perf = VerifySnapshot::capture(&[], &[], None, None, None);
        let diff = compute_diff(&baseline, &no_perf);
        assert!(diff.perf.is_none());
    }

    #[test]
    fn test_url_filter_restricts_capture() {
        let snap = VerifySnapshot::capture(
            &[],
            &[
                body("GET", "https://app.test/api/x", 500),
                body("GET", "https://other.test/api/y", 500),
            ],
            None,
            None,
            Some("app.test"),
        );
        assert_eq!(snap.network_errors.len(), 1);
    }
}
