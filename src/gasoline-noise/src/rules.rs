//! Noise rule types, the user-pattern safety gate, and the built-in set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum regex length accepted from users.
pub const MAX_PATTERN_LEN: usize = 512;

/// Maximum total rules (builtin + user + auto). Excess adds are dropped.
pub const MAX_RULES: usize = 100;

/// Errors from rule management.
#[derive(Debug, Error)]
pub enum NoiseError {
    /// Built-in rules cannot be removed or replaced.
    #[error("rule '{0}' is built-in and cannot be modified")]
    BuiltinImmutable(String),

    /// No rule with the given ID.
    #[error("rule '{0}' not found")]
    NotFound(String),

    /// Pattern failed the safety gate.
    #[error("pattern rejected: {0}")]
    UnsafePattern(String),
}

/// Which telemetry kind a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    /// Console entries.
    Console,
    /// Network bodies.
    Network,
    /// WebSocket events.
    Websocket,
}

/// Match criteria. Empty fields are wildcards; non-empty fields are
/// ANDed, except the console message/source pair which is ORed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchSpec {
    /// Regex over the console message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_regex: Option<String>,
    /// Regex over the console source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_regex: Option<String>,
    /// Regex over the request/socket URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_regex: Option<String>,
    /// Exact HTTP method.
    pub method: String,
    /// Inclusive status lower bound; 0 means unbounded.
    pub status_min: u16,
    /// Inclusive status upper bound; 0 means unbounded.
    pub status_max: u16,
    /// Exact console level.
    pub level: String,
}

impl MatchSpec {
    /// Whether a status code falls inside the configured bounds.
    pub fn status_in_range(&self, status: u16) -> bool {
        (self.status_min == 0 || status >= self.status_min)
            && (self.status_max == 0 || status <= self.status_max)
    }

    /// Whether any method/status constraint is configured.
    pub fn has_network_constraint(&self) -> bool {
        !self.method.is_empty() || self.status_min != 0 || self.status_max != 0
    }
}

/// One noise rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseRule {
    /// Rule ID; the prefix encodes provenance
    /// (`builtin_`, `user_`, `auto_`, `dismiss_`).
    pub id: String,
    /// Telemetry kind this rule applies to.
    pub category: RuleCategory,
    /// Short label for what the rule filters.
    pub classification: String,
    /// Match criteria.
    pub match_spec: MatchSpec,
    /// Whether the frequency detector created this rule.
    pub auto_detected: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl NoiseRule {
    /// Whether this rule ships with the daemon.
    pub fn is_builtin(&self) -> bool {
        self.id.starts_with("builtin_")
    }
}

/// Safety gate for user-supplied patterns.
///
/// Rejects patterns long enough or nested enough to risk catastrophic
/// backtracking: a quantifier immediately following another quantifier,
/// optionally across a group close. Invalid *syntax* is deliberately not
/// rejected here; it fails compilation later and the rule never matches.
pub fn validate_user_pattern(pattern: &str) -> Result<(), NoiseError> {
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(NoiseError::UnsafePattern(format!(
            "pattern exceeds {MAX_PATTERN_LEN} characters"
        )));
    }

    let chars: Vec<char> = pattern.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if !matches!(c, '*' | '+' | '?' | '}') {
            continue;
        }
        // Escaped quantifier characters are literals.
        if i > 0 && chars[i - 1] == '\\' {
            continue;
        }
        let mut j = i + 1;
        if chars.get(j) == Some(&')') {
            j += 1;
        }
        if matches!(chars.get(j), Some('*' | '+' | '?' | '{')) {
            return Err(NoiseError::UnsafePattern(format!(
                "nested quantifier at offset {i}"
            )));
        }
    }
    Ok(())
}

/// The built-in rule set shipped with the daemon.
pub fn builtin_rules() -> Vec<NoiseRule> {
    let now = Utc::now();
    let rule = |id: &str, category: RuleCategory, classification: &str, spec: MatchSpec| NoiseRule {
        id: id.to_string(),
        category,
        classification: classification.to_string(),
        match_spec: spec,
        auto_detected: false,
        created_at: now,
    };

    vec![
        rule(
            "builtin_extension_chatter",
            RuleCategory::Console,
            "extension-internal logging",
            MatchSpec {
                source_regex: Some(r"chrome-extension://".to_string()),
                ..Default::default()
            },
        ),
        rule(
            "builtin_devtools_banner",
            RuleCategory::Console,
            "framework dev banners",
            MatchSpec {
                message_regex: Some(
                    r"(?i)(download the (react|vue) devtools|running in development mode)"
                        .to_string(),
                ),
                ..Default::default()
            },
        ),
        rule(
            "builtin_hmr",
            RuleCategory::Console,
            "hot-module-reload chatter",
            MatchSpec {
                message_regex: Some(r"(?i)(\[hmr\]|\[vite\]|webpack-dev-server|hot update)".to_string()),
                ..Default::default()
            },
        ),
        rule(
            "builtin_analytics",
            RuleCategory::Network,
            "analytics beacons",
            MatchSpec {
                url_regex: Some(
                    r"(google-analytics\.com|googletagmanager\.com|segment\.io|mixpanel\.com|sentry\.io/api)"
                        .to_string(),
                ),
                ..Default::default()
            },
        ),
        rule(
            "builtin_preflight",
            RuleCategory::Network,
            "CORS preflight",
            MatchSpec {
                method: "OPTIONS".to_string(),
                status_min: 200,
                status_max: 299,
                ..Default::default()
            },
        ),
        rule(
            "builtin_dev_websocket",
            RuleCategory::Websocket,
            "dev-server sockets",
            MatchSpec {
                url_regex: Some(r"(sockjs-node|/ws\b|__vite|webpack)".to_string()),
                ..Default::default()
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_range_zero_unbounded() {
        let spec = MatchSpec::default();
        assert!(spec.status_in_range(200));
        assert!(spec.status_in_range(500));

        let bounded = MatchSpec {
            status_min: 200,
            status_max: 299,
            ..Default::default()
        };
        assert!(bounded.status_in_range(204));
        assert!(!bounded.status_in_range(301));
    }

    #[test]
    fn test_safety_gate_rejects_nested_quantifiers() {
        assert!(validate_user_pattern("(a+)+").is_err());
        assert!(validate_user_pattern("a*+").is_err());
        assert!(validate_user_pattern("a?+").is_err());
        assert!(validate_user_pattern("a{2,}+").is_err());
    }

    #[test]
    fn test_safety_gate_accepts_plain_patterns() {
        assert!(validate_user_pattern(r"GET /api/v\d+/users").is_ok());
        assert!(validate_user_pattern(r"\[vite\] connected").is_ok());
        // Escaped quantifier characters are literals.
        assert!(validate_user_pattern(r"price \+\+ tax").is_ok());
    }

    #[test]
    fn test_safety_gate_rejects_long_patterns() {
        let long = "a".repeat(MAX_PATTERN_LEN + 1);
        assert!(validate_user_pattern(&long).is_err());
    }

    #[test]
    fn test_safety_gate_allows_invalid_syntax() {
        // Broken syntax is kept; it fails compile and never matches.
        assert!(validate_user_pattern("([unclosed").is_ok());
    }

    #[test]
    fn test_builtin_ids() {
        for rule in builtin_rules() {
            assert!(rule.is_builtin(), "{}", rule.id);
        }
    }
}
