//! The noise filter engine.
//!
//! Rules live behind an RW lock as `{rule, compiled}` records; statistics
//! live behind their own mutex. Lock order: rules, then stats, never the
//! reverse.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use gasoline_capture::{ConsoleEntry, NetworkBody, WebSocketEvent};

use crate::rules::{
    MAX_RULES, MatchSpec, NoiseError, NoiseRule, RuleCategory, builtin_rules, validate_user_pattern,
};

/// A rule plus its compiled patterns. A pattern that was configured but
/// failed to compile stays `None` and never matches.
struct CompiledRule {
    rule: NoiseRule,
    message_re: Option<Regex>,
    source_re: Option<Regex>,
    url_re: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: NoiseRule) -> Self {
        fn try_compile(pattern: &Option<String>, rule_id: &str) -> Option<Regex> {
            let pattern = pattern.as_deref()?;
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(rule = rule_id, error = %e, "noise pattern failed to compile; rule arm disabled");
                    None
                }
            }
        }

        let message_re = try_compile(&rule.match_spec.message_regex, &rule.id);
        let source_re = try_compile(&rule.match_spec.source_regex, &rule.id);
        let url_re = try_compile(&rule.match_spec.url_regex, &rule.id);
        Self {
            rule,
            message_re,
            source_re,
            url_re,
        }
    }

    fn matches_console(&self, entry: &ConsoleEntry) -> bool {
        if self.rule.category != RuleCategory::Console {
            return false;
        }
        let spec = &self.rule.match_spec;
        if !spec.level.is_empty() && spec.level != entry.level {
            return false;
        }

        let has_message = spec.message_regex.is_some();
        let has_source = spec.source_regex.is_some();
        if !has_message && !has_source {
            // Level-only (or fully wildcard) rule.
            return !spec.level.is_empty();
        }

        // Message OR source inside a single rule.
        let message_hit = self
            .message_re
            .as_ref()
            .is_some_and(|re| re.is_match(&entry.message));
        let source_hit = self
            .source_re
            .as_ref()
            .is_some_and(|re| re.is_match(&entry.source));
        message_hit || source_hit
    }

    fn matches_network(&self, body: &NetworkBody) -> bool {
        if self.rule.category != RuleCategory::Network {
            return false;
        }
        let spec = &self.rule.match_spec;
        if !spec.method.is_empty() && spec.method != body.method {
            return false;
        }
        if !spec.status_in_range(body.status) {
            return false;
        }

        match (&spec.url_regex, &self.url_re) {
            // URL pattern configured and compiled: it decides.
            (Some(_), Some(re)) => re.is_match(&body.url),
            // Configured but failed compile: never matches.
            (Some(_), None) => false,
            // No URL pattern: fire only when a method/status constraint
            // did the narrowing (supports "OPTIONS 2xx").
            (None, _) => spec.has_network_constraint(),
        }
    }

    fn matches_websocket(&self, event: &WebSocketEvent) -> bool {
        if self.rule.category != RuleCategory::Websocket {
            return false;
        }
        match (&self.rule.match_spec.url_regex, &self.url_re) {
            (Some(_), Some(re)) => re.is_match(&event.url),
            _ => false,
        }
    }
}

/// Per-filter statistics, kept under a separate mutex.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    /// Matches per rule ID.
    pub matches_by_rule: HashMap<String, u64>,
    /// Total entries classified as noise.
    pub total_filtered: u64,
    /// Last time something passed as signal.
    pub last_signal: Option<DateTime<Utc>>,
    /// Last time something was filtered as noise.
    pub last_noise: Option<DateTime<Utc>>,
}

/// Rule-based noise classifier with built-in and user rules.
pub struct NoiseFilter {
    rules: RwLock<Vec<CompiledRule>>,
    stats: Mutex<RuleStats>,
    next_id: AtomicU64,
}

impl NoiseFilter {
    /// Create a filter seeded with the built-in rule set.
    pub fn new() -> Self {
        let compiled = builtin_rules().into_iter().map(CompiledRule::compile).collect();
        Self {
            rules: RwLock::new(compiled),
            stats: Mutex::new(RuleStats::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of stored rules.
    pub fn rule_count(&self) -> usize {
        self.rules.read().expect("rules lock poisoned").len()
    }

    /// List all rules.
    pub fn list_rules(&self) -> Vec<NoiseRule> {
        self.rules
            .read()
            .expect("rules lock poisoned")
            .iter()
            .map(|c| c.rule.clone())
            .collect()
    }

    /// Add a rule. User patterns pass the safety gate first. Returns the
    /// new rule ID, or `None` when the capacity cap dropped the rule.
    pub fn add_rule(
        &self,
        category: RuleCategory,
        classification: &str,
        match_spec: MatchSpec,
        dismiss: bool,
    ) -> Result<Option<String>, NoiseError> {
        for pattern in [
            &match_spec.message_regex,
            &match_spec.source_regex,
            &match_spec.url_regex,
        ]
        .into_iter()
        .flatten()
        {
            validate_user_pattern(pattern)?;
        }

        let prefix = if dismiss { "dismiss" } else { "user" };
        let id = format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let rule = NoiseRule {
            id: id.clone(),
            category,
            classification: classification.to_string(),
            match_spec,
            auto_detected: false,
            created_at: Utc::now(),
        };

        let mut rules = self.rules.write().expect("rules lock poisoned");
        if rules.len() >= MAX_RULES {
            debug!(rule = %id, "rule cap reached; dropping new rule");
            return Ok(None);
        }
        rules.push(CompiledRule::compile(rule));
        Ok(Some(id))
    }

    /// Add an auto-detected rule (already escaped; bypasses the gate).
    fn add_auto_rule(
        rules: &mut Vec<CompiledRule>,
        next_id: &AtomicU64,
        category: RuleCategory,
        classification: &str,
        match_spec: MatchSpec,
    ) -> Option<String> {
        if rules.len() >= MAX_RULES {
            return None;
        }
        let id = format!("auto_{}", next_id.fetch_add(1, Ordering::SeqCst));
        rules.push(CompiledRule::compile(NoiseRule {
            id: id.clone(),
            category,
            classification: classification.to_string(),
            match_spec,
            auto_detected: true,
            created_at: Utc::now(),
        }));
        Some(id)
    }

    /// Remove a user/auto rule. Built-ins are immutable.
    pub fn remove_rule(&self, id: &str) -> Result<(), NoiseError> {
        if id.starts_with("builtin_") {
            return Err(NoiseError::BuiltinImmutable(id.to_string()));
        }
        let mut rules = self.rules.write().expect("rules lock poisoned");
        let before = rules.len();
        rules.retain(|c| c.rule.id != id);
        if rules.len() == before {
            return Err(NoiseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Fully rebuild the compiled side of every rule.
    pub fn recompile(&self) {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        let owned: Vec<NoiseRule> = rules.iter().map(|c| c.rule.clone()).collect();
        *rules = owned.into_iter().map(CompiledRule::compile).collect();
    }

    fn record(&self, matched: Option<&str>) {
        let mut stats = self.stats.lock().expect("stats lock poisoned");
        match matched {
            Some(id) => {
                *stats.matches_by_rule.entry(id.to_string()).or_insert(0) += 1;
                stats.total_filtered += 1;
                stats.last_noise = Some(Utc::now());
            }
            None => stats.last_signal = Some(Utc::now()),
        }
    }

    /// Classify a console entry; returns the matching rule ID when noise.
    pub fn classify_console(&self, entry: &ConsoleEntry) -> Option<String> {
        let matched = {
            let rules = self.rules.read().expect("rules lock poisoned");
            rules
                .iter()
                .find(|c| c.matches_console(entry))
                .map(|c| c.rule.id.clone())
        };
        self.record(matched.as_deref());
        matched
    }

    /// Classify a network body. 401/403 responses are never noise,
    /// whatever the rule set says.
    pub fn classify_network(&self, body: &NetworkBody) -> Option<String> {
        if body.is_auth_sensitive() {
            self.record(None);
            return None;
        }
        let matched = {
            let rules = self.rules.read().expect("rules lock poisoned");
            rules
                .iter()
                .find(|c| c.matches_network(body))
                .map(|c| c.rule.id.clone())
        };
        self.record(matched.as_deref());
        matched
    }

    /// Classify a WebSocket event.
    pub fn classify_websocket(&self, event: &WebSocketEvent) -> Option<String> {
        let matched = {
            let rules = self.rules.read().expect("rules lock poisoned");
            rules
                .iter()
                .find(|c| c.matches_websocket(event))
                .map(|c| c.rule.id.clone())
        };
        self.record(matched.as_deref());
        matched
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> RuleStats {
        self.stats.lock().expect("stats lock poisoned").clone()
    }

    /// Run frequency-based auto-detection over buffered telemetry.
    ///
    /// High-confidence proposals (>= 0.9) are applied immediately; the
    /// rest are returned for user approval. Proposals already covered by
    /// an existing rule are dropped.
    pub fn auto_detect(
        &self,
        console: &[ConsoleEntry],
        network: &[NetworkBody],
    ) -> Vec<crate::detect::NoiseProposal> {
        let mut rules = self.rules.write().expect("rules lock poisoned");

        let candidates = crate::detect::propose(console, network);
        let mut pending = Vec::new();

        for mut proposal in candidates {
            // Drop proposals whose sample the current rule set already
            // classifies as noise.
            let duplicate = match proposal.category {
                RuleCategory::Console => {
                    let probe = proposal.sample_console_entry();
                    rules.iter().any(|c| c.matches_console(&probe))
                }
                RuleCategory::Network => {
                    let probe = proposal.sample_network_body();
                    rules.iter().any(|c| c.matches_network(&probe))
                }
                RuleCategory::Websocket => false,
            };
            if duplicate {
                continue;
            }

            if proposal.confidence >= 0.9 {
                proposal.applied_rule_id = Self::add_auto_rule(
                    &mut rules,
                    &self.next_id,
                    proposal.category,
                    &proposal.classification,
                    proposal.match_spec.clone(),
                );
            }
            pending.push(proposal);
        }
        pending
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new()
    }
}
