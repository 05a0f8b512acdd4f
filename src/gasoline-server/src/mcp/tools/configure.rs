//! `configure` - capture, noise, audit, and verification settings.

use serde_json::{Value, json};

use gasoline_capture::{LogLevelFilter, WsMode};
use gasoline_noise::{MatchSpec, NoiseError, RuleCategory};
use gasoline_protocol::{ToolError, ToolErrorCode};
use gasoline_verify::{VerifyError, VerifySnapshot};

use super::{ToolCtx, ToolOutput, ToolResult, opt_bool, opt_str, require_str};

const ACTIONS: &[&str] = &[
    "capture_settings",
    "add_noise_rule",
    "remove_noise_rule",
    "list_noise_rules",
    "auto_detect_noise",
    "verification_start",
    "verification_watch",
    "verification_compare",
    "verification_cancel",
    "audit_enable",
    "clear_all",
];

/// Run a configure call.
pub async fn run(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let action = require_str(args, "action")?;

    match action {
        "capture_settings" => capture_settings(ctx, args).await,
        "add_noise_rule" => add_noise_rule(ctx, args),
        "remove_noise_rule" => remove_noise_rule(ctx, args),
        "list_noise_rules" => {
            let rules = ctx.state.noise.list_rules();
            Ok(ToolOutput::new(
                format!("{} noise rules", rules.len()),
                json!({ "rules": rules, "stats": ctx.state.noise.stats() }),
            ))
        }
        "auto_detect_noise" => {
            let console = ctx.state.capture.get_console_entries().await;
            let network = ctx.state.capture.get_network_bodies().await;
            let proposals = ctx.state.noise.auto_detect(&console, &network);
            Ok(ToolOutput::new(
                format!("{} noise proposals", proposals.len()),
                json!({ "proposals": proposals }),
            ))
        }
        "verification_start" => verification_start(ctx, args).await,
        "verification_watch" => {
            let session_id = require_str(args, "session_id")?;
            let session = ctx.state.verify.watch(session_id).map_err(verify_error)?;
            Ok(ToolOutput::new(
                format!("Watching for fix '{}'", session.label),
                json!({ "session": session }),
            ))
        }
        "verification_compare" => verification_compare(ctx, args).await,
        "verification_cancel" => {
            let session_id = require_str(args, "session_id")?;
            ctx.state.verify.cancel(session_id).map_err(verify_error)?;
            Ok(ToolOutput::new(
                "Verification session cancelled",
                json!({ "session_id": session_id }),
            ))
        }
        "audit_enable" => {
            let enabled = opt_bool(args, "enabled", true);
            ctx.state.audit.set_enabled(enabled);
            Ok(ToolOutput::new(
                format!("Audit trail {}", if enabled { "enabled" } else { "disabled" }),
                json!({ "enabled": enabled }),
            ))
        }
        "clear_all" => {
            let cleared = ctx.state.capture.clear_all().await;
            let cancelled = ctx.state.pending.clear().await;
            Ok(ToolOutput::new(
                format!("Cleared {cleared} entries, cancelled {cancelled} commands"),
                json!({ "cleared": cleared, "cancelled_commands": cancelled }),
            ))
        }
        other => Err(ToolError::unknown_mode("action", other, ACTIONS)),
    }
}

async fn capture_settings(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let mut settings = ctx.state.capture.settings().await;

    if let Some(level) = opt_str(args, "log_level") {
        settings.log_level = LogLevelFilter::parse(level);
    }
    if let Some(mode) = opt_str(args, "ws_mode") {
        settings.ws_mode = WsMode::parse(mode);
    }
    if let Some(bodies) = args.get("network_bodies").and_then(|v| v.as_bool()) {
        settings.network_bodies = bodies;
    }
    if let Some(replay) = args.get("action_replay").and_then(|v| v.as_bool()) {
        settings.action_replay = replay;
    }
    if let Some(on_error) = args.get("screenshot_on_error").and_then(|v| v.as_bool()) {
        settings.screenshot_on_error = on_error;
    }

    ctx.state.capture.update_settings(settings.clone()).await;
    Ok(ToolOutput::new(
        "Capture settings updated",
        json!({ "settings": settings }),
    ))
}

fn parse_category(value: &str) -> Result<RuleCategory, ToolError> {
    match value {
        "console" => Ok(RuleCategory::Console),
        "network" => Ok(RuleCategory::Network),
        "websocket" => Ok(RuleCategory::Websocket),
        other => Err(ToolError::unknown_mode(
            "category",
            other,
            &["console", "network", "websocket"],
        )),
    }
}

fn add_noise_rule(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let category = parse_category(require_str(args, "category")?)?;
    let classification = opt_str(args, "classification").unwrap_or("user rule");
    let dismiss = opt_bool(args, "dismiss", false);

    let match_spec = MatchSpec {
        message_regex: opt_str(args, "message_regex").map(str::to_string),
        source_regex: opt_str(args, "source_regex").map(str::to_string),
        url_regex: opt_str(args, "url_regex").map(str::to_string),
        method: opt_str(args, "method").unwrap_or_default().to_string(),
        status_min: args.get("status_min").and_then(|v| v.as_u64()).unwrap_or(0) as u16,
        status_max: args.get("status_max").and_then(|v| v.as_u64()).unwrap_or(0) as u16,
        level: opt_str(args, "level").unwrap_or_default().to_string(),
    };

    match ctx
        .state
        .noise
        .add_rule(category, classification, match_spec, dismiss)
    {
        Ok(Some(rule_id)) => Ok(ToolOutput::new(
            format!("Noise rule {rule_id} added"),
            json!({ "rule_id": rule_id }),
        )),
        Ok(None) => Ok(ToolOutput::new(
            "Noise rule dropped: rule capacity reached",
            json!({ "rule_id": Value::Null, "dropped": true }),
        )
        .with_warning("rule table is at capacity; remove rules before adding more")),
        Err(NoiseError::UnsafePattern(reason)) => Err(ToolError::invalid_param(
            "pattern",
            format!("Pattern rejected by the safety gate: {reason}"),
        )),
        Err(e) => Err(ToolError::new(
            ToolErrorCode::InternalError,
            e.to_string(),
            "Retry the call.",
        )),
    }
}

fn remove_noise_rule(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let rule_id = require_str(args, "rule_id")?;
    match ctx.state.noise.remove_rule(rule_id) {
        Ok(()) => Ok(ToolOutput::new(
            format!("Noise rule {rule_id} removed"),
            json!({ "rule_id": rule_id }),
        )),
        Err(NoiseError::BuiltinImmutable(_)) => Err(ToolError::invalid_param(
            "rule_id",
            format!("Rule '{rule_id}' is built-in and cannot be removed"),
        )),
        Err(NoiseError::NotFound(_)) => Err(ToolError::new(
            ToolErrorCode::NoData,
            format!("No rule with ID '{rule_id}'"),
            "List rules with configure(action=list_noise_rules) and retry with an existing ID.",
        )
        .with_param("rule_id")),
        Err(e) => Err(ToolError::new(
            ToolErrorCode::InternalError,
            e.to_string(),
            "Retry the call.",
        )),
    }
}

/// Freeze the current page health into a verification snapshot.
async fn freeze_snapshot(ctx: &ToolCtx, url_filter: Option<&str>) -> VerifySnapshot {
    let console = ctx.state.capture.get_console_entries().await;
    let network = ctx.state.capture.get_network_bodies().await;
    let perf = ctx
        .state
        .capture
        .get_performance_snapshots()
        .await
        .into_iter()
        .last();
    let page_url = ctx.state.capture.tracked_tab().await.map(|t| t.url);
    VerifySnapshot::capture(&console, &network, perf, page_url, url_filter)
}

async fn verification_start(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let label = require_str(args, "label")?;
    let url_filter = opt_str(args, "url_filter").map(str::to_string);

    let baseline = freeze_snapshot(ctx, url_filter.as_deref()).await;
    let session = ctx
        .state
        .verify
        .start(&ctx.client_id, label, url_filter, baseline)
        .map_err(verify_error)?;

    Ok(ToolOutput::new(
        format!(
            "Baseline frozen: {} console errors, {} network errors",
            session.baseline.console_errors.len(),
            session.baseline.network_errors.len()
        ),
        json!({ "session": session }),
    ))
}

async fn verification_compare(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let session_id = require_str(args, "session_id")?;
    let url_filter = ctx
        .state
        .verify
        .status(session_id)
        .map_err(verify_error)?
        .url_filter;

    let after = freeze_snapshot(ctx, url_filter.as_deref()).await;
    let (session, diff) = ctx
        .state
        .verify
        .compare(session_id, after)
        .map_err(verify_error)?;

    Ok(ToolOutput::new(
        format!(
            "Verdict: {} ({} resolved, {} new)",
            diff.verdict,
            diff.resolved.len(),
            diff.new_issues.len()
        ),
        json!({ "session": session, "diff": diff }),
    ))
}

fn verify_error(error: VerifyError) -> ToolError {
    match error {
        VerifyError::CapacityReached => ToolError::new(
            ToolErrorCode::RateLimited,
            error.to_string(),
            "Cancel an existing verification session or wait for one to expire, then retry.",
        ),
        VerifyError::NotFound(ref id) => ToolError::new(
            ToolErrorCode::NoData,
            error.to_string(),
            "Start one with configure(action=verification_start) and use its session_id.",
        )
        .with_param("session_id")
        .with_hint(format!("unknown session: {id}")),
        VerifyError::NotWatching(_, ref state) => ToolError::invalid_param(
            "session_id",
            format!("Session must be watching before compare (currently '{state}')"),
        )
        .with_hint("call configure(action=verification_watch) first"),
    }
}
