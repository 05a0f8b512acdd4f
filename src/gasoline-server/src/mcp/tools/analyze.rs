//! `analyze` - summaries and correlation over captured telemetry.

use serde_json::{Value, json};

use gasoline_audit::AuditQuery;
use gasoline_capture::{ErrorOutcome, one_liner, pr_summary};
use gasoline_protocol::{ToolError, ToolErrorCode};

use super::{ToolCtx, ToolOutput, ToolResult, opt_str, opt_usize, require_str};

const ACTIONS: &[&str] = &[
    "session_summary",
    "pr_summary",
    "one_liner",
    "verification_status",
    "audit_query",
    "noise_proposals",
];

fn parse_error_outcomes(args: &Value) -> Vec<ErrorOutcome> {
    args.get("errors")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| ErrorOutcome {
                    resolved: item
                        .get("resolved")
                        .and_then(|r| r.as_bool())
                        .unwrap_or(false),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Run an analyze call.
pub async fn run(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let action = require_str(args, "action")?;

    match action {
        "session_summary" => {
            let summary = ctx.state.capture.generate_session_summary().await;
            Ok(ToolOutput::new(
                format!("Session summary: {}", summary.status),
                json!({ "summary": summary }),
            ))
        }

        "pr_summary" => {
            let summary = ctx.state.capture.generate_session_summary().await;
            let markdown = pr_summary(&summary);
            Ok(ToolOutput::new(
                "Performance delta table",
                json!({ "status": summary.status, "markdown": markdown }),
            ))
        }

        "one_liner" => {
            let summary = ctx.state.capture.generate_session_summary().await;
            let errors = parse_error_outcomes(args);
            let line = one_liner(&summary, &errors);
            Ok(ToolOutput::new(line.clone(), json!({ "one_liner": line })))
        }

        "verification_status" => {
            let session_id = require_str(args, "session_id")?;
            let session = ctx.state.verify.status(session_id).map_err(|e| {
                ToolError::new(
                    ToolErrorCode::NoData,
                    e.to_string(),
                    "Start a verification session with configure(action=verification_start) first.",
                )
            })?;
            let status = format!("{:?}", session.status).to_lowercase();
            Ok(ToolOutput::new(
                format!("Verification '{}' is {status}", session.label),
                json!({ "session": session }),
            ))
        }

        "audit_query" => {
            let query = AuditQuery {
                session_id: opt_str(args, "session_id").map(str::to_string),
                tool_name: opt_str(args, "tool_name").map(str::to_string),
                since: opt_str(args, "since").and_then(|s| s.parse().ok()),
                limit: Some(opt_usize(args, "limit", 100)),
            };
            let entries = ctx.state.audit.query(&query);
            let redactions = ctx.state.audit.redaction_events(opt_usize(args, "limit", 100));
            Ok(ToolOutput::new(
                format!("{} audit entries", entries.len()),
                json!({
                    "entries": entries,
                    "redaction_events": redactions,
                    "enabled": ctx.state.audit.is_enabled(),
                }),
            ))
        }

        "noise_proposals" => {
            let console = ctx.state.capture.get_console_entries().await;
            let network = ctx.state.capture.get_network_bodies().await;
            let proposals = ctx.state.noise.auto_detect(&console, &network);
            let applied = proposals.iter().filter(|p| p.applied_rule_id.is_some()).count();
            Ok(ToolOutput::new(
                format!(
                    "{} noise proposals ({applied} auto-applied)",
                    proposals.len()
                ),
                json!({ "proposals": proposals }),
            ))
        }

        other => Err(ToolError::unknown_mode("action", other, ACTIONS)),
    }
}
