//! `observe` - read captured telemetry.

use serde_json::{Value, json};

use gasoline_audit::{AuditQuery, RedactionEvent, redact_json};
use gasoline_capture::ReadPage;
use gasoline_pending::resolve_recording_state;
use gasoline_protocol::{ToolError, ToolErrorCode};

use crate::api::health::health_payload;

use super::{ToolCtx, ToolOutput, ToolResult, opt_bool, opt_str, opt_usize, require_str, with_staleness};

const WHAT_MODES: &[&str] = &[
    "logs",
    "network",
    "websocket",
    "actions",
    "performance",
    "extension_logs",
    "audit",
    "pending_command",
    "noise_rules",
    "recording_state",
    "health",
];

/// Fold a cursor page into payload fields, flagging forced rewinds.
fn cursor_fields<T: serde::Serialize>(
    page: &ReadPage<T>,
    original_cursor: &str,
    payload: &mut serde_json::Map<String, Value>,
) {
    payload.insert("next_cursor".to_string(), json!(page.next_cursor));
    if page.restarted {
        payload.insert("cursor_restarted".to_string(), json!(true));
        payload.insert("original_cursor".to_string(), json!(original_cursor));
    }
}

/// Run an observe call.
pub async fn run(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let what = require_str(args, "what")?;
    let cursor = opt_str(args, "cursor").unwrap_or_default();
    let limit = opt_usize(args, "limit", 100);
    let include_noise = opt_bool(args, "include_noise", false);

    match what {
        "logs" => {
            let page = ctx.state.capture.read_console_since(cursor, limit).await;
            let mut noise_filtered = 0usize;
            let entries: Vec<_> = page
                .items
                .iter()
                .filter(|entry| {
                    if include_noise {
                        return true;
                    }
                    let noisy = ctx.state.noise.classify_console(entry).is_some();
                    if noisy {
                        noise_filtered += 1;
                    }
                    !noisy
                })
                .collect();

            let mut payload = serde_json::Map::new();
            payload.insert("entries".to_string(), json!(entries));
            payload.insert("count".to_string(), json!(entries.len()));
            payload.insert("noise_filtered".to_string(), json!(noise_filtered));
            cursor_fields(&page, cursor, &mut payload);

            let mut output = ToolOutput::new(
                summary_line("console entr", "y", "ies", entries.len()),
                Value::Object(payload),
            );
            if let Some(warning) = &page.warning {
                output = output.with_warning(warning.clone());
            }
            if entries.is_empty() {
                if let Some(hint) = ctx.state.capture.settings().await.hint_for_empty("logs") {
                    output.payload["hint"] = json!(hint);
                }
            }
            output.payload = with_staleness(&ctx.state, output.payload).await;
            Ok(output)
        }

        "network" => {
            let page = ctx
                .state
                .capture
                .read_network_bodies_since(cursor, limit)
                .await;
            let mut noise_filtered = 0usize;
            let bodies: Vec<_> = page
                .items
                .iter()
                .filter(|body| {
                    if include_noise {
                        return true;
                    }
                    let noisy = ctx.state.noise.classify_network(body).is_some();
                    if noisy {
                        noise_filtered += 1;
                    }
                    !noisy
                })
                .collect();

            // Captured bodies can carry credentials; redact before they
            // reach the client and log where each pattern fired.
            let mut entries = json!(bodies);
            let redacted = redact_json(&mut entries, "entries");
            if !redacted.is_empty() {
                let now = chrono::Utc::now();
                ctx.state.audit.record_redactions(
                    redacted
                        .into_iter()
                        .map(|(field_path, pattern_name)| RedactionEvent {
                            timestamp: now,
                            session_id: ctx.session_id.clone(),
                            tool_name: "observe".to_string(),
                            field_path,
                            pattern_name: pattern_name.to_string(),
                        })
                        .collect(),
                );
            }

            let count = bodies.len();
            let mut payload = serde_json::Map::new();
            payload.insert("entries".to_string(), entries);
            payload.insert("count".to_string(), json!(count));
            payload.insert("noise_filtered".to_string(), json!(noise_filtered));
            cursor_fields(&page, cursor, &mut payload);

            let mut output = ToolOutput::new(
                summary_line("network exchange", "", "s", bodies.len()),
                Value::Object(payload),
            );
            if let Some(warning) = &page.warning {
                output = output.with_warning(warning.clone());
            }
            if bodies.is_empty() {
                if let Some(hint) = ctx.state.capture.settings().await.hint_for_empty("network") {
                    output.payload["hint"] = json!(hint);
                }
            }
            output.payload = with_staleness(&ctx.state, output.payload).await;
            Ok(output)
        }

        "websocket" => {
            let page = ctx.state.capture.read_websocket_since(cursor, limit).await;
            let events: Vec<_> = page
                .items
                .iter()
                .filter(|event| include_noise || ctx.state.noise.classify_websocket(event).is_none())
                .collect();

            let mut payload = serde_json::Map::new();
            payload.insert("events".to_string(), json!(events));
            payload.insert("count".to_string(), json!(events.len()));
            cursor_fields(&page, cursor, &mut payload);

            let mut output = ToolOutput::new(
                summary_line("WebSocket event", "", "s", events.len()),
                Value::Object(payload),
            );
            if let Some(warning) = &page.warning {
                output = output.with_warning(warning.clone());
            }
            if events.is_empty() {
                if let Some(hint) = ctx.state.capture.settings().await.hint_for_empty("websocket") {
                    output.payload["hint"] = json!(hint);
                }
            }
            output.payload = with_staleness(&ctx.state, output.payload).await;
            Ok(output)
        }

        "actions" => {
            let actions = ctx.state.capture.get_enhanced_actions().await;
            let tail: Vec<_> = actions.iter().rev().take(limit).rev().collect();
            let mut output = ToolOutput::new(
                summary_line("user action", "", "s", tail.len()),
                json!({ "actions": tail, "count": tail.len() }),
            );
            if tail.is_empty() {
                if let Some(hint) = ctx.state.capture.settings().await.hint_for_empty("actions") {
                    output.payload["hint"] = json!(hint);
                }
            }
            output.payload = with_staleness(&ctx.state, output.payload).await;
            Ok(output)
        }

        "performance" => {
            let snapshots = ctx.state.capture.get_performance_snapshots().await;
            let tail: Vec<_> = snapshots.iter().rev().take(limit).rev().collect();
            let payload = with_staleness(
                &ctx.state,
                json!({ "snapshots": tail, "count": tail.len() }),
            )
            .await;
            Ok(ToolOutput::new(
                summary_line("performance snapshot", "", "s", tail.len()),
                payload,
            ))
        }

        "extension_logs" => {
            let logs = ctx.state.capture.get_extension_logs().await;
            let tail: Vec<_> = logs.iter().rev().take(limit).rev().collect();
            let payload =
                with_staleness(&ctx.state, json!({ "entries": tail, "count": tail.len() })).await;
            Ok(ToolOutput::new(
                summary_line("extension log entr", "y", "ies", tail.len()),
                payload,
            ))
        }

        "audit" => {
            let query = AuditQuery {
                session_id: opt_str(args, "session_id").map(str::to_string),
                tool_name: opt_str(args, "tool_name").map(str::to_string),
                since: opt_str(args, "since").and_then(|s| s.parse().ok()),
                limit: Some(limit),
            };
            let entries = ctx.state.audit.query(&query);
            let payload = json!({
                "entries": entries,
                "count": entries.len(),
                "enabled": ctx.state.audit.is_enabled(),
            });
            Ok(ToolOutput::new(
                summary_line("audit entr", "y", "ies", entries.len()),
                with_staleness(&ctx.state, payload).await,
            ))
        }

        "pending_command" => {
            let correlation_id = require_str(args, "correlation_id")?;
            match ctx.state.pending.get(correlation_id).await {
                Some(snapshot) => {
                    let state = snapshot.state;
                    Ok(ToolOutput::new(
                        format!("Command {correlation_id} is {state:?}").to_lowercase(),
                        with_staleness(&ctx.state, json!({ "command": snapshot })).await,
                    ))
                }
                None => Err(ToolError::new(
                    ToolErrorCode::NoData,
                    format!("No command with correlation ID '{correlation_id}'"),
                    "Check the correlation_id from the interact call; evicted commands age out after their grace window.",
                )
                .with_param("correlation_id")),
            }
        }

        "noise_rules" => {
            let rules = ctx.state.noise.list_rules();
            let stats = ctx.state.noise.stats();
            Ok(ToolOutput::new(
                summary_line("noise rule", "", "s", rules.len()),
                json!({ "rules": rules, "stats": stats }),
            ))
        }

        "recording_state" => {
            let commands = ctx.state.pending.all().await;
            let state = resolve_recording_state(&commands);
            Ok(ToolOutput::new(
                format!("Recording is {}", state.as_str()),
                json!({ "state": state.as_str() }),
            ))
        }

        "health" => {
            let payload = health_payload(&ctx.state).await;
            Ok(ToolOutput::new("Daemon health", payload))
        }

        other => Err(ToolError::unknown_mode("what", other, WHAT_MODES)),
    }
}

fn summary_line(stem: &str, singular: &str, plural: &str, count: usize) -> String {
    if count == 0 {
        format!("No {stem}{plural} captured")
    } else if count == 1 {
        format!("1 {stem}{singular}")
    } else {
        format!("{count} {stem}{plural}")
    }
}
