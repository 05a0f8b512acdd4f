//! `generate` - deterministic export renderings of buffered telemetry.

use serde_json::{Value, json};

use gasoline_common::{SNIPPET_MAX_CHARS, snippet};
use gasoline_protocol::{ToolError, ToolErrorCode};

use super::{ToolCtx, ToolOutput, ToolResult, opt_usize, require_str};

const ACTIONS: &[&str] = &["har_export", "session_timeline"];

/// Run a generate call.
pub async fn run(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let action = require_str(args, "action")?;

    match action {
        "har_export" => har_export(ctx).await,
        "session_timeline" => session_timeline(ctx, opt_usize(args, "limit", 200)).await,
        other => Err(ToolError::unknown_mode("action", other, ACTIONS)),
    }
}

/// Join waterfall timings with captured bodies into a HAR-style log.
async fn har_export(ctx: &ToolCtx) -> ToolResult {
    let waterfall = ctx.state.capture.get_network_waterfall().await;
    let bodies = ctx.state.capture.get_network_bodies().await;

    if waterfall.is_empty() && bodies.is_empty() {
        return Err(ToolError::new(
            ToolErrorCode::NoData,
            "No network telemetry captured",
            "Load the tracked tab and retry once requests have been captured.",
        ));
    }

    let entries: Vec<Value> = bodies
        .iter()
        .map(|body| {
            let timing = waterfall.iter().find(|w| w.name == body.url);
            json!({
                "request": {
                    "method": body.method,
                    "url": body.url,
                    "bodySize": body.request_body.len(),
                },
                "response": {
                    "status": body.status,
                    "content": {
                        "mimeType": body.content_type,
                        "size": body.response_body.len(),
                    },
                },
                "startedDateTime": body.ts.to_rfc3339(),
                "timings": timing.map(|t| json!({
                    "fetchStart": t.fetch_start,
                    "responseEnd": t.response_end,
                    "wait": (t.response_end - t.fetch_start).max(0.0),
                })),
                "_transferSize": timing.map(|t| t.transfer_size),
                "_initiator": timing.map(|t| t.initiator.clone()),
            })
        })
        .collect();

    let payload = json!({
        "log": {
            "version": "1.2",
            "creator": { "name": "gasoline", "version": env!("CARGO_PKG_VERSION") },
            "entries": entries,
        }
    });
    Ok(ToolOutput::new(
        format!("HAR export with {} entries", bodies.len()),
        payload,
    ))
}

/// A merged, timestamp-ordered view across every buffer.
async fn session_timeline(ctx: &ToolCtx, limit: usize) -> ToolResult {
    let mut events: Vec<(chrono::DateTime<chrono::Utc>, Value)> = Vec::new();

    for entry in ctx.state.capture.get_console_entries().await {
        events.push((
            entry.ts,
            json!({
                "ts": entry.ts,
                "kind": "console",
                "detail": format!(
                    "[{}] {}",
                    entry.level,
                    snippet(&entry.message, SNIPPET_MAX_CHARS)
                ),
            }),
        ));
    }
    for body in ctx.state.capture.get_network_bodies().await {
        events.push((
            body.ts,
            json!({
                "ts": body.ts,
                "kind": "network",
                "detail": format!(
                    "{} {} -> {}",
                    body.method,
                    snippet(&body.url, SNIPPET_MAX_CHARS),
                    body.status
                ),
            }),
        ));
    }
    for event in ctx.state.capture.get_websocket_events().await {
        events.push((
            event.ts,
            json!({
                "ts": event.ts,
                "kind": "websocket",
                "detail": format!(
                    "{} {}",
                    event.event_type,
                    snippet(&event.url, SNIPPET_MAX_CHARS)
                ),
            }),
        ));
    }
    for action in ctx.state.capture.get_enhanced_actions().await {
        events.push((
            action.timestamp,
            json!({
                "ts": action.timestamp,
                "kind": "action",
                "detail": format!("{} ({})", action.action_type, action.source),
            }),
        ));
    }

    // Cross-buffer ordering comes from timestamps; within a buffer the
    // insertion order already matches.
    events.sort_by_key(|(ts, _)| *ts);
    let total = events.len();
    let timeline: Vec<Value> = events
        .into_iter()
        .rev()
        .take(limit)
        .rev()
        .map(|(_, v)| v)
        .collect();

    Ok(ToolOutput::new(
        format!("Timeline with {} of {total} events", timeline.len()),
        json!({ "timeline": timeline, "total": total }),
    ))
}
