//! `interact` - drive the tracked browser tab via pending commands.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;

use gasoline_pending::{
    CommandSnapshot, CommandState, DEFAULT_TIMEOUT, RECORD_START_TIMEOUT, RECORD_STOP_TIMEOUT,
    RecordingState, resolve_recording_state, stop_rejection,
};
use gasoline_protocol::{ToolError, ToolErrorCode};

use crate::recordings::RecordingMeta;

use super::{ToolCtx, ToolOutput, ToolResult, opt_str, require_str};

const ACTIONS: &[&str] = &[
    "execute_script",
    "query_dom",
    "click",
    "type",
    "navigate",
    "screenshot",
    "list_interactive",
    "record_start",
    "record_stop",
    "clear_pending",
];

/// Run an interact call.
pub async fn run(ctx: &ToolCtx, args: &Value) -> ToolResult {
    let action = require_str(args, "action")?;

    match action {
        "execute_script" => {
            let code = require_str(args, "code")?;
            let snapshot =
                run_command(ctx, "execute_script", json!({ "code": code }), DEFAULT_TIMEOUT)
                    .await?;
            Ok(command_output("Script executed", snapshot))
        }

        "query_dom" => {
            let selector = require_str(args, "selector")?;
            let snapshot = run_command(
                ctx,
                "query_dom",
                json!({ "selector": selector }),
                DEFAULT_TIMEOUT,
            )
            .await?;
            Ok(command_output("DOM queried", snapshot))
        }

        "click" => {
            let selector = resolve_target(ctx, args)?;
            let snapshot =
                run_command(ctx, "click", json!({ "selector": selector }), DEFAULT_TIMEOUT).await?;
            Ok(command_output(&format!("Clicked {selector}"), snapshot))
        }

        "type" => {
            let selector = resolve_target(ctx, args)?;
            let text = require_str(args, "text")?;
            let snapshot = run_command(
                ctx,
                "type",
                json!({ "selector": selector, "text": text }),
                DEFAULT_TIMEOUT,
            )
            .await?;
            Ok(command_output(&format!("Typed into {selector}"), snapshot))
        }

        "navigate" => {
            let url = require_str(args, "url")?;
            let snapshot =
                run_command(ctx, "navigate", json!({ "url": url }), DEFAULT_TIMEOUT).await?;
            Ok(command_output(&format!("Navigated to {url}"), snapshot))
        }

        "screenshot" => {
            let snapshot = run_command(ctx, "screenshot", json!({}), DEFAULT_TIMEOUT).await?;
            let mut payload = snapshot.result.clone().unwrap_or_else(|| json!({}));

            // Persist the image instead of echoing megabytes of base64.
            if let Some(data) = payload.get("data").and_then(|d| d.as_str()) {
                if let Some(store) = &ctx.state.recordings {
                    match store.save_screenshot(data, "screenshot") {
                        Ok(path) => {
                            payload["path"] = json!(path.display().to_string());
                            if let Value::Object(map) = &mut payload {
                                map.remove("data");
                            }
                        }
                        Err(e) => {
                            payload["save_error"] = json!(e.to_string());
                        }
                    }
                }
            }
            Ok(ToolOutput::new(
                "Screenshot captured",
                json!({ "correlation_id": snapshot.query.correlation_id, "result": payload }),
            ))
        }

        "list_interactive" => {
            let snapshot =
                run_command(ctx, "list_interactive", json!({}), DEFAULT_TIMEOUT).await?;
            let elements = snapshot
                .result
                .as_ref()
                .and_then(|r| r.get("elements"))
                .and_then(|e| e.as_array())
                .cloned()
                .unwrap_or_default();

            // Rebuild this client's index map only; other clients keep
            // theirs, and a failed call never clears anything.
            let mut map = HashMap::new();
            for element in &elements {
                if let (Some(index), Some(selector)) = (
                    element.get("index").and_then(|i| i.as_u64()),
                    element.get("selector").and_then(|s| s.as_str()),
                ) {
                    map.insert(index as u32, selector.to_string());
                }
            }
            ctx.state.elements.replace_for_client(&ctx.client_id, map);

            Ok(ToolOutput::new(
                format!("{} interactive elements indexed", elements.len()),
                json!({ "elements": elements, "count": elements.len() }),
            ))
        }

        "record_start" => {
            let snapshot = run_command(ctx, "record_start", json!({}), RECORD_START_TIMEOUT).await?;
            Ok(command_output("Recording requested", snapshot))
        }

        "record_stop" => record_stop(ctx).await,

        "clear_pending" => {
            let cancelled = ctx.state.pending.clear().await;
            Ok(ToolOutput::new(
                format!("{cancelled} pending commands cancelled"),
                json!({ "cancelled": cancelled }),
            ))
        }

        other => Err(ToolError::unknown_mode("action", other, ACTIONS)),
    }
}

/// Resolve `selector` or an element `index` shortcut into a selector.
fn resolve_target(ctx: &ToolCtx, args: &Value) -> Result<String, ToolError> {
    if let Some(selector) = opt_str(args, "selector") {
        return Ok(selector.to_string());
    }
    if let Some(index) = args.get("index").and_then(|i| i.as_u64()) {
        return ctx
            .state
            .elements
            .resolve(&ctx.client_id, index as u32)
            .ok_or_else(|| {
                ToolError::invalid_param(
                    "index",
                    format!("No element with index {index} in this client's map"),
                )
                .with_hint("interact(action=list_interactive) rebuilds the element index map")
            });
    }
    Err(ToolError::missing_param("selector"))
}

/// Enqueue one command and block on its result.
async fn run_command(
    ctx: &ToolCtx,
    query_type: &str,
    params: Value,
    timeout: Duration,
) -> Result<CommandSnapshot, ToolError> {
    if !ctx.state.capture.is_extension_connected().await {
        return Err(ToolError::new(
            ToolErrorCode::ExtensionTimeout,
            "Browser extension is not connected",
            "Confirm the extension is running and its /sync heartbeats arrive, then retry.",
        ));
    }

    let correlation_id = ctx
        .state
        .pending
        .create(query_type, params, None, timeout, &ctx.client_id)
        .await;

    let deadline = Instant::now() + timeout;
    let (snapshot, found) = ctx.state.pending.wait_for(&correlation_id, deadline).await;

    let Some(snapshot) = snapshot else {
        debug_assert!(!found);
        return Err(ToolError::new(
            ToolErrorCode::InternalError,
            "Command vanished from the registry",
            "Retry the call.",
        ));
    };

    match snapshot.state {
        CommandState::Complete => Ok(snapshot),
        CommandState::Error => {
            let message = snapshot
                .result
                .as_ref()
                .and_then(|r| r.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("extension reported an error");
            Err(ToolError::new(
                ToolErrorCode::ExtensionError,
                format!("Extension failed to execute {query_type}: {message}"),
                "Retry; if it keeps failing, reload the tracked tab.",
            ))
        }
        CommandState::Cancelled => Err(ToolError::new(
            ToolErrorCode::ExtensionError,
            format!("Command {correlation_id} was cancelled"),
            "Re-issue the command.",
        )),
        // Pending at our deadline, or the registry's own timeout fired.
        _ => Err(ToolError::new(
            ToolErrorCode::ExtensionTimeout,
            format!("Extension did not answer {query_type} in time"),
            "Retry with back-off; the browser may be busy.",
        )
        .with_hint(format!(
            "observe(what=pending_command, correlation_id={correlation_id}) stays available for the grace window"
        ))),
    }
}

async fn record_stop(ctx: &ToolCtx) -> ToolResult {
    let commands = ctx.state.pending.all().await;
    let state = resolve_recording_state(&commands);
    if state != RecordingState::Recording {
        return Err(ToolError::new(
            ToolErrorCode::InvalidParam,
            "No recording to stop",
            stop_rejection(state),
        )
        .with_param("action"));
    }

    let snapshot = run_command(ctx, "record_stop", json!({}), RECORD_STOP_TIMEOUT).await?;
    let mut payload = snapshot.result.clone().unwrap_or_else(|| json!({}));

    // Persist the media and sidecar when the extension shipped them.
    if let (Some(data), Some(store)) = (
        payload.get("data").and_then(|d| d.as_str()),
        &ctx.state.recordings,
    ) {
        let meta: RecordingMeta = serde_json::from_value(
            payload.get("metadata").cloned().unwrap_or_else(|| json!({})),
        )
        .unwrap_or_else(|_| RecordingMeta {
            name: String::new(),
            display_name: "recording".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            duration_seconds: 0.0,
            size_bytes: 0,
            url: String::new(),
            tab_id: 0,
            resolution: String::new(),
            format: "webm".to_string(),
            fps: 0,
            has_audio: false,
            audio_mode: "none".to_string(),
            truncated: false,
        });

        match store.save_recording(data, meta) {
            Ok(path) => {
                payload["path"] = json!(path.display().to_string());
                if let Value::Object(map) = &mut payload {
                    map.remove("data");
                }
            }
            Err(e) => payload["save_error"] = json!(e.to_string()),
        }
    }

    Ok(ToolOutput::new(
        "Recording stopped",
        json!({ "correlation_id": snapshot.query.correlation_id, "result": payload }),
    ))
}

fn command_output(summary: &str, snapshot: CommandSnapshot) -> ToolOutput {
    ToolOutput::new(
        summary,
        json!({
            "correlation_id": snapshot.query.correlation_id,
            "result": snapshot.result,
        }),
    )
}
