//! Extension ingestion endpoints.
//!
//! The extension posts telemetry batches here and long-polls
//! `/next-command` for work. All bodies are JSON; malformed payloads get
//! structured errors rather than connection resets.

use std::collections::HashMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use gasoline_capture::{
    CaptureSettings, ConsoleEntry, EnhancedAction, ExtensionLog, NetworkBody,
    NetworkWaterfallEntry, PerformanceSnapshot, TrackedTab, WebSocketEvent,
};

use crate::ServerHandle;
use crate::error::{AppError, AppResult};

/// Count response for batch posts.
#[derive(Debug, Serialize)]
pub struct StoredResponse {
    /// Entries accepted into the buffer.
    pub stored: usize,
}

fn parse<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(AppError::Validation(rejection.body_text())),
    }
}

/// POST /logs - console entry batch.
pub async fn post_logs(
    State(handle): State<ServerHandle>,
    body: Result<Json<Vec<ConsoleEntry>>, JsonRejection>,
) -> AppResult<Json<StoredResponse>> {
    let entries = parse(body)?;
    if let Some(mirror) = &handle.state.log_mirror {
        mirror.append(&entries);
    }
    let stored = handle.state.capture.add_console_entries(entries).await;
    Ok(Json(StoredResponse { stored }))
}

/// POST /network - network body batch.
pub async fn post_network(
    State(handle): State<ServerHandle>,
    body: Result<Json<Vec<NetworkBody>>, JsonRejection>,
) -> AppResult<Json<StoredResponse>> {
    let bodies = parse(body)?;
    let stored = bodies.len();
    handle.state.capture.add_network_bodies(bodies).await;
    Ok(Json(StoredResponse { stored }))
}

/// POST /network-waterfall - timing entries with a trailing page URL
/// element, the shape the extension's PerformanceObserver emits.
pub async fn post_network_waterfall(
    State(handle): State<ServerHandle>,
    body: Result<Json<Vec<Value>>, JsonRejection>,
) -> AppResult<Json<StoredResponse>> {
    let mut items = parse(body)?;

    let page_url = match items.last() {
        Some(Value::String(url)) => {
            let url = url.clone();
            items.pop();
            url
        }
        _ => String::new(),
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let mut entry: NetworkWaterfallEntry = serde_json::from_value(item)
            .map_err(|e| AppError::Validation(format!("waterfall entry: {e}")))?;
        if entry.page_url.is_empty() {
            entry.page_url = page_url.clone();
        }
        entries.push(entry);
    }

    let stored = entries.len();
    handle
        .state
        .capture
        .add_network_waterfall_entries(entries)
        .await;
    Ok(Json(StoredResponse { stored }))
}

/// POST /websocket-events - WebSocket event batch.
pub async fn post_websocket_events(
    State(handle): State<ServerHandle>,
    body: Result<Json<Vec<WebSocketEvent>>, JsonRejection>,
) -> AppResult<Json<StoredResponse>> {
    let events = parse(body)?;
    let stored = events.len();
    handle.state.capture.add_websocket_events(events).await;
    Ok(Json(StoredResponse { stored }))
}

/// POST /actions - user action batch.
pub async fn post_actions(
    State(handle): State<ServerHandle>,
    body: Result<Json<Vec<EnhancedAction>>, JsonRejection>,
) -> AppResult<Json<StoredResponse>> {
    let actions = parse(body)?;
    let stored = actions.len();
    handle.state.capture.add_enhanced_actions(actions).await;
    Ok(Json(StoredResponse { stored }))
}

/// POST /performance - one performance snapshot.
pub async fn post_performance(
    State(handle): State<ServerHandle>,
    body: Result<Json<PerformanceSnapshot>, JsonRejection>,
) -> AppResult<Json<StoredResponse>> {
    let snapshot = parse(body)?;
    handle.state.capture.track_performance_snapshot(snapshot).await;
    Ok(Json(StoredResponse { stored: 1 }))
}

/// POST /extension-logs - extension debug log batch.
pub async fn post_extension_logs(
    State(handle): State<ServerHandle>,
    body: Result<Json<Vec<ExtensionLog>>, JsonRejection>,
) -> AppResult<Json<StoredResponse>> {
    let logs = parse(body)?;
    let stored = logs.len();
    handle.state.capture.add_extension_logs(logs).await;
    Ok(Json(StoredResponse { stored }))
}

/// Tracked-tab fields inside a sync post.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTab {
    /// Browser tab ID.
    pub id: i64,
    /// Current page URL.
    pub url: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
}

/// POST /sync body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Tracked tab, when one is active.
    #[serde(default)]
    pub tab: Option<SyncTab>,
    /// Capture settings as the extension sees them.
    #[serde(default)]
    pub settings: Option<CaptureSettings>,
}

/// POST /sync - tracked-tab state plus the connectivity heartbeat.
pub async fn post_sync(
    State(handle): State<ServerHandle>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let request = parse(body)?;
    let tab = request.tab.map(|t| TrackedTab {
        id: t.id,
        url: t.url,
        title: t.title,
        updated_at: Utc::now(),
    });
    handle.state.capture.record_sync(tab, request.settings).await;

    let settings = handle.state.capture.settings().await;
    Ok(Json(json!({ "connected": true, "settings": settings })))
}

/// POST /command-result body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultRequest {
    /// Correlation ID the result answers.
    pub correlation_id: String,
    /// Terminal status reported by the extension.
    pub status: String,
    /// Opaque result payload.
    #[serde(default)]
    pub result: Value,
}

/// POST /command-result - the extension posts a command's outcome.
pub async fn post_command_result(
    State(handle): State<ServerHandle>,
    body: Result<Json<CommandResultRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let request = parse(body)?;
    match handle
        .state
        .pending
        .post_result(&request.correlation_id, &request.status, request.result)
        .await
    {
        Ok(()) => Ok(Json(json!({ "accepted": true }))),
        Err(e) => {
            // Late or unknown results are dropped, not fatal: the command
            // may have timed out and been evicted already.
            warn!(correlation_id = %request.correlation_id, error = %e, "command result dropped");
            Ok(Json(json!({ "accepted": false, "reason": e.to_string() })))
        }
    }
}

/// GET /next-command - the long poll delivering queued commands.
pub async fn next_command(
    State(handle): State<ServerHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let tab_id = params.get("tab_id").and_then(|t| t.parse().ok());
    let wait = handle.state.config.long_poll_duration();

    match handle.state.pending.next_for_extension(tab_id, wait).await {
        Some(command) => {
            debug!(correlation_id = %command.correlation_id, "command delivered to extension");
            Json(json!({ "command": command }))
        }
        None => Json(json!({})),
    }
}
