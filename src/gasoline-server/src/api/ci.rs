//! CI endpoints: aggregated snapshot, clear, and test boundaries.

use std::collections::HashMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use gasoline_capture::StoreSnapshot;

use crate::ServerHandle;
use crate::error::{AppError, AppResult};

/// GET /snapshot?since=&test_id= - aggregated state for CI assertions.
pub async fn get_snapshot(
    State(handle): State<ServerHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<StoreSnapshot>> {
    let since = match params.get("since") {
        Some(raw) if !raw.is_empty() => Some(
            raw.parse::<DateTime<Utc>>()
                .map_err(|e| AppError::BadRequest(format!("since: {e}")))?,
        ),
        _ => None,
    };
    let test_id = params.get("test_id").cloned();

    let snapshot = handle.state.capture.snapshot_aggregate(since, test_id).await;
    Ok(Json(snapshot))
}

/// POST|DELETE /clear - atomically clear every buffer and cancel
/// pending commands. Returns the prior entry count.
pub async fn clear_all(State(handle): State<ServerHandle>) -> Json<Value> {
    let cleared = handle.state.capture.clear_all().await;
    let cancelled = handle.state.pending.clear().await;
    info!(cleared, cancelled, "buffers cleared");
    Json(json!({ "cleared": cleared, "cancelled_commands": cancelled }))
}

/// POST /test-boundary body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBoundaryRequest {
    /// Test identifier.
    pub test_id: String,
    /// `start` or `end`.
    pub action: String,
}

/// POST /test-boundary - mark a test's start or end.
pub async fn post_test_boundary(
    State(handle): State<ServerHandle>,
    body: Result<Json<TestBoundaryRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let request = match body {
        Ok(Json(value)) => value,
        Err(rejection) => return Err(AppError::Validation(rejection.body_text())),
    };
    if request.test_id.trim().is_empty() {
        return Err(AppError::BadRequest("test_id must not be empty".to_string()));
    }

    match request.action.as_str() {
        "start" => {
            handle
                .state
                .capture
                .set_test_boundary_start(&request.test_id)
                .await
        }
        "end" => {
            handle
                .state
                .capture
                .set_test_boundary_end(&request.test_id)
                .await
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "action must be 'start' or 'end', got '{other}'"
            )));
        }
    }

    let active = handle.state.capture.active_test_boundaries().await;
    Ok(Json(json!({ "test_id": request.test_id, "active": active })))
}
