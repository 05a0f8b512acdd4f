//! Health and liveness reporting.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::ServerHandle;
use crate::metrics::resident_memory_bytes;
use crate::state::AppState;

/// Build the full health payload; shared with `observe(what=health)`.
pub async fn health_payload(state: &AppState) -> Value {
    json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.metrics.uptime_seconds(),
        "extension_connected": state.capture.is_extension_connected().await,
        "tools": state.metrics.per_tool(),
        "memory": { "rss_bytes": resident_memory_bytes() },
        "buffers": state.capture.buffer_stats().await,
        "rate_limit": state.rate_limiter.state(),
        "pending_commands": state.pending.len().await,
        "available_version": state.updates.available_version(),
    })
}

/// GET /health - liveness plus utilisation counters.
pub async fn health_check(State(handle): State<ServerHandle>) -> Json<Value> {
    Json(health_payload(&handle.state).await)
}
