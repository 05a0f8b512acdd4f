//! The five super-tools.
//!
//! Each tool dispatches on a `what`/`action` selector and works only
//! against the daemon's buffers and registries; the deep generators and
//! browser logic live in the extension and beyond this crate.

pub mod analyze;
pub mod configure;
pub mod generate;
pub mod interact;
pub mod observe;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use gasoline_protocol::{ToolError, ToolErrorCode};

use crate::state::AppState;

/// Context for one tool invocation.
pub struct ToolCtx {
    /// Shared daemon state.
    pub state: Arc<AppState>,
    /// Session the call arrived on; empty before `initialize`.
    pub session_id: String,
    /// Normalised client ID; empty in single-client fallback mode.
    pub client_id: String,
}

/// What a handler returns on success.
pub struct ToolOutput {
    /// One-line human summary.
    pub summary: String,
    /// Structured payload rendered beneath the summary.
    pub payload: Value,
    /// Warnings folded into the payload as `_warnings`.
    pub warnings: Vec<String>,
}

impl ToolOutput {
    /// Build an output.
    pub fn new(summary: impl Into<String>, payload: Value) -> Self {
        Self {
            summary: summary.into(),
            payload,
            warnings: Vec::new(),
        }
    }

    /// Append a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Result alias for handlers.
pub type ToolResult = Result<ToolOutput, ToolError>;

/// Route a call to its tool.
pub async fn dispatch(ctx: ToolCtx, tool: &str, args: Value) -> ToolResult {
    match tool {
        "observe" => observe::run(&ctx, &args).await,
        "analyze" => analyze::run(&ctx, &args).await,
        "generate" => generate::run(&ctx, &args).await,
        "interact" => interact::run(&ctx, &args).await,
        "configure" => configure::run(&ctx, &args).await,
        other => Err(ToolError::new(
            ToolErrorCode::UnknownMode,
            format!("Unknown tool '{other}'"),
            "Call tools/list for the available tools.",
        )),
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// A required string argument.
pub fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(_) => Err(ToolError::invalid_param(
            key,
            format!("Parameter '{key}' must be a non-empty string"),
        )),
        None => Err(ToolError::missing_param(key)),
    }
}

/// An optional string argument.
pub fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// An optional unsigned integer argument with a default.
pub fn opt_usize(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// An optional boolean argument with a default.
pub fn opt_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// Staleness metadata carried by every observe response.
pub async fn staleness_fields(state: &AppState) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        "retrieved_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    map.insert(
        "is_stale".to_string(),
        Value::Bool(!state.capture.is_extension_connected().await),
    );
    map.insert(
        "data_age_seconds".to_string(),
        match state.capture.data_age_seconds().await {
            Some(age) => Value::from(age),
            None => Value::Null,
        },
    );
    map
}

/// Merge staleness metadata into an object payload.
pub async fn with_staleness(state: &AppState, payload: Value) -> Value {
    match payload {
        Value::Object(mut map) => {
            map.extend(staleness_fields(state).await);
            Value::Object(map)
        }
        other => other,
    }
}
