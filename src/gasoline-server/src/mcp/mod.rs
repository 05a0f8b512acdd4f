//! MCP dispatcher.
//!
//! Routes JSON-RPC requests from one client connection: `initialize`
//! mints a session and records client identity, `tools/list` serves the
//! static five-tool catalogue, and `tools/call` rate-limits, dispatches,
//! audits, and renders every tool invocation. Handler panics are isolated
//! on their own task and surface as `internal_error`.

pub mod tools;

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use gasoline_audit::ToolCallRecord;
use gasoline_protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    PropertySchema, ServerCapabilities, Tool, ToolError, ToolErrorCode, ToolInputSchema, methods,
};

use crate::state::AppState;
use self::tools::{ToolCtx, ToolOutput};

/// Per-connection MCP dispatcher.
pub struct McpDispatcher {
    state: Arc<AppState>,
    session: RwLock<Option<String>>,
}

impl McpDispatcher {
    /// Create a dispatcher bound to the daemon state.
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            session: RwLock::new(None),
        }
    }

    /// The static five-tool catalogue.
    pub fn catalogue() -> Vec<Tool> {
        let selector = |name: &str, values: &[&str]| {
            ToolInputSchema::object()
                .property(
                    name,
                    PropertySchema::string()
                        .description("Dispatch selector")
                        .enum_values(values.to_vec()),
                )
                .required(vec![name])
        };

        vec![
            Tool::new("observe", "Read captured browser telemetry").with_schema(selector(
                "what",
                &[
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
                ],
            )),
            Tool::new("analyze", "Summarise and correlate captured telemetry").with_schema(
                selector(
                    "action",
                    &[
                        "session_summary",
                        "pr_summary",
                        "one_liner",
                        "verification_status",
                        "audit_query",
                        "noise_proposals",
                    ],
                ),
            ),
            Tool::new("generate", "Render captured telemetry into export formats").with_schema(
                selector("action", &["har_export", "session_timeline"]),
            ),
            Tool::new("interact", "Drive the tracked browser tab").with_schema(selector(
                "action",
                &[
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
                ],
            )),
            Tool::new("configure", "Change capture, noise, audit, and verification settings")
                .with_schema(selector(
                    "action",
                    &[
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
                    ],
                )),
        ]
    }

    /// Handle one newline-delimited stdio line. Returns the serialized
    /// response for requests, `None` for notifications and blank lines.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(request) = serde_json::from_str::<JsonRpcRequest>(trimmed) {
            let response = self.handle_request(request).await;
            return serde_json::to_string(&response).ok();
        }
        if let Ok(notification) = serde_json::from_str::<JsonRpcNotification>(trimmed) {
            self.handle_notification(notification).await;
            return None;
        }
        warn!(line = %trimmed, "invalid JSON-RPC message");
        let response = JsonRpcResponse::error(0i64, JsonRpcError::parse_error("Invalid JSON"));
        serde_json::to_string(&response).ok()
    }

    /// Handle a JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %request.method, id = %request.id, "handling request");

        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.params).await,
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => {
                serde_json::to_value(ListToolsResult::new(Self::catalogue()))
                    .map_err(|e| JsonRpcError::internal_error(e.to_string()))
            }
            methods::TOOLS_CALL => self.handle_tools_call(request.params).await,
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        }
    }

    /// Handle a JSON-RPC notification.
    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::INITIALIZED => debug!("client reported initialized"),
            methods::CANCELLED => debug!("client cancelled a request"),
            other => warn!(method = %other, "unknown notification"),
        }
    }

    /// Tear down the session on connection close.
    pub async fn disconnect(&self) {
        let session_id = self.session.write().await.take();
        if let Some(session_id) = session_id {
            if let Some(info) = self.state.sessions.remove_session(&session_id) {
                self.state.drop_client_state(&info.client_id);
                info!(client = %info.client_id, "client disconnected");
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let init_params: InitializeParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?
            .unwrap_or_default();

        let session_id = self.state.sessions.create_session(
            &init_params.client_info.name,
            &init_params.client_info.version,
        );
        *self.session.write().await = Some(session_id.clone());

        // First-snapshot maps are per client session.
        self.state.capture.reset_session_snapshots().await;

        info!(
            client = %init_params.client_info.name,
            version = %init_params.client_info.version,
            session = %session_id,
            "client connected"
        );

        let mut result = InitializeResult::new(
            Implementation::new("gasoline", env!("CARGO_PKG_VERSION")),
            session_id,
        );
        result.capabilities = ServerCapabilities::with_tools();

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let call_params: CallToolParams = serde_json::from_value(
            params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?,
        )
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?;

        let tool_name = call_params.name.clone();
        let known_tool = Self::catalogue().iter().any(|t| t.name == tool_name);
        if !known_tool {
            return Err(JsonRpcError::invalid_params(format!(
                "Unknown tool: {tool_name}"
            )));
        }

        let session_id = self.session.read().await.clone().unwrap_or_default();
        let client_id = self.state.sessions.client_for(&session_id);
        let args = call_params.arguments.unwrap_or(json!({}));

        // Rate limit before any work happens.
        if let Err(backoff) = self.state.rate_limiter.check(&client_id) {
            let error = ToolError::new(
                ToolErrorCode::RateLimited,
                "Tool-call rate limit exceeded",
                format!(
                    "Wait {:.1}s before the next call, then retry.",
                    backoff.as_secs_f64()
                ),
            );
            self.state.metrics.record_tool_call(&tool_name, false);
            return serde_json::to_value(error.into_result())
                .map_err(|e| JsonRpcError::internal_error(e.to_string()));
        }

        let started = Instant::now();
        let ctx = ToolCtx {
            state: Arc::clone(&self.state),
            session_id: session_id.clone(),
            client_id: client_id.clone(),
        };

        // Run on a separate task so a panicking handler is recovered at
        // this boundary instead of tearing down the connection.
        let task_args = args.clone();
        let task_name = tool_name.clone();
        let outcome = tokio::spawn(async move { tools::dispatch(ctx, &task_name, task_args).await })
            .await;

        let tool_result = match outcome {
            Ok(result) => result,
            Err(join_error) => {
                warn!(tool = %tool_name, error = %join_error, "tool handler panicked");
                Err(ToolError::new(
                    ToolErrorCode::InternalError,
                    "Tool handler failed unexpectedly",
                    "Retry the call; report the daemon logs if it keeps failing.",
                ))
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let success = tool_result.is_ok();
        let error_message = tool_result.as_ref().err().map(|e| e.to_string());

        let call_result = match tool_result {
            Ok(output) => self.render_success(output),
            Err(error) => error.into_result(),
        };

        let response_size = call_result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.len())
            .unwrap_or(0);

        self.state.metrics.record_tool_call(&tool_name, success);
        self.state.sessions.record_tool_call(&session_id);
        self.state.audit.record(ToolCallRecord {
            session_id,
            client_id,
            tool_name,
            parameters: serde_json::to_string(&args).unwrap_or_default(),
            response_size,
            duration_ms,
            success,
            error_message,
        });

        serde_json::to_value(call_result).map_err(|e| {
            JsonRpcError::internal_error(format!(
                "{}: {e}",
                ToolErrorCode::MarshalFailed.as_str()
            ))
        })
    }

    /// Render a successful tool output: optional update notice, summary
    /// line, then the pretty JSON payload (with `_warnings` folded in).
    fn render_success(&self, output: ToolOutput) -> CallToolResult {
        let ToolOutput {
            summary,
            mut payload,
            warnings,
        } = output;

        if !warnings.is_empty() {
            if let Value::Object(map) = &mut payload {
                map.insert("_warnings".to_string(), json!(warnings));
            }
        }

        let notice = self.state.updates.take_update_notice().unwrap_or_default();
        let json = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string());
        CallToolResult::text(format!("{notice}{summary}\n{json}"))
    }
}
