//! Structured tool-level errors.
//!
//! Tool failures are delivered inside a successful JSON-RPC response with
//! `isError: true`. The text block is `"Error: <code> — <retry>"` followed
//! by the serialized error object, so an LLM client can recover without a
//! lookup table.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::CallToolResult;

/// Fixed set of tool error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Error)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorCode {
    // Input family: retryable after the caller fixes the request.
    /// Request body was not valid JSON.
    #[error("invalid_json")]
    InvalidJson,
    /// A required parameter was absent.
    #[error("missing_param")]
    MissingParam,
    /// A parameter had an unusable value.
    #[error("invalid_param")]
    InvalidParam,
    /// The `what`/`action` selector named no known mode.
    #[error("unknown_mode")]
    UnknownMode,
    /// A filesystem path fell outside the allowed roots.
    #[error("path_not_allowed")]
    PathNotAllowed,

    // State family: retryable after a state change.
    /// The client has not called `initialize` yet.
    #[error("not_initialized")]
    NotInitialized,
    /// No captured data matched the request.
    #[error("no_data")]
    NoData,
    /// The requested capability is disabled by configuration.
    #[error("pilot_disabled")]
    PilotDisabled,
    /// Per-client rate limit exhausted.
    #[error("rate_limited")]
    RateLimited,
    /// The pagination cursor aged out of the ring.
    #[error("cursor_expired")]
    CursorExpired,

    // Comms family: retryable with back-off.
    /// The extension did not answer before the deadline.
    #[error("extension_timeout")]
    ExtensionTimeout,
    /// The extension reported a failure executing the command.
    #[error("extension_error")]
    ExtensionError,

    // Fatal family.
    /// Unexpected failure inside a handler.
    #[error("internal_error")]
    InternalError,
    /// Response serialization failed.
    #[error("marshal_failed")]
    MarshalFailed,
    /// Export rendering failed.
    #[error("export_failed")]
    ExportFailed,
}

impl ToolErrorCode {
    /// The snake_case wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::MissingParam => "missing_param",
            Self::InvalidParam => "invalid_param",
            Self::UnknownMode => "unknown_mode",
            Self::PathNotAllowed => "path_not_allowed",
            Self::NotInitialized => "not_initialized",
            Self::NoData => "no_data",
            Self::PilotDisabled => "pilot_disabled",
            Self::RateLimited => "rate_limited",
            Self::CursorExpired => "cursor_expired",
            Self::ExtensionTimeout => "extension_timeout",
            Self::ExtensionError => "extension_error",
            Self::InternalError => "internal_error",
            Self::MarshalFailed => "marshal_failed",
            Self::ExportFailed => "export_failed",
        }
    }

    /// Whether a retry can ever succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InternalError | Self::MarshalFailed | Self::ExportFailed
        )
    }
}

/// Structured tool error delivered to MCP clients.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolError {
    /// Error code.
    pub error: ToolErrorCode,
    /// Human-readable message.
    pub message: String,
    /// One-sentence instruction for recovering.
    pub retry: String,
    /// Offending parameter, when one is identifiable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Extra guidance (e.g. the exact configure call that would help).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ToolError {
    /// Create a new tool error.
    pub fn new(
        error: ToolErrorCode,
        message: impl Into<String>,
        retry: impl Into<String>,
    ) -> Self {
        Self {
            error,
            message: message.into(),
            retry: retry.into(),
            param: None,
            hint: None,
        }
    }

    /// Name the offending parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    /// Attach extra guidance.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// A missing-parameter error with a canned retry line.
    pub fn missing_param(param: &str) -> Self {
        Self::new(
            ToolErrorCode::MissingParam,
            format!("Required parameter '{param}' is missing"),
            format!("Retry with the '{param}' parameter set."),
        )
        .with_param(param)
    }

    /// An invalid-parameter error naming the parameter.
    pub fn invalid_param(param: &str, message: impl Into<String>) -> Self {
        Self::new(
            ToolErrorCode::InvalidParam,
            message,
            format!("Retry with a valid value for '{param}'."),
        )
        .with_param(param)
    }

    /// An unknown-mode error listing the accepted values.
    pub fn unknown_mode(param: &str, got: &str, accepted: &[&str]) -> Self {
        Self::new(
            ToolErrorCode::UnknownMode,
            format!("Unknown {param} '{got}'"),
            format!("Retry with {param} set to one of: {}.", accepted.join(", ")),
        )
        .with_param(param)
    }

    /// Render the full text block for the MCP content body.
    pub fn render(&self) -> String {
        let json = serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", self.error.as_str()));
        format!("Error: {} — {}\n{json}", self.error.as_str(), self.retry)
    }

    /// Convert into a `CallToolResult` with `isError` set.
    pub fn into_result(self) -> CallToolResult {
        CallToolResult::error(self.render())
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error.as_str(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ToolErrorCode::RateLimited.as_str(), "rate_limited");
        assert_eq!(ToolErrorCode::ExtensionTimeout.as_str(), "extension_timeout");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ToolErrorCode::RateLimited.is_retryable());
        assert!(ToolErrorCode::CursorExpired.is_retryable());
        assert!(!ToolErrorCode::InternalError.is_retryable());
        assert!(!ToolErrorCode::MarshalFailed.is_retryable());
    }

    #[test]
    fn test_render_shape() {
        let err = ToolError::missing_param("what");
        let text = err.render();
        assert!(text.starts_with("Error: missing_param — "));
        assert!(text.contains("\"param\": \"what\""));
    }

    #[test]
    fn test_into_result_sets_is_error() {
        let result = ToolError::new(
            ToolErrorCode::NoData,
            "No console entries captured",
            "Open the tracked tab and interact with the page first.",
        )
        .into_result();
        assert!(result.is_error());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ToolErrorCode::PathNotAllowed).unwrap();
        assert_eq!(json, "\"path_not_allowed\"");
    }
}
