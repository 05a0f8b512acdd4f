//! Gasoline Protocol - wire type definitions.
//!
//! This crate provides the type definitions for Gasoline's two protocols:
//! - JSON-RPC 2.0 request/response framing for MCP clients
//! - The MCP initialize / tools surface (five super-tools)
//! - The structured tool-level error shape that lets an LLM act on a
//!   failure without lookup tables
//!
//! # Example
//! ```rust
//! use gasoline_protocol::{Tool, ToolInputSchema, PropertySchema};
//!
//! let tool = Tool::new("observe", "Read captured browser telemetry")
//!     .with_schema(ToolInputSchema::object()
//!         .property("what", PropertySchema::string().description("Telemetry kind"))
//!         .required(vec!["what"]));
//! ```

mod content;
mod error;
mod initialization;
mod jsonrpc;
mod tools;

/// MCP method name constants.
pub mod methods;

/// Current MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// JSON-RPC types
pub use jsonrpc::{
    ErrorCode, JSONRPC_VERSION, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};

// Initialization types
pub use initialization::{
    Implementation, InitializeParams, InitializeResult, ServerCapabilities, ToolsCapability,
};

// Tool types
pub use tools::{
    CallToolParams, CallToolResult, ListToolsResult, PropertySchema, Tool, ToolInputSchema,
};

// Content types
pub use content::Content;

// Structured tool errors
pub use error::{ToolError, ToolErrorCode};
