//! Audit trail and secret redaction.
//!
//! Every tool call is recorded in a bounded FIFO with the calling
//! client's identity and session. Parameters pass through the redaction
//! engine first, so bearer tokens, JWTs, and API keys never reach the
//! trail; redaction events record the pattern name and field path only,
//! never the content.

pub mod redact;
pub mod session;
pub mod trail;

pub use redact::{RedactionEvent, redact_json, redact_text};
pub use session::{SessionInfo, SessionRegistry, identify_client, new_session_id};
pub use trail::{AuditEntry, AuditQuery, AuditTrail, ToolCallRecord};
