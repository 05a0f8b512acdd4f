//! Pending-command registry.
//!
//! The extension cannot expose a synchronous API, so every tool that
//! needs the browser to do something enqueues a command here and awaits
//! its result. Commands are keyed by correlation ID, carry per-entry
//! timeouts, and stay queryable in their terminal state for a grace
//! window so late pollers see `timeout` rather than `not-found`.

pub mod recording;
pub mod registry;

pub use recording::{RecordingState, resolve_recording_state, stop_rejection};
pub use registry::{
    CommandSnapshot, CommandState, DeliveredCommand, PendingError, PendingQuery, PendingRegistry,
    DEFAULT_TIMEOUT, RECORD_START_TIMEOUT, RECORD_STOP_TIMEOUT, TERMINAL_GRACE,
};
