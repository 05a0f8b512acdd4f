//! Recording lifecycle resolution.
//!
//! Screen recording is a second state machine layered over the command
//! registry: `idle -> awaiting_user_gesture -> recording -> stopping ->
//! idle`. The resolver derives the current state from the record_start /
//! record_stop commands and their lifecycle statuses each time it is
//! consulted; nothing stores the state separately.

use serde::Serialize;

use crate::registry::{CommandSnapshot, CommandState};

/// Where the recording lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// No recording in progress.
    Idle,
    /// record_start delivered; waiting for the user to pick a surface.
    AwaitingUserGesture,
    /// Capture is running.
    Recording,
    /// record_stop delivered; encoder finishing.
    Stopping,
}

impl RecordingState {
    /// The wire string for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingUserGesture => "awaiting_user_gesture",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
        }
    }
}

/// Lifecycle status carried inside a command result payload.
fn lifecycle_status(snapshot: &CommandSnapshot) -> Option<&str> {
    snapshot
        .result
        .as_ref()
        .and_then(|r| r.get("status"))
        .and_then(|s| s.as_str())
}

/// Derive the recording state from the registry's record_* commands,
/// which must be supplied in enqueue order.
pub fn resolve_recording_state(commands: &[CommandSnapshot]) -> RecordingState {
    let mut state = RecordingState::Idle;

    for snapshot in commands {
        match snapshot.query.query_type.as_str() {
            "record_start" => {
                state = match snapshot.state {
                    CommandState::Pending => RecordingState::AwaitingUserGesture,
                    CommandState::Complete => match lifecycle_status(snapshot) {
                        Some("recording") => RecordingState::Recording,
                        // saved/error or anything else means the attempt
                        // ended without a live capture.
                        _ => RecordingState::Idle,
                    },
                    // Timed out, cancelled, errored, or evicted: no capture.
                    _ => RecordingState::Idle,
                };
            }
            "record_stop" => {
                state = match snapshot.state {
                    CommandState::Pending => RecordingState::Stopping,
                    CommandState::Complete => match lifecycle_status(snapshot) {
                        // A stop that reports the capture still live.
                        Some("recording") => RecordingState::Recording,
                        _ => RecordingState::Idle,
                    },
                    _ => RecordingState::Idle,
                };
            }
            _ => {}
        }
    }

    state
}

/// The rejection message for a `record_stop` in the wrong state.
pub fn stop_rejection(state: RecordingState) -> String {
    format!(
        "recording is '{}'; record_stop is only valid while 'recording'",
        state.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PendingQuery;
    use chrono::Utc;
    use serde_json::{Value, json};

    fn snapshot(query_type: &str, state: CommandState, result: Option<Value>) -> CommandSnapshot {
        CommandSnapshot {
            query: PendingQuery {
                query_type: query_type.into(),
                params: json!({}),
                tab_id: None,
                correlation_id: "cmd_test_1".into(),
                created_at: Utc::now(),
                client_id: "c1".into(),
            },
            state,
            result,
            completed_at: None,
        }
    }

    #[test]
    fn test_idle_with_no_commands() {
        assert_eq!(resolve_recording_state(&[]), RecordingState::Idle);
    }

    #[test]
    fn test_pending_start_awaits_gesture() {
        let commands = vec![snapshot("record_start", CommandState::Pending, None)];
        assert_eq!(
            resolve_recording_state(&commands),
            RecordingState::AwaitingUserGesture
        );
    }

    #[test]
    fn test_started_recording() {
        let commands = vec![snapshot(
            "record_start",
            CommandState::Complete,
            Some(json!({"status": "recording"})),
        )];
        assert_eq!(resolve_recording_state(&commands), RecordingState::Recording);
    }

    #[test]
    fn test_stop_pending_is_stopping() {
        let commands = vec![
            snapshot(
                "record_start",
                CommandState::Complete,
                Some(json!({"status": "recording"})),
            ),
            snapshot("record_stop", CommandState::Pending, None),
        ];
        assert_eq!(resolve_recording_state(&commands), RecordingState::Stopping);
    }

    #[test]
    fn test_saved_returns_to_idle() {
        let commands = vec![
            snapshot(
                "record_start",
                CommandState::Complete,
                Some(json!({"status": "recording"})),
            ),
            snapshot(
                "record_stop",
                CommandState::Complete,
                Some(json!({"status": "saved", "path": "demo--20260731.webm"})),
            ),
        ];
        assert_eq!(resolve_recording_state(&commands), RecordingState::Idle);
    }

    #[test]
    fn test_timed_out_start_is_idle() {
        let commands = vec![snapshot("record_start", CommandState::Timeout, None)];
        assert_eq!(resolve_recording_state(&commands), RecordingState::Idle);
    }

    #[test]
    fn test_stop_rejection_names_state() {
        let message = stop_rejection(RecordingState::AwaitingUserGesture);
        assert!(message.contains("awaiting_user_gesture"));
    }
}
