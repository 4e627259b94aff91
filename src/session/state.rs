//! Session state management
//!
//! Defines the evaluation state machine states, the immutable record of a
//! finished session, and the notifications pushed to the UI.

use crate::recorder::state::{ErrorInfo, StopFailure, StopReport};
use crate::utils::error::ErrorResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Current state of the evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Home view, no session
    Idle,
    /// Session running, recordings active, focus monitored
    Evaluating,
    /// Session ended by the participant or by a recorder fault
    Summary,
    /// Session ended by loss of window focus
    Disqualified,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Evaluating => "evaluating",
            SessionState::Summary => "summary",
            SessionState::Disqualified => "disqualified",
        };
        f.write_str(name)
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    /// Stopped by the participant
    Completed,
    /// Window focus lost during the session
    Disqualified,
    /// A recorder failed or the process shut down mid-session
    Aborted,
}

/// Immutable record of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: Uuid,

    /// Wall-clock start, for display only
    pub started_at: DateTime<Utc>,

    /// Wall-clock end, for display only
    pub ended_at: DateTime<Utc>,

    /// Duration measured on the monotonic clock
    pub elapsed_seconds: u64,

    pub outcome: SessionOutcome,

    pub camera_output_location: Option<PathBuf>,

    pub screen_output_location: Option<PathBuf>,

    /// Recorder failure that aborted the session
    pub fault: Option<ErrorInfo>,

    /// Errors collected while stopping the recorders
    pub stop_errors: Vec<StopFailure>,
}

impl SessionRecord {
    pub(crate) fn new(
        session_id: Uuid,
        started_at: DateTime<Utc>,
        elapsed_seconds: u64,
        outcome: SessionOutcome,
        stop: StopReport,
        fault: Option<ErrorInfo>,
    ) -> Self {
        Self {
            session_id,
            started_at,
            ended_at: Utc::now(),
            elapsed_seconds,
            outcome,
            camera_output_location: stop.camera_location,
            screen_output_location: stop.screen_location,
            fault,
            stop_errors: stop.errors,
        }
    }

    /// Text for the summary or disqualified view
    pub fn summary_text(&self) -> String {
        match self.outcome {
            SessionOutcome::Disqualified => "Disqualified due to misuse".to_string(),
            SessionOutcome::Completed | SessionOutcome::Aborted => {
                format!("Elapsed Time: {} s", self.elapsed_seconds)
            }
        }
    }

    /// Whether both recordings reported a location
    pub fn has_both_outputs(&self) -> bool {
        self.camera_output_location.is_some() && self.screen_output_location.is_some()
    }
}

/// Label for the running timer
pub fn timer_label(seconds: u64) -> String {
    format!("Timer: {} s", seconds)
}

/// Notifications pushed to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionNotification {
    /// The controller entered a new state
    StateChanged {
        state: SessionState,
        record: Option<SessionRecord>,
    },

    /// Elapsed time while evaluating
    Elapsed { seconds: u64 },

    /// Something the participant should be told about
    Error { error: ErrorResponse },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::PipelineKind;

    fn record(outcome: SessionOutcome) -> SessionRecord {
        SessionRecord::new(
            Uuid::new_v4(),
            Utc::now(),
            42,
            outcome,
            StopReport {
                camera_location: Some(PathBuf::from("/tmp/c.mp4")),
                screen_location: None,
                errors: vec![StopFailure {
                    kind: PipelineKind::Screen,
                    message: "never started".to_string(),
                }],
            },
            None,
        )
    }

    #[test]
    fn test_summary_text() {
        assert_eq!(record(SessionOutcome::Completed).summary_text(), "Elapsed Time: 42 s");
        assert_eq!(
            record(SessionOutcome::Disqualified).summary_text(),
            "Disqualified due to misuse"
        );
        assert_eq!(timer_label(7), "Timer: 7 s");
    }

    #[test]
    fn test_record_carries_stop_report() {
        let record = record(SessionOutcome::Aborted);
        assert!(!record.has_both_outputs());
        assert_eq!(record.stop_errors.len(), 1);
        assert!(record.ended_at >= record.started_at);
    }

    #[test]
    fn test_notification_is_tagged() {
        let json = serde_json::to_value(SessionNotification::Elapsed { seconds: 3 }).unwrap();
        assert_eq!(json["type"], "elapsed");
        assert_eq!(json["seconds"], 3);
    }
}
