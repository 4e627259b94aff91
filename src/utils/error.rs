//! Error types and handling
//!
//! Common error types used across the application.

use crate::capture::traits::DeviceAvailability;
use crate::recorder::channel::RecordingError;
use crate::recorder::state::{ErrorInfo, PipelineKind, StopFailure};
use crate::session::state::SessionState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the session core
#[derive(Error, Debug)]
pub enum SessionError {
    /// The probe found a device missing; entry is blocked
    #[error("Device unavailable: {}", .0.missing().join(", "))]
    DeviceUnavailable(DeviceAvailability),

    /// A pipeline could not be initialized or started; entry is aborted
    #[error("{kind} recording setup failed: {source}")]
    Setup {
        kind: PipelineKind,
        #[source]
        source: RecordingError,
    },

    /// A recorder failed mid-session; the session was aborted
    #[error("{}", .0.user_message())]
    RecordingFault(ErrorInfo),

    /// Window focus was lost mid-session
    #[error("Disqualified due to misuse")]
    IntegrityViolation,

    /// Stopping recorders raised; resources were released regardless
    #[error("Stopping recordings reported {} error(s): {}", .0.len(), join_failures(.0))]
    Stop(Vec<StopFailure>),

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("Session runtime is no longer running")]
    RuntimeClosed,
}

fn join_failures(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Error response for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&SessionError> for ErrorResponse {
    fn from(error: &SessionError) -> Self {
        let code = match error {
            SessionError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            SessionError::Setup { .. } => "SETUP_ERROR",
            SessionError::RecordingFault(_) => "RECORDING_FAULT",
            SessionError::IntegrityViolation => "INTEGRITY_VIOLATION",
            SessionError::Stop(_) => "STOP_ERROR",
            SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SessionError::RuntimeClosed => "RUNTIME_CLOSED",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<SessionError> for ErrorResponse {
    fn from(error: SessionError) -> Self {
        ErrorResponse::from(&error)
    }
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Session(session) => return ErrorResponse::from(session),
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unavailable_message() {
        let error = SessionError::DeviceUnavailable(DeviceAvailability {
            camera_present: false,
            microphone_present: true,
            screen_capture_permitted: true,
        });
        let response = ErrorResponse::from(&error);
        assert_eq!(response.code, "DEVICE_UNAVAILABLE");
        assert_eq!(response.message, "Device unavailable: camera");
    }

    #[test]
    fn test_app_error_unwraps_session_code() {
        let error = AppError::from(SessionError::IntegrityViolation);
        let response = ErrorResponse::from(error);
        assert_eq!(response.code, "INTEGRITY_VIOLATION");
    }

    #[test]
    fn test_stop_error_lists_failures() {
        let error = SessionError::Stop(vec![StopFailure {
            kind: PipelineKind::Screen,
            message: "timed out".to_string(),
        }]);
        assert!(error.to_string().contains("Screen stop failed: timed out"));
    }
}
