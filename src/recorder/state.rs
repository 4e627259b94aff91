//! Recording pipeline state
//!
//! Defines the per-pipeline lifecycle states and the snapshot types the
//! coordinator hands out to the session layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which capture source a pipeline records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Camera video plus microphone audio
    Camera,
    /// Primary screen
    Screen,
}

impl PipelineKind {
    /// Human-readable label used in log lines and error dialogs
    pub fn label(&self) -> &'static str {
        match self {
            PipelineKind::Camera => "Camera",
            PipelineKind::Screen => "Screen",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle state of a single recording pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// No resources allocated
    Uninitialized,
    /// Device and recorder are being allocated
    Initializing,
    /// Initialized, waiting for start
    Ready,
    /// Actively writing to the output destination
    Recording,
    /// Stopped and released
    Stopped,
    /// The backend reported an error; resources may still need releasing
    Failed,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl PipelineState {
    /// Whether the pipeline currently holds device resources
    pub fn holds_resources(&self) -> bool {
        matches!(
            self,
            PipelineState::Initializing
                | PipelineState::Ready
                | PipelineState::Recording
                | PipelineState::Failed
        )
    }
}

/// Structured description of a recorder failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Pipeline that failed
    pub kind: PipelineKind,

    /// Backend error message
    pub message: String,

    /// When the failure was observed
    pub occurred_at: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(kind: PipelineKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Message shown to the participant when this failure ends a session
    pub fn user_message(&self) -> String {
        match self.kind {
            PipelineKind::Camera => format!("Camera recording error: {}", self.message),
            PipelineKind::Screen => format!(
                "Screen recording error: {}\n\nPossible causes:\n\
                 - Insufficient permissions\n\
                 - Screen capture not supported\n\
                 - Missing video codec",
                self.message
            ),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pipeline: {}", self.kind, self.message)
    }
}

/// Snapshot of one recording pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingHandle {
    pub kind: PipelineKind,

    /// Destination bound at initialization
    pub output_destination: Option<PathBuf>,

    pub state: PipelineState,

    /// Most recent failure, kept after the pipeline is stopped
    pub last_error: Option<ErrorInfo>,
}

impl RecordingHandle {
    pub fn new(kind: PipelineKind) -> Self {
        Self {
            kind,
            output_destination: None,
            state: PipelineState::Uninitialized,
            last_error: None,
        }
    }
}

/// Output destinations for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutputs {
    /// Camera and microphone container
    pub camera: PathBuf,

    /// Screen capture container
    pub screen: PathBuf,
}

impl SessionOutputs {
    pub fn for_kind(&self, kind: PipelineKind) -> &PathBuf {
        match kind {
            PipelineKind::Camera => &self.camera,
            PipelineKind::Screen => &self.screen,
        }
    }
}

/// A stop that failed during teardown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopFailure {
    pub kind: PipelineKind,
    pub message: String,
}

impl fmt::Display for StopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stop failed: {}", self.kind, self.message)
    }
}

/// Result of stopping both pipelines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    /// Actual camera output location, if the pipeline ever bound one
    pub camera_location: Option<PathBuf>,

    /// Actual screen output location, if the pipeline ever bound one
    pub screen_location: Option<PathBuf>,

    /// Stops that raised; resources were released regardless
    pub errors: Vec<StopFailure>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
