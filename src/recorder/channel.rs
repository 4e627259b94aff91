//! Recording channel abstraction
//!
//! A channel is one device-to-file capture backend. Camera+audio and screen
//! capture implement the same narrow trait so the coordinator can drive them
//! as a synchronized pair without knowing anything about the capture source.

use super::state::{ErrorInfo, PipelineKind, PipelineState};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by channels and pipelines
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Pipeline already initialized (state: {0:?})")]
    AlreadyInitialized(PipelineState),

    #[error("Pipeline not initialized")]
    NotInitialized,

    #[error("Pipeline not ready to start (state: {0:?})")]
    NotReady(PipelineState),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Recorder backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecordingResult<T> = Result<T, RecordingError>;

/// An asynchronous failure delivered by a channel backend
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFault {
    /// Session the failing pipeline was initialized for
    pub session_id: Uuid,
    pub error: ErrorInfo,
}

/// Callback that receives faults; must only enqueue, never mutate session state
pub type FaultSink = Arc<dyn Fn(PipelineFault) + Send + Sync>;

/// Error channel handed to a channel at initialization
#[derive(Clone)]
pub struct FaultReporter {
    kind: PipelineKind,
    session_id: Uuid,
    sink: FaultSink,
}

impl FaultReporter {
    pub fn new(kind: PipelineKind, session_id: Uuid, sink: FaultSink) -> Self {
        Self {
            kind,
            session_id,
            sink,
        }
    }

    /// A reporter that drops everything, for channels driven outside a session
    pub fn discard(kind: PipelineKind) -> Self {
        Self::new(kind, Uuid::nil(), Arc::new(|_| {}))
    }

    /// Report a failure observed by the backend
    pub fn report(&self, message: impl Into<String>) {
        let error = ErrorInfo::new(self.kind, message);
        tracing::warn!("Recorder fault reported: {}", error);
        (self.sink)(PipelineFault {
            session_id: self.session_id,
            error,
        });
    }
}

impl fmt::Debug for FaultReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultReporter")
            .field("kind", &self.kind)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Trait for a capture backend
#[async_trait]
pub trait RecordingChannel: Send {
    /// Identifier used in logs
    fn id(&self) -> &str;

    /// Capture source this channel records
    fn channel_type(&self) -> PipelineKind;

    /// Allocate the device, capture session and recorder, and bind the output
    async fn initialize(&mut self, output: &Path, faults: FaultReporter) -> RecordingResult<()>;

    /// Begin writing to the output
    async fn start(&mut self) -> RecordingResult<()>;

    /// Finish writing and return the actual output location
    async fn stop(&mut self) -> RecordingResult<PathBuf>;

    /// Release whatever is held without finalizing output. Must not fail.
    async fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_reporter_tags_faults() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let session_id = Uuid::new_v4();
        let reporter = FaultReporter::new(
            PipelineKind::Screen,
            session_id,
            Arc::new(move |fault| sink_seen.lock().push(fault)),
        );

        reporter.report("capture lost");

        let faults = seen.lock();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].session_id, session_id);
        assert_eq!(faults[0].error.kind, PipelineKind::Screen);
        assert_eq!(faults[0].error.message, "capture lost");
    }

    #[test]
    fn test_discard_reporter_is_silent() {
        let reporter = FaultReporter::discard(PipelineKind::Camera);
        reporter.report("ignored");
        assert!(format!("{reporter:?}").contains(&Uuid::nil().to_string()));
    }
}
