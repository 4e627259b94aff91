//! Recording pipeline lifecycle
//!
//! Wraps one [`RecordingChannel`] in the initialize → start → stop state
//! machine. The lifecycle rules live here once so that both capture sources
//! behave identically from the coordinator's point of view.

use super::channel::{FaultReporter, RecordingChannel, RecordingError, RecordingResult};
use super::state::{ErrorInfo, PipelineKind, PipelineState, RecordingHandle};
use std::path::{Path, PathBuf};

/// One device-to-file recording path
pub struct RecordingPipeline {
    channel: Box<dyn RecordingChannel>,
    handle: RecordingHandle,

    /// Location reported by the backend on the last successful stop
    actual_location: Option<PathBuf>,
}

impl RecordingPipeline {
    pub fn new(channel: Box<dyn RecordingChannel>) -> Self {
        let kind = channel.channel_type();
        tracing::debug!("Creating {} pipeline on channel {}", kind, channel.id());
        Self {
            channel,
            handle: RecordingHandle::new(kind),
            actual_location: None,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.handle.kind
    }

    pub fn state(&self) -> PipelineState {
        self.handle.state
    }

    /// Snapshot of the pipeline for reporting
    pub fn handle(&self) -> RecordingHandle {
        self.handle.clone()
    }

    /// Allocate the backend and bind the output destination.
    ///
    /// Only valid on a fresh or torn-down pipeline; initializing twice
    /// without a stop in between is reported as [`RecordingError::AlreadyInitialized`].
    pub async fn initialize(&mut self, output: &Path, faults: FaultReporter) -> RecordingResult<()> {
        match self.handle.state {
            PipelineState::Uninitialized | PipelineState::Stopped => {}
            other => return Err(RecordingError::AlreadyInitialized(other)),
        }

        self.handle.state = PipelineState::Initializing;
        self.handle.output_destination = Some(output.to_path_buf());
        self.handle.last_error = None;
        self.actual_location = None;

        match self.channel.initialize(output, faults).await {
            Ok(()) => {
                self.handle.state = PipelineState::Ready;
                tracing::info!("{} pipeline ready: {}", self.kind(), output.display());
                Ok(())
            }
            Err(e) => {
                tracing::error!("{} pipeline initialization failed: {}", self.kind(), e);
                self.fail_and_release(&e).await;
                Err(e)
            }
        }
    }

    /// Begin recording. A pipeline that is already recording is left alone.
    pub async fn start(&mut self) -> RecordingResult<()> {
        match self.handle.state {
            PipelineState::Recording => Ok(()),
            PipelineState::Ready => match self.channel.start().await {
                Ok(()) => {
                    self.handle.state = PipelineState::Recording;
                    tracing::info!("{} pipeline recording", self.kind());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("{} pipeline failed to start: {}", self.kind(), e);
                    self.fail_and_release(&e).await;
                    Err(e)
                }
            },
            other => Err(RecordingError::NotReady(other)),
        }
    }

    /// Stop the pipeline and return the actual output location.
    ///
    /// Tolerates a pipeline whose backend already failed. Resources are
    /// released even when the backend's stop raises.
    pub async fn stop(&mut self) -> RecordingResult<PathBuf> {
        let destination = self.handle.output_destination.clone();

        match self.handle.state {
            PipelineState::Uninitialized => Err(RecordingError::NotInitialized),
            PipelineState::Stopped => self
                .actual_location
                .clone()
                .or(destination)
                .ok_or(RecordingError::NotInitialized),
            PipelineState::Failed | PipelineState::Initializing | PipelineState::Ready => {
                self.channel.release().await;
                self.handle.state = PipelineState::Stopped;
                tracing::info!("{} pipeline released without recording", self.kind());
                destination.ok_or(RecordingError::NotInitialized)
            }
            PipelineState::Recording => match self.channel.stop().await {
                Ok(location) => {
                    self.handle.state = PipelineState::Stopped;
                    self.actual_location = Some(location.clone());
                    tracing::info!("{} pipeline stopped: {}", self.kind(), location.display());
                    Ok(location)
                }
                Err(e) => {
                    tracing::error!("{} pipeline stop failed: {}", self.kind(), e);
                    self.handle.last_error = Some(ErrorInfo::new(self.kind(), e.to_string()));
                    self.channel.release().await;
                    self.handle.state = PipelineState::Stopped;
                    Err(e)
                }
            },
        }
    }

    /// Record an asynchronous backend failure.
    ///
    /// Returns false when the pipeline holds no live recording, in which case
    /// the fault is stale and ignored.
    pub fn mark_failed(&mut self, error: ErrorInfo) -> bool {
        match self.handle.state {
            PipelineState::Initializing | PipelineState::Ready | PipelineState::Recording => {
                tracing::warn!("{} pipeline failed: {}", self.kind(), error.message);
                self.handle.state = PipelineState::Failed;
                self.handle.last_error = Some(error);
                true
            }
            state => {
                tracing::debug!(
                    "Ignoring {} fault in state {:?}: {}",
                    self.kind(),
                    state,
                    error.message
                );
                false
            }
        }
    }

    async fn fail_and_release(&mut self, error: &RecordingError) {
        self.handle.last_error = Some(ErrorInfo::new(self.kind(), error.to_string()));
        self.channel.release().await;
        self.handle.state = PipelineState::Failed;
    }
}
