//! Recording coordinator
//!
//! Owns the camera and screen pipelines as a unit and keeps them in lockstep:
//! they are initialized, started and stopped together, and a failure on one
//! side never leaves the other recording.

use super::channel::{FaultReporter, FaultSink, PipelineFault, RecordingChannel, RecordingError, RecordingResult};
use super::pipeline::RecordingPipeline;
use super::state::{PipelineKind, PipelineState, RecordingHandle, SessionOutputs, StopFailure, StopReport};
use crate::utils::error::SessionError;
use std::path::PathBuf;
use uuid::Uuid;

/// Manages the synchronized camera/screen pipeline pair
pub struct RecordingCoordinator {
    camera: RecordingPipeline,
    screen: RecordingPipeline,

    /// Session the pipelines are currently bound to
    session_id: Option<Uuid>,
}

impl RecordingCoordinator {
    /// Create a coordinator over a camera channel and a screen channel
    pub fn new(
        camera: Box<dyn RecordingChannel>,
        screen: Box<dyn RecordingChannel>,
    ) -> RecordingResult<Self> {
        if camera.channel_type() != PipelineKind::Camera {
            return Err(RecordingError::ConfigurationError(format!(
                "channel {} is not a camera channel",
                camera.id()
            )));
        }
        if screen.channel_type() != PipelineKind::Screen {
            return Err(RecordingError::ConfigurationError(format!(
                "channel {} is not a screen channel",
                screen.id()
            )));
        }

        tracing::info!("Coordinator channels: {} + {}", camera.id(), screen.id());
        Ok(Self {
            camera: RecordingPipeline::new(camera),
            screen: RecordingPipeline::new(screen),
            session_id: None,
        })
    }

    /// Initialize the camera pipeline, then the screen pipeline.
    ///
    /// On any failure everything acquired so far is torn down before the
    /// error is returned.
    pub async fn prepare_session(
        &mut self,
        outputs: &SessionOutputs,
        session_id: Uuid,
        sink: FaultSink,
    ) -> Result<(), SessionError> {
        if self.holds_resources() {
            let state = self.camera.state();
            return Err(SessionError::Setup {
                kind: PipelineKind::Camera,
                source: RecordingError::AlreadyInitialized(state),
            });
        }

        tracing::info!("Preparing recordings for session {}", session_id);
        self.session_id = Some(session_id);

        for kind in [PipelineKind::Camera, PipelineKind::Screen] {
            let reporter = FaultReporter::new(kind, session_id, sink.clone());
            let output = outputs.for_kind(kind).clone();
            let result = self.pipeline_mut(kind).initialize(&output, reporter).await;
            if let Err(source) = result {
                let report = self.stop_all().await;
                if !report.is_clean() {
                    tracing::warn!("Teardown after failed setup reported: {:?}", report.errors);
                }
                return Err(SessionError::Setup { kind, source });
            }
        }

        Ok(())
    }

    /// Start both pipelines. If either fails, both are stopped.
    pub async fn start_all(&mut self) -> Result<(), SessionError> {
        for kind in [PipelineKind::Camera, PipelineKind::Screen] {
            let result = self.pipeline_mut(kind).start().await;
            if let Err(source) = result {
                tracing::error!("{} failed to start, stopping both pipelines", kind);
                let report = self.stop_all().await;
                if !report.is_clean() {
                    tracing::warn!("Teardown after failed start reported: {:?}", report.errors);
                }
                return Err(SessionError::Setup { kind, source });
            }
        }

        tracing::info!("Both pipelines recording");
        Ok(())
    }

    /// Stop both pipelines.
    ///
    /// Idempotent. Both stops run concurrently so one slow finalization never
    /// keeps the other device recording; failures are collected into the
    /// report instead of short-circuiting.
    pub async fn stop_all(&mut self) -> StopReport {
        let (camera, screen) = tokio::join!(
            Self::stop_pipeline(&mut self.camera),
            Self::stop_pipeline(&mut self.screen),
        );

        let mut report = StopReport::default();
        let stopped = [(PipelineKind::Camera, camera), (PipelineKind::Screen, screen)];
        for (kind, stopped) in stopped {
            let Some((location, failure)) = stopped else {
                continue;
            };
            report.errors.extend(failure);
            match kind {
                PipelineKind::Camera => report.camera_location = location,
                PipelineKind::Screen => report.screen_location = location,
            }
        }

        if report.is_clean() {
            tracing::info!("All recordings stopped");
        } else {
            tracing::warn!("Recordings stopped with {} error(s)", report.errors.len());
        }
        report
    }

    /// Stop one pipeline. `None` if it was never initialized.
    async fn stop_pipeline(
        pipeline: &mut RecordingPipeline,
    ) -> Option<(Option<PathBuf>, Option<StopFailure>)> {
        if pipeline.state() == PipelineState::Uninitialized {
            return None;
        }

        match pipeline.stop().await {
            Ok(location) => Some((Some(location), None)),
            Err(e) => {
                let failure = StopFailure {
                    kind: pipeline.kind(),
                    message: e.to_string(),
                };
                Some((pipeline.handle().output_destination, Some(failure)))
            }
        }
    }

    /// Apply an asynchronous fault to the matching pipeline.
    ///
    /// Returns false for faults from another session or against a pipeline
    /// that is no longer live.
    pub fn mark_failed(&mut self, fault: &PipelineFault) -> bool {
        if self.session_id != Some(fault.session_id) {
            tracing::debug!("Dropping fault from stale session {}", fault.session_id);
            return false;
        }
        self.pipeline_mut(fault.error.kind)
            .mark_failed(fault.error.clone())
    }

    /// Snapshots of both pipelines, camera first
    pub fn handles(&self) -> [RecordingHandle; 2] {
        [self.camera.handle(), self.screen.handle()]
    }

    /// Whether either pipeline is recording
    pub fn is_recording(&self) -> bool {
        self.camera.state() == PipelineState::Recording
            || self.screen.state() == PipelineState::Recording
    }

    /// Whether either pipeline still holds device resources
    pub fn holds_resources(&self) -> bool {
        self.camera.state().holds_resources() || self.screen.state().holds_resources()
    }

    fn pipeline_mut(&mut self, kind: PipelineKind) -> &mut RecordingPipeline {
        match kind {
            PipelineKind::Camera => &mut self.camera,
            PipelineKind::Screen => &mut self.screen,
        }
    }
}
