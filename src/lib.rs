//! Proctor Shell - proctored fullscreen evaluation sessions.
//!
//! This is the main library crate for the proctor shell. It gates session
//! entry on camera, microphone and screen availability, records camera and
//! screen for the whole session, and disqualifies the participant if the
//! evaluation window loses focus.

pub mod capture;
pub mod commands;
pub mod config;
pub mod recorder;
pub mod session;
pub mod utils;

use capture::{DeviceAvailability, DeviceProbe, StaticDeviceProbe, SystemDeviceProbe};
use config::EvaluationConfig;
use recorder::mock::MockChannel;
use recorder::{FfmpegChannel, PipelineKind, RecordingCoordinator};
use session::{SessionHandle, SessionRuntime};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::AppResult;

/// Recorder implementation behind a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderBackend {
    /// FFmpeg processes reading the real devices
    Ffmpeg,
    /// In-memory channels and a probe that reports every device present
    Simulated,
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proctor_shell=debug,proctor_shell_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the session runtime on the current tokio runtime
pub fn spawn_session(
    config: EvaluationConfig,
    backend: RecorderBackend,
) -> AppResult<(SessionHandle, JoinHandle<()>)> {
    let (probe, coordinator): (Arc<dyn DeviceProbe>, RecordingCoordinator) = match backend {
        RecorderBackend::Ffmpeg => (
            Arc::new(SystemDeviceProbe::new(&config)),
            RecordingCoordinator::new(
                Box::new(FfmpegChannel::camera(&config)),
                Box::new(FfmpegChannel::screen(&config)),
            )?,
        ),
        RecorderBackend::Simulated => {
            let (camera, _) = MockChannel::new(PipelineKind::Camera);
            let (screen, _) = MockChannel::new(PipelineKind::Screen);
            (
                Arc::new(StaticDeviceProbe::new(DeviceAvailability::all())),
                RecordingCoordinator::new(Box::new(camera), Box::new(screen))?,
            )
        }
    };

    tracing::info!(
        "Starting session runtime ({:?} backend), output in {}",
        backend,
        config.output_dir.display()
    );
    Ok(SessionRuntime::spawn(config, probe, coordinator))
}
