//! Recording system module
//!
//! This module implements the paired recording architecture:
//! - RecordingChannel trait for the camera and screen capture backends
//! - RecordingPipeline to enforce each backend's lifecycle
//! - RecordingCoordinator to drive both pipelines as one unit

pub mod channel;
pub mod coordinator;
pub mod ffmpeg;
pub mod mock;
pub mod pipeline;
pub mod state;

pub use channel::{FaultReporter, PipelineFault, RecordingChannel, RecordingError};
pub use coordinator::RecordingCoordinator;
pub use ffmpeg::FfmpegChannel;
pub use pipeline::RecordingPipeline;
pub use state::{PipelineKind, PipelineState, RecordingHandle};
