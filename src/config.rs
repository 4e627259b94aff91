//! Evaluation configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! no file at all) is valid.

use crate::recorder::state::SessionOutputs;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Top-level configuration for the evaluation shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationConfig {
    /// Directory that receives one subdirectory per session
    pub output_dir: PathBuf,

    /// File name of the camera+audio recording
    pub camera_file_name: String,

    /// File name of the screen recording
    pub screen_file_name: String,

    /// Interval between elapsed-time updates
    pub tick_interval_ms: u64,

    /// How long a recorder may take to finalize before it is killed
    pub stop_timeout_ms: u64,

    /// Upper bound for the screen-capture probe grab
    pub probe_timeout_ms: u64,

    /// FFmpeg executable
    pub ffmpeg_path: String,

    pub camera: CameraSourceConfig,

    pub screen: ScreenSourceConfig,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            camera_file_name: "camera_recording.mp4".to_string(),
            screen_file_name: "screen_recording.mp4".to_string(),
            tick_interval_ms: 1000,
            stop_timeout_ms: 5000,
            probe_timeout_ms: 5000,
            ffmpeg_path: "ffmpeg".to_string(),
            camera: CameraSourceConfig::default(),
            screen: ScreenSourceConfig::default(),
        }
    }
}

/// Camera and microphone source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraSourceConfig {
    /// Platform video device (None = default camera)
    pub video_device: Option<String>,

    /// Platform audio device (None = default microphone)
    pub audio_device: Option<String>,

    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSourceConfig {
    fn default() -> Self {
        Self {
            video_device: None,
            audio_device: None,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Screen source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenSourceConfig {
    /// Platform display identifier (None = primary screen)
    pub display: Option<String>,

    pub fps: u32,
}

impl Default for ScreenSourceConfig {
    fn default() -> Self {
        Self {
            display: None,
            fps: 30,
        }
    }
}

impl EvaluationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(AppError::Config("tickIntervalMs must be positive".to_string()));
        }
        if self.camera_file_name == self.screen_file_name {
            return Err(AppError::Config(
                "camera and screen recordings need distinct file names".to_string(),
            ));
        }
        Ok(())
    }

    /// Timer period, never zero even for configs built in code
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Absolute output destinations for one session
    pub fn session_outputs(&self, session_id: Uuid) -> std::io::Result<SessionOutputs> {
        let base = if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            std::env::current_dir()?.join(&self.output_dir)
        };
        let session_dir = base.join(format!("session-{}", session_id));

        Ok(SessionOutputs {
            camera: session_dir.join(&self.camera_file_name),
            screen: session_dir.join(&self.screen_file_name),
        })
    }
}
