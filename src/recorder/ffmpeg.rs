//! FFmpeg-backed recording channels
//!
//! Each channel drives one FFmpeg process that reads straight from the
//! platform capture device and encodes H.264 MP4. The process is asked to
//! finalize by writing `q` to its stdin; if it does not exit within the stop
//! timeout it is killed.

use super::channel::{FaultReporter, RecordingChannel, RecordingError, RecordingResult};
use super::state::PipelineKind;
use crate::config::{CameraSourceConfig, EvaluationConfig, ScreenSourceConfig};
use async_trait::async_trait;
use parking_lot::Mutex as ParkingMutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Time FFmpeg gets to open its devices before start is considered successful
const STARTUP_GRACE: Duration = Duration::from_millis(300);

/// Poll interval for process exit
const WATCH_INTERVAL: Duration = Duration::from_millis(250);

/// Build FFmpeg input arguments for the camera and microphone on `os`
pub(crate) fn camera_input_args(os: &str, config: &CameraSourceConfig) -> RecordingResult<Vec<String>> {
    let size = format!("{}x{}", config.width, config.height);
    let fps = config.fps.to_string();

    let args = match os {
        "linux" => {
            let video = config.video_device.as_deref().unwrap_or("/dev/video0");
            let audio = config.audio_device.as_deref().unwrap_or("default");
            vec![
                "-f", "v4l2", "-framerate", fps.as_str(), "-video_size", size.as_str(), "-i", video,
                "-f", "alsa", "-i", audio,
            ]
            .into_iter()
            .map(String::from)
            .collect()
        }
        "macos" => {
            let video = config.video_device.as_deref().unwrap_or("0");
            let audio = config.audio_device.as_deref().unwrap_or("0");
            vec![
                "-f".to_string(),
                "avfoundation".to_string(),
                "-framerate".to_string(),
                fps,
                "-video_size".to_string(),
                size,
                "-i".to_string(),
                format!("{video}:{audio}"),
            ]
        }
        "windows" => {
            // dshow has no default device, names must be configured
            let (Some(video), Some(audio)) = (&config.video_device, &config.audio_device) else {
                return Err(RecordingError::ConfigurationError(
                    "camera.videoDevice and camera.audioDevice are required on Windows".to_string(),
                ));
            };
            vec![
                "-f".to_string(),
                "dshow".to_string(),
                "-framerate".to_string(),
                fps,
                "-video_size".to_string(),
                size,
                "-i".to_string(),
                format!("video={video}:audio={audio}"),
            ]
        }
        other => {
            return Err(RecordingError::ConfigurationError(format!(
                "camera capture is not supported on {other}"
            )))
        }
    };

    Ok(args)
}

/// Build FFmpeg input arguments for the screen on `os`
pub(crate) fn screen_input_args(os: &str, config: &ScreenSourceConfig) -> RecordingResult<Vec<String>> {
    let fps = config.fps.to_string();

    let (format, input) = match os {
        "linux" => {
            let display = config
                .display
                .clone()
                .or_else(|| std::env::var("DISPLAY").ok())
                .unwrap_or_else(|| ":0.0".to_string());
            ("x11grab", display)
        }
        "macos" => {
            let display = config.display.as_deref().unwrap_or("1");
            ("avfoundation", format!("{display}:none"))
        }
        "windows" => (
            "gdigrab",
            config.display.clone().unwrap_or_else(|| "desktop".to_string()),
        ),
        other => {
            return Err(RecordingError::ConfigurationError(format!(
                "screen capture is not supported on {other}"
            )))
        }
    };

    let mut args = vec!["-f".to_string(), format.to_string(), "-framerate".to_string(), fps];
    if os == "macos" {
        args.extend(["-capture_cursor".to_string(), "1".to_string()]);
    }
    args.extend(["-i".to_string(), input]);
    Ok(args)
}

/// Encoder arguments shared by both channels
fn output_args(kind: PipelineKind) -> Vec<String> {
    let mut args: Vec<String> = [
        "-c:v", "libx264",   // H.264 codec
        "-preset", "veryfast",
        "-pix_fmt", "yuv420p", // Required for compatibility
    ]
    .into_iter()
    .map(String::from)
    .collect();

    match kind {
        PipelineKind::Camera => args.extend(["-c:a".to_string(), "aac".to_string()]),
        PipelineKind::Screen => args.push("-an".to_string()),
    }

    args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    args
}

/// Recording channel backed by an FFmpeg child process
pub struct FfmpegChannel {
    id: String,
    kind: PipelineKind,
    ffmpeg_path: String,
    /// Input arguments, or why this platform/config cannot capture
    input_args: Result<Vec<String>, String>,
    stop_timeout: Duration,
    output: Option<PathBuf>,
    faults: Option<FaultReporter>,
    process: Arc<ParkingMutex<Option<Child>>>,
    stopping: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
}

impl FfmpegChannel {
    /// Camera and microphone into one file
    pub fn camera(config: &EvaluationConfig) -> Self {
        Self::new(
            PipelineKind::Camera,
            config,
            camera_input_args(std::env::consts::OS, &config.camera),
        )
    }

    /// Primary screen, no audio
    pub fn screen(config: &EvaluationConfig) -> Self {
        Self::new(
            PipelineKind::Screen,
            config,
            screen_input_args(std::env::consts::OS, &config.screen),
        )
    }

    fn new(
        kind: PipelineKind,
        config: &EvaluationConfig,
        input_args: RecordingResult<Vec<String>>,
    ) -> Self {
        Self {
            id: format!("ffmpeg-{}", kind.label().to_lowercase()),
            kind,
            ffmpeg_path: config.ffmpeg_path.clone(),
            input_args: input_args.map_err(|e| match e {
                RecordingError::ConfigurationError(message) => message,
                other => other.to_string(),
            }),
            stop_timeout: config.stop_timeout(),
            output: None,
            faults: None,
            process: Arc::new(ParkingMutex::new(None)),
            stopping: Arc::new(AtomicBool::new(false)),
            watcher: None,
        }
    }

    /// Full FFmpeg argument list for writing to `output`
    pub fn command_args(&self, output: &Path) -> RecordingResult<Vec<String>> {
        let input = match &self.input_args {
            Ok(args) => args.clone(),
            Err(message) => return Err(RecordingError::ConfigurationError(message.clone())),
        };

        let mut args = vec![
            "-y".to_string(), // Overwrite output
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-nostats".to_string(),
        ];
        args.extend(input);
        args.extend(output_args(self.kind));
        args.push(output.to_string_lossy().to_string());
        Ok(args)
    }

    fn log_path(output: &Path) -> PathBuf {
        output.with_extension("ffmpeg.log")
    }

    fn spawn_watcher(&mut self, faults: FaultReporter) {
        let process = self.process.clone();
        let stopping = self.stopping.clone();
        let kind = self.kind;

        self.watcher = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(WATCH_INTERVAL);
            loop {
                interval.tick().await;
                if stopping.load(Ordering::SeqCst) {
                    break;
                }

                let exited = {
                    let mut guard = process.lock();
                    match guard.as_mut() {
                        Some(child) => child.try_wait(),
                        None => break,
                    }
                };

                match exited {
                    Ok(None) => continue,
                    Ok(Some(status)) => {
                        if !stopping.load(Ordering::SeqCst) {
                            faults.report(format!("{kind} recorder exited unexpectedly ({status})"));
                        }
                        break;
                    }
                    Err(e) => {
                        faults.report(format!("{kind} recorder could not be polled: {e}"));
                        break;
                    }
                }
            }
        }));
    }

    fn halt_watcher(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }

    fn kill_process(&self) {
        if let Some(mut child) = self.process.lock().take() {
            reap(&mut child);
        }
    }
}

#[async_trait]
impl RecordingChannel for FfmpegChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> PipelineKind {
        self.kind
    }

    async fn initialize(&mut self, output: &Path, faults: FaultReporter) -> RecordingResult<()> {
        // Surface unsupported platforms and missing device names now
        self.command_args(output)?;

        let status = tokio::process::Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                RecordingError::DeviceNotFound(format!("ffmpeg not runnable at {}: {e}", self.ffmpeg_path))
            })?;
        if !status.success() {
            return Err(RecordingError::DeviceNotFound(format!(
                "ffmpeg at {} exited with {status}",
                self.ffmpeg_path
            )));
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.output = Some(output.to_path_buf());
        self.faults = Some(faults);
        tracing::debug!("{} initialized for {}", self.id, output.display());
        Ok(())
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.process.lock().is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        let output = self.output.clone().ok_or(RecordingError::NotInitialized)?;
        let faults = self.faults.clone().ok_or(RecordingError::NotInitialized)?;
        let args = self.command_args(&output)?;

        let log = std::fs::File::create(Self::log_path(&output))?;
        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .spawn()?;

        tokio::time::sleep(STARTUP_GRACE).await;
        let exited = match child.try_wait() {
            Ok(exited) => exited,
            Err(e) => {
                reap(&mut child);
                return Err(e.into());
            }
        };
        if let Some(status) = exited {
            return Err(RecordingError::Backend(format!(
                "ffmpeg exited during start-up ({status}), see {}",
                Self::log_path(&output).display()
            )));
        }

        tracing::info!("Started {} recording: {}", self.kind, output.display());

        *self.process.lock() = Some(child);
        self.stopping.store(false, Ordering::SeqCst);
        self.spawn_watcher(faults);
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<PathBuf> {
        self.halt_watcher();

        let mut child = self
            .process
            .lock()
            .take()
            .ok_or(RecordingError::NotRecording)?;
        let output = self.output.clone().ok_or(RecordingError::NotInitialized)?;

        // 'q' asks FFmpeg to flush and write the trailer
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"q");
            let _ = stdin.flush();
        }

        let deadline = Instant::now() + self.stop_timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() >= deadline => break None,
                Ok(None) => tokio::time::sleep(WATCH_INTERVAL).await,
                Err(e) => {
                    reap(&mut child);
                    return Err(e.into());
                }
            }
        };

        let Some(status) = status else {
            reap(&mut child);
            return Err(RecordingError::Backend(format!(
                "{} recorder did not finalize within {:?}",
                self.kind, self.stop_timeout
            )));
        };

        if !status.success() {
            tracing::warn!("{} exited with status {}", self.id, status);
        }
        if !output.exists() {
            return Err(RecordingError::Backend(format!(
                "{} recorder produced no output ({status})",
                self.kind
            )));
        }

        tracing::info!("{} recording finalized: {}", self.kind, output.display());
        Ok(std::fs::canonicalize(&output).unwrap_or(output))
    }

    async fn release(&mut self) {
        self.halt_watcher();
        self.kill_process();
        self.faults = None;
        self.output = None;
    }
}

/// Kill a child that is no longer tracked and wait for it, so it neither
/// keeps running nor lingers as a zombie
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!("ffmpeg kill failed: {}", e);
    }
    let _ = child.wait();
}

impl Drop for FfmpegChannel {
    fn drop(&mut self) {
        self.halt_watcher();
        self.kill_process();
    }
}
