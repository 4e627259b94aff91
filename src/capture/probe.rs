//! Device availability probes
//!
//! [`SystemDeviceProbe`] asks the operating system which capture devices are
//! present. [`StaticDeviceProbe`] returns whatever it was told to, for tests
//! and headless runs.

use super::traits::{has_screen_recording_permission, DeviceAvailability, DeviceProbe};
use crate::config::EvaluationConfig;
use crate::recorder::ffmpeg::screen_input_args;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Stdio;
use std::time::Duration;

/// Probe backed by the host's devices
pub struct SystemDeviceProbe {
    ffmpeg_path: String,
    screen_args: Vec<String>,
    timeout: Duration,
}

impl SystemDeviceProbe {
    pub fn new(config: &EvaluationConfig) -> Self {
        let screen_args = match screen_input_args(std::env::consts::OS, &config.screen) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!("Screen capture unavailable: {}", e);
                Vec::new()
            }
        };

        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            screen_args,
            timeout: config.probe_timeout(),
        }
    }

    /// Grab one frame of the screen and discard it
    async fn screen_capture_permitted(&self) -> bool {
        if self.screen_args.is_empty() || !has_screen_recording_permission() {
            return false;
        }

        let child = tokio::process::Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(&self.screen_args)
            .args(["-frames:v", "1", "-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Screen probe could not run {}: {}", self.ffmpeg_path, e);
                return false;
            }
        };

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::warn!("Screen probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!("Screen probe timed out after {:?}", self.timeout);
                false
            }
        }
    }
}

#[async_trait]
impl DeviceProbe for SystemDeviceProbe {
    async fn probe(&self) -> DeviceAvailability {
        let (camera_present, microphone_present) =
            match tokio::task::spawn_blocking(|| (camera_present(), microphone_present())).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::error!("Device enumeration panicked: {}", e);
                    (false, false)
                }
            };

        let availability = DeviceAvailability {
            camera_present,
            microphone_present,
            screen_capture_permitted: self.screen_capture_permitted().await,
        };
        tracing::info!("Device probe: {:?}", availability);
        availability
    }
}

#[cfg(feature = "native-devices")]
fn camera_present() -> bool {
    use nokhwa::utils::ApiBackend;

    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => !cameras.is_empty(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            false
        }
    }
}

#[cfg(feature = "native-devices")]
fn microphone_present() -> bool {
    use cpal::traits::HostTrait;

    cpal::default_host().default_input_device().is_some()
}

#[cfg(all(not(feature = "native-devices"), target_os = "linux"))]
fn camera_present() -> bool {
    any_entry("/dev", |name| name.starts_with("video"))
}

// ALSA capture nodes are named pcmC<card>D<device>c
#[cfg(all(not(feature = "native-devices"), target_os = "linux"))]
fn microphone_present() -> bool {
    any_entry("/dev/snd", |name| name.starts_with("pcmC") && name.ends_with('c'))
}

#[cfg(all(not(feature = "native-devices"), target_os = "linux"))]
fn any_entry(dir: &str, matches: impl Fn(&str) -> bool) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .any(|entry| matches(&entry.file_name().to_string_lossy())),
        Err(_) => false,
    }
}

// Without native enumeration elsewhere, the recorder's own start-up decides
#[cfg(all(not(feature = "native-devices"), not(target_os = "linux")))]
fn camera_present() -> bool {
    true
}

#[cfg(all(not(feature = "native-devices"), not(target_os = "linux")))]
fn microphone_present() -> bool {
    true
}

/// Probe with a fixed answer
#[derive(Debug, Default)]
pub struct StaticDeviceProbe {
    availability: Mutex<DeviceAvailability>,
}

impl StaticDeviceProbe {
    pub fn new(availability: DeviceAvailability) -> Self {
        Self {
            availability: Mutex::new(availability),
        }
    }

    /// Change the answer for subsequent probes
    pub fn set(&self, availability: DeviceAvailability) {
        *self.availability.lock() = availability;
    }
}

#[async_trait]
impl DeviceProbe for StaticDeviceProbe {
    async fn probe(&self) -> DeviceAvailability {
        *self.availability.lock()
    }
}
