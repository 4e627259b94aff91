//! Capture trait definitions
//!
//! Platform-agnostic device availability types and the probe trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Snapshot of the hardware a session needs
///
/// Produced fresh on every start attempt; devices can come and go between
/// attempts so this is never cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAvailability {
    pub camera_present: bool,
    pub microphone_present: bool,
    pub screen_capture_permitted: bool,
}

impl DeviceAvailability {
    /// Everything present
    pub fn all() -> Self {
        Self {
            camera_present: true,
            microphone_present: true,
            screen_capture_permitted: true,
        }
    }

    pub fn all_available(&self) -> bool {
        self.camera_present && self.microphone_present && self.screen_capture_permitted
    }

    /// Names of the devices that are missing
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.camera_present {
            missing.push("camera");
        }
        if !self.microphone_present {
            missing.push("microphone");
        }
        if !self.screen_capture_permitted {
            missing.push("screen capture");
        }
        missing
    }

    /// Per-device labels for the home view
    pub fn report(&self) -> DeviceStatusReport {
        DeviceStatusReport {
            camera: if self.camera_present {
                "Camera: OK"
            } else {
                "Camera: Not available"
            }
            .to_string(),
            microphone: if self.microphone_present {
                "Microphone: OK"
            } else {
                "Microphone: Not available"
            }
            .to_string(),
            screen: if self.screen_capture_permitted {
                "Screen: OK"
            } else {
                "Screen: Not available or permission denied"
            }
            .to_string(),
            can_start: self.all_available(),
        }
    }
}

/// Status lines shown before a session starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusReport {
    pub camera: String,
    pub microphone: String,
    pub screen: String,

    /// Whether the start action should be enabled
    pub can_start: bool,
}

/// Queries device availability.
///
/// A missing device is a normal result, never an error.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn probe(&self) -> DeviceAvailability;
}

/// Check if screen recording permission is granted
pub fn has_screen_recording_permission() -> bool {
    #[cfg(target_os = "macos")]
    {
        crate::capture::macos::permissions::has_screen_recording_permission()
    }

    // Other platforms have no permission gate; the probe grab decides
    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

/// Request screen recording permission
pub fn request_screen_recording_permission() -> bool {
    #[cfg(target_os = "macos")]
    {
        crate::capture::macos::permissions::request_screen_recording_permission()
    }

    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}
