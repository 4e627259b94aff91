//! Device availability and platform permissions
//!
//! This module answers whether the camera, microphone and screen can be
//! captured before a session is allowed to start.

pub mod probe;
pub mod traits;

#[cfg(target_os = "macos")]
pub mod macos;

pub use probe::{StaticDeviceProbe, SystemDeviceProbe};
pub use traits::{DeviceAvailability, DeviceProbe, DeviceStatusReport};

// Re-export permission functions from traits (which delegates to platform)
pub use traits::{has_screen_recording_permission, request_screen_recording_permission};
