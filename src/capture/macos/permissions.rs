//! macOS permission handling
//!
//! Screen recording is gated by TCC on macOS; check it before attempting the
//! probe grab so the system prompt is not triggered by the probe itself.

use core_graphics::access::ScreenCaptureAccess;

/// Check if screen recording permission is granted
pub fn has_screen_recording_permission() -> bool {
    ScreenCaptureAccess.preflight()
}

/// Request screen recording permission
///
/// Shows the system prompt if permission has not been decided yet.
/// Returns true if permission was already granted.
pub fn request_screen_recording_permission() -> bool {
    ScreenCaptureAccess.request()
}

/// Open System Settings at the Screen Recording pane
pub fn open_screen_recording_preferences() {
    let url = "x-apple.systempreferences:com.apple.preference.security?Privacy_ScreenCapture";
    if let Ok(output) = std::process::Command::new("open").arg(url).output() {
        if !output.status.success() {
            tracing::warn!("Failed to open Screen Recording preferences");
        }
    }
}
