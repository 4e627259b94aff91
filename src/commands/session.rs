//! Session command handlers
//!
//! The UI boundary. Every command goes through the session runtime's queue and
//! failures come back as [`ErrorResponse`]s the UI can display directly.

use crate::capture::traits::DeviceStatusReport;
use crate::session::{SessionHandle, SessionRecord, SessionSnapshot, WindowSignal};
use crate::utils::error::ErrorResponse;

/// Start an evaluation session.
///
/// Probes devices first; a missing device or a recorder that cannot be set up
/// leaves the session in `Idle`.
pub async fn request_start(session: &SessionHandle) -> Result<(), ErrorResponse> {
    tracing::info!("Start requested");
    session.request_start().await.map_err(ErrorResponse::from)
}

/// Stop the running session and return its record
pub async fn request_stop(session: &SessionHandle) -> Result<SessionRecord, ErrorResponse> {
    tracing::info!("Stop requested");
    session.request_stop().await.map_err(ErrorResponse::from)
}

/// Leave the summary or disqualified view
pub async fn request_go_home(session: &SessionHandle) -> Result<(), ErrorResponse> {
    session.request_go_home().await.map_err(ErrorResponse::from)
}

pub async fn get_session_state(session: &SessionHandle) -> Result<SessionSnapshot, ErrorResponse> {
    session.snapshot().await.map_err(ErrorResponse::from)
}

pub async fn get_last_record(
    session: &SessionHandle,
) -> Result<Option<SessionRecord>, ErrorResponse> {
    session.last_record().await.map_err(ErrorResponse::from)
}

/// Device status lines for the home view
pub async fn check_devices(session: &SessionHandle) -> Result<DeviceStatusReport, ErrorResponse> {
    Ok(session.check_devices().await.report())
}

/// Forward a focus or window-state change from the host window
pub fn send_window_signal(
    session: &SessionHandle,
    signal: WindowSignal,
) -> Result<(), ErrorResponse> {
    session.window_signal(signal).map_err(ErrorResponse::from)
}
