//! Evaluation session
//!
//! The controller state machine, the focus integrity monitor, and the runtime
//! task that serializes every input onto the controller.

pub mod controller;
pub mod monitor;
pub mod runtime;
pub mod state;

pub use controller::{ControlEvent, SessionController, SessionSnapshot};
pub use monitor::{HostFocus, IntegrityMonitor, WindowSignal};
pub use runtime::{SessionHandle, SessionRuntime};
pub use state::{SessionNotification, SessionOutcome, SessionRecord, SessionState};
