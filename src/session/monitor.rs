//! Window focus integrity monitor
//!
//! Watches the host window's activation and state-change signals while a
//! session is evaluating and reports a loss of focus exactly once per
//! contiguous loss period.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

/// Focus-related signals delivered by the host window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WindowSignal {
    /// The window became the active window
    Activated,
    /// The window stopped being the active window
    Deactivated,
    /// Window state changed (minimized, restored, fullscreen toggled)
    StateChanged { active: bool },
}

impl WindowSignal {
    /// Whether this signal says the window no longer has focus
    pub fn is_focus_loss(&self) -> bool {
        matches!(
            self,
            WindowSignal::Deactivated | WindowSignal::StateChanged { active: false }
        )
    }
}

/// Raised when the monitored window loses focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusLost {
    /// Session the monitor was armed for
    pub session_id: Uuid,

    /// Signal that revealed the loss
    pub signal: WindowSignal,
}

pub type FocusLostCallback = Box<dyn FnMut(FocusLost) + Send>;

struct Armed {
    session_id: Uuid,
    on_focus_lost: FocusLostCallback,

    /// Already fired for the current loss period
    fired: bool,
}

/// Focus-loss detector, armed only while a session is evaluating
#[derive(Default)]
pub struct IntegrityMonitor {
    armed: Option<Armed>,
}

impl IntegrityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing for `session_id`
    pub fn activate<F>(&mut self, session_id: Uuid, on_focus_lost: F)
    where
        F: FnMut(FocusLost) + Send + 'static,
    {
        if let Some(previous) = &self.armed {
            tracing::warn!(
                "Integrity monitor re-armed for {} while armed for {}",
                session_id,
                previous.session_id
            );
        }

        self.armed = Some(Armed {
            session_id,
            on_focus_lost: Box::new(on_focus_lost),
            fired: false,
        });
        tracing::debug!("Integrity monitor active for session {}", session_id);
    }

    /// Stop observing. The callback is dropped, so nothing can fire after this returns.
    pub fn deactivate(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                tracing::debug!("Integrity monitor deactivated for session {}", armed.session_id);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.armed.is_some()
    }

    /// Feed one window signal. Returns true if it fired the callback.
    pub fn observe(&mut self, signal: WindowSignal) -> bool {
        let Some(armed) = self.armed.as_mut() else {
            return false;
        };

        if !signal.is_focus_loss() {
            // Focus is back; the next loss starts a new period
            armed.fired = false;
            return false;
        }

        if armed.fired {
            tracing::debug!("Focus loss already reported, ignoring {:?}", signal);
            return false;
        }

        armed.fired = true;
        tracing::warn!("Focus lost during session {} ({:?})", armed.session_id, signal);
        (armed.on_focus_lost)(FocusLost {
            session_id: armed.session_id,
            signal,
        });
        true
    }
}

/// Latest focus state reported by the host window, in any session state.
///
/// Shared between signal producers and the controller. A signal is stamped
/// under the same lock that records it, so every stamp taken before
/// [`HostFocus::arm`] is reflected in the state `arm` reads.
#[derive(Debug, Clone, Default)]
pub struct HostFocus {
    inner: Arc<Mutex<FocusRecord>>,
}

#[derive(Debug, Default)]
struct FocusRecord {
    lost: bool,
    last_signal_at: Option<Instant>,
}

impl HostFocus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal as it is delivered and return its stamp
    pub fn record(&self, signal: WindowSignal) -> Instant {
        let mut record = self.inner.lock();
        let at = Instant::now();
        record.lost = signal.is_focus_loss();
        record.last_signal_at = Some(at);
        at
    }

    /// Apply a signal stamped elsewhere. Older signals never overwrite newer ones.
    pub fn observe(&self, signal: WindowSignal, at: Instant) {
        let mut record = self.inner.lock();
        if record.last_signal_at.is_some_and(|last| at < last) {
            return;
        }
        record.lost = signal.is_focus_loss();
        record.last_signal_at = Some(at);
    }

    /// Whether the most recent signal was a loss with no reactivation after it
    pub fn is_lost(&self) -> bool {
        self.inner.lock().lost
    }

    /// Take the arming instant together with the focus state at that instant
    pub fn arm(&self) -> (Instant, bool) {
        let record = self.inner.lock();
        (Instant::now(), record.lost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_monitor() -> (IntegrityMonitor, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let cb_count = count.clone();
        let mut monitor = IntegrityMonitor::new();
        monitor.activate(Uuid::new_v4(), move |_| {
            cb_count.fetch_add(1, Ordering::SeqCst);
        });
        (monitor, count)
    }

    #[test]
    fn test_fires_once_per_loss_period() {
        let (mut monitor, count) = counting_monitor();

        assert!(monitor.observe(WindowSignal::StateChanged { active: false }));
        assert!(!monitor.observe(WindowSignal::Deactivated));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        monitor.observe(WindowSignal::Activated);
        assert!(monitor.observe(WindowSignal::Deactivated));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_inactive_monitor_never_fires() {
        let mut monitor = IntegrityMonitor::new();
        assert!(!monitor.observe(WindowSignal::Deactivated));
        assert!(!monitor.is_active());
    }

    #[test]
    fn test_no_delivery_after_deactivate() {
        let (mut monitor, count) = counting_monitor();
        assert!(monitor.deactivate());
        assert!(!monitor.observe(WindowSignal::Deactivated));
        assert!(!monitor.observe(WindowSignal::StateChanged { active: false }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!monitor.deactivate());
    }

    #[test]
    fn test_restore_does_not_fire() {
        let (mut monitor, count) = counting_monitor();
        assert!(!monitor.observe(WindowSignal::StateChanged { active: true }));
        assert!(!monitor.observe(WindowSignal::Activated));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reports_armed_session() {
        let session_id = Uuid::new_v4();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let cb_seen = seen.clone();
        let mut monitor = IntegrityMonitor::new();
        monitor.activate(session_id, move |lost| *cb_seen.lock() = Some(lost));

        monitor.observe(WindowSignal::Deactivated);
        let lost = seen.lock().take().unwrap();
        assert_eq!(lost.session_id, session_id);
        assert_eq!(lost.signal, WindowSignal::Deactivated);
    }

    #[test]
    fn test_host_focus_follows_latest_signal() {
        let focus = HostFocus::new();
        assert!(!focus.is_lost());

        focus.record(WindowSignal::Deactivated);
        assert!(focus.arm().1);

        focus.record(WindowSignal::StateChanged { active: true });
        assert!(!focus.is_lost());
    }

    #[test]
    fn test_host_focus_ignores_older_stamps() {
        let focus = HostFocus::new();
        let at = focus.record(WindowSignal::Activated);

        focus.observe(WindowSignal::Deactivated, at - Duration::from_millis(10));
        assert!(!focus.is_lost());

        focus.observe(WindowSignal::Deactivated, at + Duration::from_millis(10));
        assert!(focus.is_lost());
    }
}
