//! Evaluation session controller
//!
//! The state machine at the core of the shell. It gates entry on device
//! availability, drives the recording coordinator, owns the session timer and
//! reacts to focus loss and recorder faults.
//!
//! The controller is not thread-safe by design: it is owned by a single
//! runtime task and every asynchronous source (window signals, recorder
//! faults, timer ticks) reaches it as a [`ControlEvent`] through that task's
//! queue.

use super::monitor::{FocusLost, HostFocus, IntegrityMonitor, WindowSignal};
use super::state::{SessionNotification, SessionOutcome, SessionRecord, SessionState};
use crate::capture::traits::DeviceProbe;
use crate::config::EvaluationConfig;
use crate::recorder::channel::{FaultSink, PipelineFault, RecordingError};
use crate::recorder::coordinator::RecordingCoordinator;
use crate::recorder::state::{ErrorInfo, PipelineKind, RecordingHandle};
use crate::utils::error::{ErrorResponse, SessionError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Asynchronous inputs serialized onto the controller
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// Host window signal, stamped when the host delivered it
    Window { signal: WindowSignal, at: Instant },
    /// Raised by a recorder backend
    Fault(PipelineFault),
    /// Timer tick for a session
    Tick { session_id: Uuid },
}

/// Enqueues control events onto the controller's owning task
pub type ControlSink = Arc<dyn Fn(ControlEvent) + Send + Sync>;

/// Why the current session is ending
#[derive(Debug)]
enum SessionEnd {
    UserStop,
    FocusLost,
    Fault(ErrorInfo),
    Shutdown,
}

struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Utc>,

    /// Monotonic start; elapsed time is never derived from the wall clock
    clock: Instant,

    /// Window signals delivered before this instant predate the monitor
    monitor_armed_at: Instant,

    ticker: JoinHandle<()>,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub elapsed_seconds: Option<u64>,
    pub monitoring: bool,

    /// Either device is still writing
    pub recording: bool,
    pub recordings: [RecordingHandle; 2],
    pub last_record: Option<SessionRecord>,
}

/// The evaluation state machine
pub struct SessionController {
    config: EvaluationConfig,
    state: SessionState,
    probe: Arc<dyn DeviceProbe>,
    coordinator: RecordingCoordinator,
    monitor: IntegrityMonitor,
    host_focus: HostFocus,

    /// Filled by the monitor callback, drained in the same event cycle
    focus_lost: Arc<Mutex<Option<FocusLost>>>,

    active: Option<ActiveSession>,
    last_record: Option<SessionRecord>,
    control: ControlSink,
    notify_tx: broadcast::Sender<SessionNotification>,
}

impl SessionController {
    /// Create a controller in the `Idle` state.
    ///
    /// `control` must feed events back into whatever task owns the controller.
    pub fn new(
        config: EvaluationConfig,
        probe: Arc<dyn DeviceProbe>,
        coordinator: RecordingCoordinator,
        control: ControlSink,
    ) -> Self {
        let (notify_tx, _) = broadcast::channel(100);
        Self {
            config,
            state: SessionState::Idle,
            probe,
            coordinator,
            monitor: IntegrityMonitor::new(),
            host_focus: HostFocus::new(),
            focus_lost: Arc::new(Mutex::new(None)),
            active: None,
            last_record: None,
            control,
            notify_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Subscribe to state and timer notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notify_tx.subscribe()
    }

    /// Sender side of the notification stream, for handles that subscribe later
    pub fn notifier(&self) -> broadcast::Sender<SessionNotification> {
        self.notify_tx.clone()
    }

    /// Focus tracker that signal producers record into before enqueueing
    pub fn host_focus(&self) -> HostFocus {
        self.host_focus.clone()
    }

    pub fn last_record(&self) -> Option<&SessionRecord> {
        self.last_record.as_ref()
    }

    /// Whether the integrity monitor is armed
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_active()
    }

    pub fn recordings(&self) -> [RecordingHandle; 2] {
        self.coordinator.handles()
    }

    /// Seconds since the current session started
    pub fn elapsed_seconds(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.clock.elapsed().as_secs())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session_id: self.active.as_ref().map(|a| a.id),
            elapsed_seconds: self.elapsed_seconds(),
            monitoring: self.monitor.is_active(),
            recording: self.coordinator.is_recording(),
            recordings: self.coordinator.handles(),
            last_record: self.last_record.clone(),
        }
    }

    /// Start a session.
    ///
    /// Device and setup failures are returned here and never enter
    /// `Evaluating`; any partially acquired recorder is released first.
    /// If the host window is out of focus when monitoring arms, the session
    /// is disqualified before this returns.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                action: "start a session",
            });
        }

        let probe = self.probe.clone();
        let availability = probe.probe().await;
        if !availability.all_available() {
            tracing::warn!("Start blocked, missing: {:?}", availability.missing());
            return Err(SessionError::DeviceUnavailable(availability));
        }

        let session_id = Uuid::new_v4();
        let outputs = self
            .config
            .session_outputs(session_id)
            .map_err(|e| SessionError::Setup {
                kind: PipelineKind::Camera,
                source: RecordingError::Io(e),
            })?;

        tracing::info!("Starting evaluation session {}", session_id);
        self.coordinator
            .prepare_session(&outputs, session_id, self.fault_sink())
            .await?;
        self.coordinator.start_all().await?;

        let clock = Instant::now();
        let ticker = self.spawn_ticker(session_id);

        // Armed only once both recorders run
        let focus_lost = self.focus_lost.clone();
        *focus_lost.lock() = None;
        self.monitor.activate(session_id, move |lost| {
            *focus_lost.lock() = Some(lost);
        });
        let (monitor_armed_at, lost_while_starting) = self.host_focus.arm();

        self.active = Some(ActiveSession {
            id: session_id,
            started_at: Utc::now(),
            clock,
            monitor_armed_at,
            ticker,
        });
        self.last_record = None;
        self.transition(SessionState::Evaluating, None);
        self.notify(SessionNotification::Elapsed { seconds: 0 });

        // Signals stamped before arming are not replayed, so a loss that was
        // never followed by reactivation is caught here
        if lost_while_starting {
            tracing::warn!("Window lost focus while recorders were starting");
            self.finish(SessionEnd::FocusLost).await;
        }
        Ok(())
    }

    /// Stop the session at the participant's request.
    ///
    /// Calling stop again after the session ended returns the same record.
    pub async fn stop(&mut self) -> Result<SessionRecord, SessionError> {
        match self.state {
            SessionState::Evaluating => Ok(self.finish(SessionEnd::UserStop).await),
            SessionState::Summary | SessionState::Disqualified => {
                self.last_record.clone().ok_or(SessionError::InvalidTransition {
                    state: self.state,
                    action: "stop",
                })
            }
            SessionState::Idle => Err(SessionError::InvalidTransition {
                state: self.state,
                action: "stop",
            }),
        }
    }

    /// Return to the home view after a session ended
    pub async fn go_home(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::Evaluating => Err(SessionError::InvalidTransition {
                state: self.state,
                action: "return home",
            }),
            SessionState::Summary | SessionState::Disqualified => {
                if self.coordinator.holds_resources() {
                    tracing::warn!("Recorders still held on the way home, releasing");
                    self.coordinator.stop_all().await;
                }
                self.transition(SessionState::Idle, None);
                Ok(())
            }
        }
    }

    /// Best-effort teardown at process exit
    pub async fn shutdown(&mut self) {
        if self.state == SessionState::Evaluating {
            tracing::warn!("Shutting down with an active session");
            self.finish(SessionEnd::Shutdown).await;
        } else if self.coordinator.holds_resources() {
            self.coordinator.stop_all().await;
        }
        self.monitor.deactivate();
    }

    /// React to one asynchronous event
    pub async fn handle_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Window { signal, at } => {
                self.host_focus.observe(signal, at);
                self.on_window_signal(signal, at);
                let lost = self.focus_lost.lock().take();
                if let Some(lost) = lost {
                    if self.is_current(lost.session_id) {
                        self.finish(SessionEnd::FocusLost).await;
                    } else {
                        tracing::debug!(
                            "Ignoring focus loss for inactive session {}",
                            lost.session_id
                        );
                    }
                }
            }
            ControlEvent::Fault(fault) => {
                if self.is_current(fault.session_id) && self.coordinator.mark_failed(&fault) {
                    self.finish(SessionEnd::Fault(fault.error)).await;
                } else {
                    tracing::debug!("Ignoring stale recorder fault: {}", fault.error);
                }
            }
            ControlEvent::Tick { session_id } => {
                if self.is_current(session_id) {
                    if let Some(seconds) = self.elapsed_seconds() {
                        self.notify(SessionNotification::Elapsed { seconds });
                    }
                }
            }
        }
    }

    fn on_window_signal(&mut self, signal: WindowSignal, at: Instant) {
        let Some(active) = &self.active else {
            return;
        };
        if at < active.monitor_armed_at {
            tracing::debug!("Ignoring {:?} delivered before monitoring began", signal);
            return;
        }
        self.monitor.observe(signal);
    }

    fn is_current(&self, session_id: Uuid) -> bool {
        self.state == SessionState::Evaluating
            && self.active.as_ref().map(|a| a.id) == Some(session_id)
    }

    /// Leave `Evaluating`: monitor off, recorders stopped, timer stopped,
    /// record finalized, then the state changes.
    async fn finish(&mut self, end: SessionEnd) -> SessionRecord {
        self.monitor.deactivate();

        let active = self.active.take();
        let elapsed_seconds = active
            .as_ref()
            .map(|a| a.clock.elapsed().as_secs())
            .unwrap_or(0);

        let report = self.coordinator.stop_all().await;

        let (session_id, started_at) = match active {
            Some(active) => {
                active.ticker.abort();
                (active.id, active.started_at)
            }
            None => (Uuid::nil(), Utc::now()),
        };

        let (outcome, next_state, fault) = match end {
            SessionEnd::UserStop => (SessionOutcome::Completed, SessionState::Summary, None),
            SessionEnd::FocusLost => (
                SessionOutcome::Disqualified,
                SessionState::Disqualified,
                None,
            ),
            SessionEnd::Fault(info) => (SessionOutcome::Aborted, SessionState::Summary, Some(info)),
            SessionEnd::Shutdown => (SessionOutcome::Aborted, SessionState::Summary, None),
        };

        let stop_errors = report.errors.clone();
        let record = SessionRecord::new(
            session_id,
            started_at,
            elapsed_seconds,
            outcome,
            report,
            fault.clone(),
        );

        tracing::info!(
            "Session {} ended: {:?} after {}s",
            session_id,
            outcome,
            elapsed_seconds
        );

        self.last_record = Some(record.clone());
        self.transition(next_state, Some(record.clone()));

        if let Some(info) = fault {
            self.notify_error(&SessionError::RecordingFault(info));
        }
        if !stop_errors.is_empty() {
            self.notify_error(&SessionError::Stop(stop_errors));
        }

        record
    }

    fn fault_sink(&self) -> FaultSink {
        let control = self.control.clone();
        Arc::new(move |fault| control(ControlEvent::Fault(fault)))
    }

    fn spawn_ticker(&self, session_id: Uuid) -> JoinHandle<()> {
        let control = self.control.clone();
        let period = self.config.tick_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                control(ControlEvent::Tick { session_id });
            }
        })
    }

    fn transition(&mut self, state: SessionState, record: Option<SessionRecord>) {
        tracing::info!("Session state: {} -> {}", self.state, state);
        self.state = state;
        self.notify(SessionNotification::StateChanged { state, record });
    }

    fn notify_error(&self, error: &SessionError) {
        self.notify(SessionNotification::Error {
            error: ErrorResponse::from(error),
        });
    }

    fn notify(&self, notification: SessionNotification) {
        // No subscribers is fine
        let _ = self.notify_tx.send(notification);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::warn!("Controller dropped during session {}", active.id);
            active.ticker.abort();
        }
    }
}
