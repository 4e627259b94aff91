//! Session runtime
//!
//! One tokio task owns the [`SessionController`] and drains a single queue of
//! [`SessionEvent`]s. UI commands, host window signals, recorder faults and
//! timer ticks all travel through that queue, so they are applied one at a
//! time in arrival order. [`SessionHandle`] is the cloneable front door.

use super::controller::{ControlEvent, ControlSink, SessionController, SessionSnapshot};
use super::monitor::{HostFocus, WindowSignal};
use super::state::{SessionNotification, SessionRecord, SessionState};
use crate::capture::traits::{DeviceAvailability, DeviceProbe};
use crate::config::EvaluationConfig;
use crate::recorder::coordinator::RecordingCoordinator;
use crate::utils::error::SessionError;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Requests from the UI, each with its reply channel
#[derive(Debug)]
pub enum SessionCommand {
    Start(oneshot::Sender<Result<(), SessionError>>),
    Stop(oneshot::Sender<Result<SessionRecord, SessionError>>),
    GoHome(oneshot::Sender<Result<(), SessionError>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Everything the runtime task processes
#[derive(Debug)]
pub enum SessionEvent {
    Command(SessionCommand),
    Control(ControlEvent),
}

/// Owner task for the controller
pub struct SessionRuntime {
    controller: SessionController,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionRuntime {
    /// Build the controller and start its task.
    ///
    /// The task ends after [`SessionHandle::shutdown`] or once every handle
    /// has been dropped.
    pub fn spawn(
        config: EvaluationConfig,
        probe: Arc<dyn DeviceProbe>,
        coordinator: RecordingCoordinator,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (events_tx, events) = mpsc::unbounded_channel();

        // Internal sources hold a weak sender so they never keep the task alive
        let weak = events_tx.downgrade();
        let control: ControlSink = Arc::new(move |event| {
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(SessionEvent::Control(event));
            }
        });

        let controller = SessionController::new(config, probe.clone(), coordinator, control);
        let handle = SessionHandle {
            events: events_tx,
            notify_tx: controller.notifier(),
            host_focus: controller.host_focus(),
            probe,
        };

        let runtime = SessionRuntime { controller, events };
        let task = tokio::spawn(runtime.run());
        (handle, task)
    }

    async fn run(mut self) {
        tracing::debug!("Session runtime started");

        while let Some(event) = self.events.recv().await {
            match event {
                SessionEvent::Command(command) => {
                    if !self.handle_command(command).await {
                        tracing::debug!("Session runtime stopped");
                        return;
                    }
                }
                SessionEvent::Control(event) => self.controller.handle_event(event).await,
            }
        }

        tracing::info!("All session handles dropped, shutting down");
        self.controller.shutdown().await;
    }

    /// Returns false once the runtime should exit
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Start(reply) => {
                let result = self.controller.start().await;
                if let Err(e) = &result {
                    tracing::warn!("Start rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            SessionCommand::Stop(reply) => {
                let _ = reply.send(self.controller.stop().await);
            }
            SessionCommand::GoHome(reply) => {
                let _ = reply.send(self.controller.go_home().await);
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            SessionCommand::Shutdown(reply) => {
                self.controller.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}

/// Cloneable handle to a running session controller
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    notify_tx: broadcast::Sender<SessionNotification>,
    host_focus: HostFocus,
    probe: Arc<dyn DeviceProbe>,
}

impl SessionHandle {
    pub async fn request_start(&self) -> Result<(), SessionError> {
        self.call(SessionCommand::Start).await?
    }

    pub async fn request_stop(&self) -> Result<SessionRecord, SessionError> {
        self.call(SessionCommand::Stop).await?
    }

    pub async fn request_go_home(&self) -> Result<(), SessionError> {
        self.call(SessionCommand::GoHome).await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.call(SessionCommand::Snapshot).await
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        Ok(self.snapshot().await?.state)
    }

    pub async fn last_record(&self) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.snapshot().await?.last_record)
    }

    /// Forward a host window signal, stamped with its delivery time.
    ///
    /// The focus state is recorded right away, so a session that is still
    /// starting sees it when monitoring arms.
    pub fn window_signal(&self, signal: WindowSignal) -> Result<(), SessionError> {
        let at = self.host_focus.record(signal);
        self.events
            .send(SessionEvent::Control(ControlEvent::Window { signal, at }))
            .map_err(|_| SessionError::RuntimeClosed)
    }

    /// Probe devices for the home view. Runs outside the queue and never
    /// changes session state.
    pub async fn check_devices(&self) -> DeviceAvailability {
        self.probe.probe().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notify_tx.subscribe()
    }

    /// Tear down any active session and stop the runtime
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.call(SessionCommand::Shutdown).await
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(SessionEvent::Command(command(tx)))
            .map_err(|_| SessionError::RuntimeClosed)?;
        rx.await.map_err(|_| SessionError::RuntimeClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::probe::StaticDeviceProbe;
    use crate::recorder::mock::MockChannel;
    use crate::recorder::state::PipelineKind;

    fn spawn_runtime() -> (SessionHandle, JoinHandle<()>) {
        let (camera, _) = MockChannel::new(PipelineKind::Camera);
        let (screen, _) = MockChannel::new(PipelineKind::Screen);
        let coordinator = RecordingCoordinator::new(Box::new(camera), Box::new(screen)).unwrap();
        SessionRuntime::spawn(
            EvaluationConfig::default(),
            Arc::new(StaticDeviceProbe::new(DeviceAvailability::all())),
            coordinator,
        )
    }

    #[tokio::test]
    async fn test_commands_round_trip() {
        let (handle, _task) = spawn_runtime();

        assert_eq!(handle.state().await.unwrap(), SessionState::Idle);
        handle.request_start().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), SessionState::Evaluating);

        let record = handle.request_stop().await.unwrap();
        assert_eq!(handle.last_record().await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_shutdown_closes_runtime() {
        let (handle, task) = spawn_runtime();
        handle.request_start().await.unwrap();

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(
            handle.request_start().await,
            Err(SessionError::RuntimeClosed)
        ));
        assert!(matches!(
            handle.window_signal(WindowSignal::Deactivated),
            Err(SessionError::RuntimeClosed)
        ));
    }

    #[tokio::test]
    async fn test_dropping_handles_ends_task() {
        let (handle, task) = spawn_runtime();
        handle.request_start().await.unwrap();
        drop(handle);
        task.await.unwrap();
    }
}
