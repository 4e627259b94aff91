//! Mock recording channel
//!
//! In-memory channel for tests and headless runs. Records every call and lets
//! the caller script initialize/start/stop failures and inject asynchronous
//! faults through the reporter it was initialized with.

use super::channel::{FaultReporter, RecordingChannel, RecordingError, RecordingResult};
use super::state::PipelineKind;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Calls observed by a mock channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Initialize(PathBuf),
    Start,
    Stop,
    Release,
}

#[derive(Debug, Default)]
struct MockState {
    fail_initialize: bool,
    fail_start: bool,
    fail_stop: bool,

    /// Simulated finalization time
    stop_delay: Option<Duration>,
    recording: bool,
    output: Option<PathBuf>,
    reporter: Option<FaultReporter>,
    calls: Vec<MockCall>,
}

/// Channel that records nothing
pub struct MockChannel {
    id: String,
    kind: PipelineKind,
    state: Arc<Mutex<MockState>>,
}

/// Test-side control of a [`MockChannel`]
#[derive(Clone)]
pub struct MockChannelHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new(kind: PipelineKind) -> (Self, MockChannelHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let channel = Self {
            id: format!("mock-{}", kind.label().to_lowercase()),
            kind,
            state: state.clone(),
        };
        (channel, MockChannelHandle { state })
    }
}

impl MockChannelHandle {
    pub fn set_fail_initialize(&self, fail: bool) {
        self.state.lock().fail_initialize = fail;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.state.lock().fail_stop = fail;
    }

    /// Make `stop` take `delay` before it returns
    pub fn set_stop_delay(&self, delay: Duration) {
        self.state.lock().stop_delay = Some(delay);
    }

    /// Deliver an asynchronous fault as the real backend would.
    /// Returns false if the channel was never initialized.
    pub fn inject_fault(&self, message: &str) -> bool {
        let reporter = self.state.lock().reporter.clone();
        match reporter {
            Some(reporter) => {
                reporter.report(message);
                true
            }
            None => false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn initialize_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Initialize(_)))
    }

    pub fn stop_count(&self) -> usize {
        self.count(|c| *c == MockCall::Stop)
    }

    pub fn release_count(&self) -> usize {
        self.count(|c| *c == MockCall::Release)
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }
}

#[async_trait]
impl RecordingChannel for MockChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> PipelineKind {
        self.kind
    }

    async fn initialize(&mut self, output: &Path, faults: FaultReporter) -> RecordingResult<()> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Initialize(output.to_path_buf()));
        if state.fail_initialize {
            return Err(RecordingError::DeviceNotFound(format!(
                "{} unavailable",
                self.kind.label()
            )));
        }
        state.output = Some(output.to_path_buf());
        state.reporter = Some(faults);
        Ok(())
    }

    async fn start(&mut self) -> RecordingResult<()> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Start);
        if state.fail_start {
            return Err(RecordingError::Backend("mock start failure".to_string()));
        }
        if state.recording {
            return Err(RecordingError::AlreadyRecording);
        }
        state.recording = true;
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<PathBuf> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(MockCall::Stop);
            state.stop_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.fail_stop {
            return Err(RecordingError::Backend("mock stop failure".to_string()));
        }
        if !state.recording {
            return Err(RecordingError::NotRecording);
        }
        state.recording = false;
        state.output.clone().ok_or(RecordingError::NotInitialized)
    }

    async fn release(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Release);
        state.recording = false;
        state.reporter = None;
    }
}
