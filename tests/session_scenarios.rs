//! End-to-end session scenarios against in-memory recorders

use proctor_shell_lib::capture::{DeviceAvailability, StaticDeviceProbe};
use proctor_shell_lib::config::EvaluationConfig;
use proctor_shell_lib::recorder::mock::{MockChannel, MockChannelHandle};
use proctor_shell_lib::recorder::{PipelineKind, PipelineState, RecordingCoordinator};
use proctor_shell_lib::session::{
    SessionHandle, SessionNotification, SessionOutcome, SessionRuntime, SessionState,
    WindowSignal,
};
use proctor_shell_lib::utils::SessionError;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

struct Rig {
    session: SessionHandle,
    task: JoinHandle<()>,
    probe: Arc<StaticDeviceProbe>,
    camera: MockChannelHandle,
    screen: MockChannelHandle,
    _output: TempDir,
}

fn rig() -> Rig {
    let output = tempfile::tempdir().unwrap();
    let config = EvaluationConfig {
        output_dir: output.path().to_path_buf(),
        ..EvaluationConfig::default()
    };

    let (camera_channel, camera) = MockChannel::new(PipelineKind::Camera);
    let (screen_channel, screen) = MockChannel::new(PipelineKind::Screen);
    let coordinator =
        RecordingCoordinator::new(Box::new(camera_channel), Box::new(screen_channel)).unwrap();
    let probe = Arc::new(StaticDeviceProbe::new(DeviceAvailability::all()));

    let (session, task) = SessionRuntime::spawn(config, probe.clone(), coordinator);
    Rig {
        session,
        task,
        probe,
        camera,
        screen,
        _output: output,
    }
}

async fn assert_nothing_recording(rig: &Rig) {
    let snapshot = rig.session.snapshot().await.unwrap();
    for handle in snapshot.recordings {
        assert_ne!(handle.state, PipelineState::Recording, "{:?}", handle.kind);
    }
    assert!(!rig.camera.is_recording());
    assert!(!rig.screen.is_recording());
}

#[tokio::test(start_paused = true)]
async fn five_second_session_reaches_summary() {
    let rig = rig();

    rig.session.request_start().await.unwrap();
    tokio::time::advance(Duration::from_secs(5)).await;
    let record = rig.session.request_stop().await.unwrap();

    assert_eq!(rig.session.state().await.unwrap(), SessionState::Summary);
    assert_eq!(record.outcome, SessionOutcome::Completed);
    assert_eq!(record.elapsed_seconds, 5);
    assert_eq!(record.summary_text(), "Elapsed Time: 5 s");
    assert!(record.has_both_outputs());

    let camera = record.camera_output_location.unwrap();
    let screen = record.screen_output_location.unwrap();
    assert!(camera.is_absolute());
    assert!(camera.ends_with("camera_recording.mp4"));
    assert!(screen.ends_with("screen_recording.mp4"));
    assert_eq!(camera.parent(), screen.parent());
    assert_nothing_recording(&rig).await;
}

#[tokio::test(start_paused = true)]
async fn timer_ticks_once_per_second() {
    let rig = rig();
    let mut rx = rig.session.subscribe();

    rig.session.request_start().await.unwrap();

    let mut elapsed = Vec::new();
    while elapsed.last() != Some(&3) {
        if let SessionNotification::Elapsed { seconds } = rx.recv().await.unwrap() {
            elapsed.push(seconds);
        }
    }
    assert_eq!(elapsed, vec![0, 1, 2, 3]);

    rig.session.request_stop().await.unwrap();
}

#[tokio::test]
async fn missing_camera_blocks_entry() {
    let rig = rig();
    rig.probe.set(DeviceAvailability {
        camera_present: false,
        ..DeviceAvailability::all()
    });

    let err = rig.session.request_start().await.unwrap_err();
    match err {
        SessionError::DeviceUnavailable(availability) => {
            assert_eq!(availability.missing(), vec!["camera"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);
    assert_eq!(rig.camera.initialize_count(), 0);
    assert_eq!(rig.screen.initialize_count(), 0);

    let snapshot = rig.session.snapshot().await.unwrap();
    assert!(snapshot
        .recordings
        .iter()
        .all(|h| h.state == PipelineState::Uninitialized));
}

#[tokio::test]
async fn screen_setup_failure_releases_camera() {
    let rig = rig();
    rig.screen.set_fail_start(true);

    let err = rig.session.request_start().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Setup {
            kind: PipelineKind::Screen,
            ..
        }
    ));
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);
    assert_eq!(rig.camera.stop_count(), 1);
    assert_nothing_recording(&rig).await;

    // A later attempt can still succeed
    rig.screen.set_fail_start(false);
    rig.session.request_start().await.unwrap();
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Evaluating);
}

#[tokio::test]
async fn window_deactivation_disqualifies() {
    let rig = rig();
    let mut rx = rig.session.subscribe();
    rig.session.request_start().await.unwrap();

    rig.session.window_signal(WindowSignal::Deactivated).unwrap();

    let snapshot = rig.session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Disqualified);
    assert!(!snapshot.monitoring);
    for handle in snapshot.recordings {
        assert_eq!(handle.state, PipelineState::Stopped);
    }

    let record = snapshot.last_record.unwrap();
    assert_eq!(record.outcome, SessionOutcome::Disqualified);
    assert_eq!(record.summary_text(), "Disqualified due to misuse");
    assert!(record.has_both_outputs());

    // Disqualification is a policy outcome, not an error notification
    while let Ok(notification) = rx.try_recv() {
        assert!(!matches!(notification, SessionNotification::Error { .. }));
    }
}

#[tokio::test]
async fn minimize_then_deactivate_disqualifies_once() {
    let rig = rig();
    let mut rx = rig.session.subscribe();
    rig.session.request_start().await.unwrap();

    rig.session
        .window_signal(WindowSignal::StateChanged { active: false })
        .unwrap();
    rig.session.window_signal(WindowSignal::Deactivated).unwrap();
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Disqualified);

    let mut disqualified = 0;
    while let Ok(notification) = rx.try_recv() {
        if let SessionNotification::StateChanged {
            state: SessionState::Disqualified,
            ..
        } = notification
        {
            disqualified += 1;
        }
    }
    assert_eq!(disqualified, 1);
    assert_eq!(rig.camera.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn screen_fault_aborts_and_stops_camera() {
    let rig = rig();
    let mut rx = rig.session.subscribe();
    rig.session.request_start().await.unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(rig.screen.inject_fault("screen capture interrupted"));

    let snapshot = rig.session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Summary);
    assert!(!snapshot.monitoring);

    let record = snapshot.last_record.unwrap();
    assert_eq!(record.outcome, SessionOutcome::Aborted);
    assert_eq!(record.elapsed_seconds, 2);
    let fault = record.fault.unwrap();
    assert_eq!(fault.kind, PipelineKind::Screen);
    assert_eq!(fault.message, "screen capture interrupted");

    assert_eq!(rig.camera.stop_count(), 1);
    assert_nothing_recording(&rig).await;

    let mut codes = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        if let SessionNotification::Error { error } = notification {
            codes.push(error.code);
        }
    }
    assert_eq!(codes, vec!["RECORDING_FAULT".to_string()]);
}

#[tokio::test]
async fn stale_fault_after_stop_is_ignored() {
    let rig = rig();
    rig.session.request_start().await.unwrap();
    let record = rig.session.request_stop().await.unwrap();

    rig.camera.inject_fault("late");
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Summary);
    assert_eq!(rig.session.last_record().await.unwrap(), Some(record));
}

#[tokio::test]
async fn stop_twice_returns_same_record() {
    let rig = rig();
    rig.session.request_start().await.unwrap();

    let first = rig.session.request_stop().await.unwrap();
    let second = rig.session.request_stop().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(rig.camera.stop_count(), 1);
    assert_eq!(rig.screen.stop_count(), 1);
}

#[tokio::test]
async fn stop_failure_is_collected_and_releases() {
    let rig = rig();
    rig.session.request_start().await.unwrap();
    rig.camera.set_fail_stop(true);

    let record = rig.session.request_stop().await.unwrap();

    assert_eq!(record.outcome, SessionOutcome::Completed);
    assert_eq!(record.stop_errors.len(), 1);
    assert_eq!(record.stop_errors[0].kind, PipelineKind::Camera);
    assert_eq!(rig.camera.release_count(), 1);
    assert_eq!(rig.screen.stop_count(), 1);
    assert!(record.screen_output_location.is_some());
}

#[tokio::test]
async fn focus_loss_outside_evaluation_is_ignored() {
    let rig = rig();
    let losses = [
        WindowSignal::Deactivated,
        WindowSignal::StateChanged { active: false },
    ];

    // Idle
    for signal in losses {
        rig.session.window_signal(signal).unwrap();
    }
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);

    // Summary, after the window is focused again
    rig.session.window_signal(WindowSignal::Activated).unwrap();
    rig.session.request_start().await.unwrap();
    rig.session.request_stop().await.unwrap();
    for signal in losses {
        rig.session.window_signal(signal).unwrap();
    }
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Summary);
    assert_eq!(
        rig.session.last_record().await.unwrap().unwrap().outcome,
        SessionOutcome::Completed
    );

    // Idle again, after a failed start
    rig.session.request_go_home().await.unwrap();
    rig.camera.set_fail_initialize(true);
    assert!(rig.session.request_start().await.is_err());
    for signal in losses {
        rig.session.window_signal(signal).unwrap();
    }
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);
}

#[tokio::test]
async fn go_home_returns_to_idle_and_allows_new_session() {
    let rig = rig();
    rig.session.request_start().await.unwrap();
    rig.session.window_signal(WindowSignal::Deactivated).unwrap();
    let disqualified = rig.session.last_record().await.unwrap().unwrap();

    rig.session.request_go_home().await.unwrap();
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);

    rig.session.window_signal(WindowSignal::Activated).unwrap();
    rig.session.request_start().await.unwrap();
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Evaluating);
    let record = rig.session.request_stop().await.unwrap();
    assert_ne!(record.session_id, disqualified.session_id);
    assert_ne!(record.camera_output_location, disqualified.camera_output_location);
    assert_eq!(rig.camera.initialize_count(), 2);
}

#[tokio::test]
async fn focus_lost_during_start_disqualifies() {
    let rig = rig();

    let (started, _) = tokio::join!(rig.session.request_start(), async {
        rig.session.window_signal(WindowSignal::Deactivated).unwrap();
    });
    started.unwrap();

    let snapshot = rig.session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Disqualified);
    assert!(!snapshot.monitoring);
    assert_eq!(
        snapshot.last_record.unwrap().outcome,
        SessionOutcome::Disqualified
    );
    assert_nothing_recording(&rig).await;
}

#[tokio::test]
async fn focus_regained_during_start_is_a_false_positive() {
    let rig = rig();

    let (started, _) = tokio::join!(rig.session.request_start(), async {
        rig.session
            .window_signal(WindowSignal::StateChanged { active: false })
            .unwrap();
        rig.session.window_signal(WindowSignal::Activated).unwrap();
    });
    started.unwrap();

    let snapshot = rig.session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Evaluating);
    assert!(snapshot.monitoring);
    assert!(rig.camera.is_recording() && rig.screen.is_recording());
}

#[tokio::test]
async fn shutdown_mid_session_releases_devices() {
    let rig = rig();
    rig.session.request_start().await.unwrap();

    rig.session.shutdown().await.unwrap();
    rig.task.await.unwrap();

    assert!(!rig.camera.is_recording());
    assert!(!rig.screen.is_recording());
    assert_eq!(rig.camera.stop_count(), 1);
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Start,
    Stop,
    Home,
    Window(WindowSignal),
    Fault(PipelineKind),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Start),
        Just(Step::Stop),
        Just(Step::Home),
        Just(Step::Window(WindowSignal::Deactivated)),
        Just(Step::Window(WindowSignal::StateChanged { active: false })),
        Just(Step::Window(WindowSignal::StateChanged { active: true })),
        Just(Step::Window(WindowSignal::Activated)),
        Just(Step::Fault(PipelineKind::Camera)),
        Just(Step::Fault(PipelineKind::Screen)),
    ]
}

/// Where a session should be after `step`, and the outcome it records on ending
fn expected(
    state: SessionState,
    step: Step,
    host_lost: bool,
) -> (SessionState, Option<SessionOutcome>) {
    use SessionState::*;
    match (state, step) {
        (Idle, Step::Start) if host_lost => (Disqualified, Some(SessionOutcome::Disqualified)),
        (Idle, Step::Start) => (Evaluating, None),
        (Evaluating, Step::Stop) => (Summary, Some(SessionOutcome::Completed)),
        (Evaluating, Step::Window(signal)) if signal.is_focus_loss() => {
            (Disqualified, Some(SessionOutcome::Disqualified))
        }
        (Evaluating, Step::Fault(_)) => (Summary, Some(SessionOutcome::Aborted)),
        (Summary | Disqualified, Step::Home) => (Idle, None),
        (state, _) => (state, None),
    }
}

async fn apply(rig: &Rig, step: Step) {
    match step {
        Step::Start => {
            let _ = rig.session.request_start().await;
        }
        Step::Stop => {
            let _ = rig.session.request_stop().await;
        }
        Step::Home => {
            let _ = rig.session.request_go_home().await;
        }
        Step::Window(signal) => rig.session.window_signal(signal).unwrap(),
        Step::Fault(PipelineKind::Camera) => {
            rig.camera.inject_fault("injected");
        }
        Step::Fault(PipelineKind::Screen) => {
            rig.screen.inject_fault("injected");
        }
    }
}

async fn check_sequence(steps: &[Step]) {
    let rig = rig();
    let mut state = SessionState::Idle;
    let mut host_lost = false;

    for (i, &step) in steps.iter().enumerate() {
        let history = &steps[..=i];
        let (want, outcome) = expected(state, step, host_lost);
        if let Step::Window(signal) = step {
            host_lost = signal.is_focus_loss();
        }

        apply(&rig, step).await;
        let snapshot = rig.session.snapshot().await.unwrap();
        assert_eq!(snapshot.state, want, "after {history:?}");

        if let Some(outcome) = outcome {
            let record = snapshot.last_record.as_ref().unwrap();
            assert_eq!(record.outcome, outcome, "after {history:?}");
        }

        assert_eq!(
            snapshot.recording,
            want == SessionState::Evaluating,
            "after {history:?}"
        );
        if want == SessionState::Evaluating {
            assert!(snapshot.monitoring, "after {history:?}");
            for handle in &snapshot.recordings {
                assert_eq!(handle.state, PipelineState::Recording, "after {history:?}");
            }
        } else {
            assert!(!snapshot.monitoring, "after {history:?}");
            for handle in &snapshot.recordings {
                assert_ne!(handle.state, PipelineState::Recording, "after {history:?}");
            }
            assert!(!rig.camera.is_recording(), "after {history:?}");
            assert!(!rig.screen.is_recording(), "after {history:?}");
        }
        state = want;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any sequence of commands, window signals and faults follows the
    /// session model: nothing records outside `Evaluating`, and only a focus
    /// loss while evaluating (or one still standing when monitoring arms)
    /// disqualifies.
    #[test]
    fn prop_session_follows_model(steps in prop::collection::vec(arb_step(), 1..32)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(check_sequence(&steps));
    }
}
