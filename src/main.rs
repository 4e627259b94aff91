//! proctor-shell - console host for proctored evaluation sessions
//!
//! Reads host actions from stdin, one per line:
//! - `start`, `stop`, `home` - session controls
//! - `status`, `devices` - queries
//! - `blur`, `focus`, `minimize`, `restore` - simulated window signals
//! - `f11`, `esc` - fullscreen keys, ignored while evaluating
//! - `quit`

use anyhow::{Context, Result};
use clap::Parser;
use proctor_shell_lib::capture;
use proctor_shell_lib::commands::session as commands;
use proctor_shell_lib::config::EvaluationConfig;
use proctor_shell_lib::session::state::timer_label;
use proctor_shell_lib::session::{SessionHandle, SessionNotification, SessionState, WindowSignal};
use proctor_shell_lib::{init_tracing, spawn_session, RecorderBackend};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};

#[derive(Parser)]
#[command(name = "proctor-shell")]
#[command(about = "Proctored fullscreen evaluation with camera and screen recording")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for session recordings (overrides the config file)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Use in-memory recorders and assume every device is present
    #[arg(long)]
    simulate: bool,
}

/// One line of host input
#[derive(Debug, Clone, PartialEq)]
enum HostInput {
    Start,
    Stop,
    Home,
    Status,
    Devices,
    Window(WindowSignal),
    FullscreenKey(String),
    Help,
    Quit,
}

fn parse_input(line: &str) -> Option<HostInput> {
    let input = match line.trim().to_lowercase().as_str() {
        "start" => HostInput::Start,
        "stop" => HostInput::Stop,
        "home" => HostInput::Home,
        "status" => HostInput::Status,
        "devices" => HostInput::Devices,
        "blur" => HostInput::Window(WindowSignal::Deactivated),
        "focus" => HostInput::Window(WindowSignal::Activated),
        "minimize" => HostInput::Window(WindowSignal::StateChanged { active: false }),
        "restore" => HostInput::Window(WindowSignal::StateChanged { active: true }),
        key @ ("f11" | "esc") => HostInput::FullscreenKey(key.to_uppercase()),
        "help" | "?" => HostInput::Help,
        "quit" | "exit" => HostInput::Quit,
        _ => return None,
    };
    Some(input)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = EvaluationConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }

    tracing::info!("Starting Proctor Shell v{}", env!("CARGO_PKG_VERSION"));

    let backend = if cli.simulate {
        RecorderBackend::Simulated
    } else {
        RecorderBackend::Ffmpeg
    };
    let (session, task) = spawn_session(config, backend)?;

    tokio::spawn(print_notifications(session.subscribe()));
    print_devices(&session).await;
    println!("Type 'help' for commands.");

    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_input(&line) {
            Some(HostInput::Quit) => break,
            Some(input) => handle_input(&session, input).await,
            None => println!("Unknown command: {}", line.trim()),
        }
    }

    session.shutdown().await?;
    task.await.context("session runtime panicked")?;
    Ok(())
}

/// Read stdin on its own thread. A blocked read never holds up shutdown;
/// the thread simply dies with the process.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

async fn handle_input(session: &SessionHandle, input: HostInput) {
    match input {
        HostInput::Start => {
            // A command typed into the console means the console has focus
            if let Err(e) = commands::send_window_signal(session, WindowSignal::Activated) {
                println!("{}", e.message);
                return;
            }
            if let Err(e) = commands::request_start(session).await {
                println!("Cannot start: {}", e.message);
            }
        }
        HostInput::Stop => match commands::request_stop(session).await {
            Ok(record) => println!("{}", record.summary_text()),
            Err(e) => println!("Cannot stop: {}", e.message),
        },
        HostInput::Home => {
            if let Err(e) = commands::request_go_home(session).await {
                println!("{}", e.message);
            }
        }
        HostInput::Status => match commands::get_session_state(session).await {
            Ok(snapshot) => match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => println!("{json}"),
                Err(e) => println!("Cannot render status: {e}"),
            },
            Err(e) => println!("{}", e.message),
        },
        HostInput::Devices => print_devices(session).await,
        HostInput::Window(signal) => {
            if let Err(e) = commands::send_window_signal(session, signal) {
                println!("{}", e.message);
            }
        }
        HostInput::FullscreenKey(key) => {
            let evaluating = matches!(session.state().await, Ok(SessionState::Evaluating));
            if evaluating {
                tracing::info!("{} ignored during evaluation", key);
            } else {
                println!("{key}: fullscreen toggled");
            }
        }
        HostInput::Help => println!(
            "start | stop | home | status | devices | blur | focus | minimize | restore | f11 | esc | quit"
        ),
        HostInput::Quit => {}
    }
}

async fn print_devices(session: &SessionHandle) {
    match commands::check_devices(session).await {
        Ok(report) => {
            println!("{}", report.camera);
            println!("{}", report.microphone);
            println!("{}", report.screen);

            if !capture::has_screen_recording_permission()
                && !capture::request_screen_recording_permission()
            {
                open_permission_settings();
            }

            if !report.can_start {
                println!("Start unavailable until every device is present.");
            }
        }
        Err(e) => println!("Device check failed: {}", e.message),
    }
}

fn open_permission_settings() {
    #[cfg(target_os = "macos")]
    {
        capture::macos::open_screen_recording_preferences();
    }

    #[cfg(not(target_os = "macos"))]
    {
        tracing::warn!("Screen capture is not permitted");
    }
}

async fn print_notifications(mut rx: broadcast::Receiver<SessionNotification>) {
    loop {
        match rx.recv().await {
            Ok(SessionNotification::StateChanged { state, record }) => match (state, record) {
                (SessionState::Evaluating, _) => println!("Evaluation started"),
                (_, Some(record)) => println!("[{state}] {}", record.summary_text()),
                (_, None) => println!("[{state}]"),
            },
            Ok(SessionNotification::Elapsed { seconds }) => println!("{}", timer_label(seconds)),
            Ok(SessionNotification::Error { error }) => println!("Error: {}", error.message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Notification printer skipped {} messages", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
