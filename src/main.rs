//! Application entry point: headless PDF retouch shell.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the speech factory from `[speech]` and the editor session; the
//!    session starts the speech worker.
//! 5. Spawn the stdin reader thread.
//! 6. Run the event loop until `quit` or end of input: commands, status
//!    events and background saves are multiplexed with `tokio::select!`.
//! 7. Wait for any save in flight, then stop speech and close the document.

use std::io::BufRead;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use pdf_retouch::{
    config::AppConfig,
    document::{DocumentError, LopdfEngine},
    ledger::{SaveError, SaveReport},
    session::{EditorSession, SessionError, StatusEvent},
    shell::{Command, HELP},
    speech::{CommandSpeechFactory, DisabledSpeech, SpeechEngineFactory, SpeechService, SpeechTimings},
};

type SaveTask = JoinHandle<Result<SaveReport, SaveError>>;

// ---------------------------------------------------------------------------
// Background save
// ---------------------------------------------------------------------------

/// Resolves when the save in flight finishes; never resolves without one.
async fn wait_save(task: &mut Option<SaveTask>) -> Result<Result<SaveReport, SaveError>, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// A panicked or cancelled save task is reported as a failed write.
fn flatten_join(
    destination: PathBuf,
    joined: Result<Result<SaveReport, SaveError>, JoinError>,
) -> Result<SaveReport, SaveError> {
    joined.unwrap_or_else(|err| {
        Err(SaveError::Persist {
            path: destination,
            source: DocumentError::Io(std::io::Error::other(err.to_string())),
        })
    })
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Outcomes are already published on the status channel; the returned
/// error is only logged.
fn log_outcome<T>(result: Result<T, SessionError>) {
    if let Err(err) = result {
        log::debug!("command refused: {err}");
    }
}

fn dispatch(
    session: &mut EditorSession,
    command: Command,
    save_task: &mut Option<SaveTask>,
    save_destination: &mut Option<PathBuf>,
) -> ControlFlow<()> {
    match command {
        Command::Open(path) => log_outcome(session.open(&path)),
        Command::Next => log_outcome(session.next_page()),
        Command::Prev => log_outcome(session.prev_page()),
        Command::Mode(mode) => log_outcome(session.set_mode(mode)),
        Command::Click(point) => log_outcome(session.click(point)),
        Command::Replace(path) => log_outcome(session.replace_selected(path)),
        Command::Clear => log_outcome(session.clear_page_edits()),
        Command::Drag(from, to) => {
            if session.begin_draw(from).is_ok() {
                session.update_draw(to);
                log_outcome(session.end_draw(to));
            }
        }
        Command::Read(rect) => log_outcome(session.read_region(rect)),
        Command::Stop => log_outcome(session.stop_speaking()),
        Command::Save(destination) => match session.begin_save(destination.clone()) {
            Ok(job) => {
                *save_destination = Some(destination);
                *save_task = Some(tokio::task::spawn_blocking(move || {
                    let mut engine = LopdfEngine::new();
                    job.run(&mut engine)
                }));
            }
            Err(err) => log::debug!("save refused: {err}"),
        },
        Command::Render(path) => match session.compose() {
            Some(bitmap) => match bitmap.save(&path) {
                Ok(()) => println!("wrote {}", path.display()),
                Err(err) => eprintln!("error: cannot write {}: {err}", path.display()),
            },
            None => eprintln!("warning: nothing to render, open a PDF first"),
        },
        Command::Status => println!("{}", session.status_line()),
        Command::Help => println!("{HELP}"),
        Command::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

fn print_status(event: &StatusEvent) {
    match event {
        StatusEvent::Info(_) => println!("{event}"),
        StatusEvent::Warning(_) | StatusEvent::Error(_) => eprintln!("{event}"),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("pdf-retouch starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (2 worker threads, saves run on the blocking pool)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Speech + session
    let factory: Arc<dyn SpeechEngineFactory> = if config.speech.enabled {
        Arc::new(CommandSpeechFactory::from_config(&config.speech))
    } else {
        Arc::new(DisabledSpeech)
    };
    let speech = SpeechService::new(factory, SpeechTimings::from_config(&config.speech));

    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<StatusEvent>();
    let mut session = EditorSession::new(Box::new(LopdfEngine::new()), speech, &config, status_tx);

    // 5. stdin reader
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to spawn stdin reader thread")?;

    // Open a document named on the command line.
    if let Some(path) = std::env::args_os().nth(1) {
        log_outcome(session.open(PathBuf::from(path).as_path()));
    }
    println!("{HELP}");

    // 6. Event loop
    rt.block_on(async {
        let mut save_task: Option<SaveTask> = None;
        let mut save_destination: Option<PathBuf> = None;

        loop {
            tokio::select! {
                Some(event) = status_rx.recv() => print_status(&event),

                joined = wait_save(&mut save_task), if save_task.is_some() => {
                    save_task = None;
                    let destination = save_destination.take().unwrap_or_default();
                    log_outcome(session.finish_save(flatten_join(destination, joined)));
                }

                line = line_rx.recv() => {
                    let Some(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(command) => {
                            if dispatch(&mut session, command, &mut save_task, &mut save_destination).is_break() {
                                break;
                            }
                        }
                        Err(err) => eprintln!("error: {err}"),
                    }
                }
            }
        }

        // 7. Let a save in flight land before tearing down.
        if let Some(task) = save_task.take() {
            log::info!("waiting for save to finish");
            let destination = save_destination.take().unwrap_or_default();
            log_outcome(session.finish_save(flatten_join(destination, task.await)));
        }
    });

    session.close();
    while let Ok(event) = status_rx.try_recv() {
        print_status(&event);
    }
    log::info!("pdf-retouch shut down");
    Ok(())
}
