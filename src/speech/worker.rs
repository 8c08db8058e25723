//! The speech worker: one dedicated OS thread, one engine, one generation.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted ──engine init ok──▶ Running ──stop()──▶ Stopping ──loop exit──▶ Stopped
//!            ──engine init err─────────────────────────────────────────────▶ Stopped
//! ```
//!
//! The loop polls the shared [`SpeechQueue`] with a bounded timeout so the
//! cancellation token is noticed even when nothing is queued.  It exits on
//! a shutdown sentinel for its own generation or on cancellation.  Engine
//! disposal and the final `Stopped` transition run from guards, so they
//! happen on every exit path including a panic inside the engine.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::speech::cancel::CancellationToken;
use crate::speech::engine::{SpeechEngine, SpeechEngineFactory, SpeechError};
use crate::speech::queue::{SpeechQueue, SpeechTask};

// ---------------------------------------------------------------------------
// WorkerState / Readiness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    /// Short label for the status line.
    pub fn label(&self) -> &'static str {
        match self {
            WorkerState::NotStarted => "not started",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        }
    }
}

/// Outcome of engine initialisation, observable from the owning thread.
#[derive(Debug, Clone, Default)]
pub enum Readiness {
    #[default]
    Pending,
    Ready,
    Failed(SpeechError),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

#[derive(Debug, Default)]
struct Status {
    state: WorkerState,
    readiness: Readiness,
}

#[derive(Debug, Default)]
struct Shared {
    status: Mutex<Status>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut Status)) {
        f(&mut self.lock());
        self.changed.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Disposes the engine when the loop exits.
struct EngineGuard(Box<dyn SpeechEngine>);

impl Drop for EngineGuard {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

/// Marks the worker `Stopped` and signals the owner on thread exit.
struct ExitGuard {
    shared: Arc<Shared>,
    done: mpsc::Sender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.shared.update(|s| {
            s.state = WorkerState::Stopped;
            if matches!(s.readiness, Readiness::Pending) {
                s.readiness = Readiness::Failed(SpeechError::Init("worker exited during init".into()));
            }
        });
        let _ = self.done.send(());
    }
}

// ---------------------------------------------------------------------------
// SpeechWorker
// ---------------------------------------------------------------------------

/// Handle to one running worker thread.
///
/// Dropping the handle without calling [`stop`](Self::stop) cancels the
/// worker but does not wait for it.
pub struct SpeechWorker {
    generation: u64,
    token: CancellationToken,
    queue: Arc<SpeechQueue>,
    shared: Arc<Shared>,
    done: mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl SpeechWorker {
    /// Start a worker thread for `generation`.  The engine is created on the
    /// new thread; watch [`readiness`](Self::readiness) for the outcome.
    pub fn spawn(
        generation: u64,
        queue: Arc<SpeechQueue>,
        factory: Arc<dyn SpeechEngineFactory>,
        poll_interval: Duration,
    ) -> Result<Self, SpeechError> {
        let token = CancellationToken::new();
        let shared = Arc::new(Shared::default());
        let (done_tx, done_rx) = mpsc::channel();

        let thread = {
            let token = token.clone();
            let queue = Arc::clone(&queue);
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name(format!("speech-worker-{generation}"))
                .spawn(move || {
                    let exit = ExitGuard {
                        shared: Arc::clone(&shared),
                        done: done_tx,
                    };
                    run_loop(generation, &queue, &token, factory.as_ref(), poll_interval, &shared);
                    drop(exit);
                })
                .map_err(|e| SpeechError::Spawn(e.to_string()))?
        };

        log::debug!("speech-worker: spawned generation {generation}");
        Ok(Self {
            generation,
            token,
            queue,
            shared,
            done: done_rx,
            thread: Some(thread),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> WorkerState {
        self.shared.lock().state
    }

    pub fn readiness(&self) -> Readiness {
        self.shared.lock().readiness.clone()
    }

    /// Block until engine init has succeeded or failed, or `timeout` passes.
    pub fn wait_ready(&self, timeout: Duration) -> Readiness {
        let deadline = Instant::now() + timeout;
        let mut status = self.shared.lock();
        while matches!(status.readiness, Readiness::Pending) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(status, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            status = guard;
        }
        status.readiness.clone()
    }

    /// Request termination and wait up to `timeout` for the thread to exit.
    ///
    /// Returns `true` when the thread was observed to exit.  On `false` the
    /// thread is left to finish its current utterance and exit on its own;
    /// its cancelled token guarantees it speaks nothing further.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.token.cancel();
        self.shared.update(|s| {
            if s.state != WorkerState::Stopped {
                s.state = WorkerState::Stopping;
            }
        });
        self.queue.push_front(SpeechTask::Shutdown {
            generation: self.generation,
        });

        let exited = match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        self.queue.remove_sentinels(self.generation);

        match self.thread.take() {
            Some(thread) if exited => {
                if thread.join().is_err() {
                    log::error!("speech-worker: generation {} panicked", self.generation);
                }
            }
            Some(_) => log::warn!(
                "speech-worker: generation {} did not exit within {:?}; detaching",
                self.generation,
                timeout
            ),
            None => {}
        }
        exited
    }
}

impl Drop for SpeechWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.token.cancel();
            self.queue.push_front(SpeechTask::Shutdown {
                generation: self.generation,
            });
        }
    }
}

impl std::fmt::Debug for SpeechWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechWorker")
            .field("generation", &self.generation)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

fn run_loop(
    generation: u64,
    queue: &SpeechQueue,
    token: &CancellationToken,
    factory: &dyn SpeechEngineFactory,
    poll_interval: Duration,
    shared: &Shared,
) {
    let mut engine = match factory.init() {
        Ok(engine) => EngineGuard(engine),
        Err(err) => {
            log::error!("speech-worker: engine init failed: {err}");
            shared.update(|s| s.readiness = Readiness::Failed(err));
            return;
        }
    };
    shared.update(|s| {
        s.readiness = Readiness::Ready;
        if s.state == WorkerState::NotStarted {
            s.state = WorkerState::Running;
        }
    });
    log::info!("speech-worker: generation {generation} ready");

    while !token.is_cancelled() {
        let Some(task) = queue.pop_timeout(poll_interval) else {
            continue;
        };
        match task {
            SpeechTask::Shutdown { generation: target } if target == generation => break,
            SpeechTask::Shutdown { generation: target } => {
                log::debug!("speech-worker: discarding stale sentinel for generation {target}");
            }
            SpeechTask::Speak(text) => {
                if token.is_cancelled() {
                    queue.push_front(SpeechTask::Speak(text));
                    break;
                }
                log::debug!("speech-worker: speaking {} chars", text.chars().count());
                if let Err(err) = engine.0.speak_blocking(&text) {
                    log::warn!("speech-worker: {err}");
                }
            }
        }
    }

    log::info!("speech-worker: generation {generation} exiting");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
