//! [`SpeechService`]: the queue plus whichever worker currently drains it.

use std::sync::Arc;
use std::time::Duration;

use crate::config::SpeechConfig;
use crate::speech::engine::{SpeechEngineFactory, SpeechError};
use crate::speech::queue::SpeechQueue;
use crate::speech::worker::{Readiness, SpeechWorker, WorkerState};

/// Timeouts used by the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechTimings {
    /// Upper bound on how long the worker waits on an empty queue before
    /// re-checking its cancellation token.
    pub poll_interval: Duration,
    /// Bounded join when a worker is replaced by `restart`.
    pub restart_timeout: Duration,
    /// Bounded join on final shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for SpeechTimings {
    fn default() -> Self {
        Self::from_config(&SpeechConfig::default())
    }
}

impl SpeechTimings {
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            restart_timeout: Duration::from_millis(config.restart_timeout_ms),
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
        }
    }
}

/// Owns the task queue and the current [`SpeechWorker`].
///
/// Every method returns promptly except [`stop`](Self::stop),
/// [`restart`](Self::restart) and [`stop_speaking`](Self::stop_speaking),
/// which wait for the old worker up to a bounded timeout.
pub struct SpeechService {
    queue: Arc<SpeechQueue>,
    factory: Arc<dyn SpeechEngineFactory>,
    timings: SpeechTimings,
    worker: Option<SpeechWorker>,
    last_generation: u64,
}

impl SpeechService {
    pub fn new(factory: Arc<dyn SpeechEngineFactory>, timings: SpeechTimings) -> Self {
        Self {
            queue: Arc::new(SpeechQueue::new()),
            factory,
            timings,
            worker: None,
            last_generation: 0,
        }
    }

    /// Start a worker unless one is already running.
    pub fn start(&mut self) -> Result<(), SpeechError> {
        if let Some(worker) = &self.worker {
            if matches!(worker.state(), WorkerState::NotStarted | WorkerState::Running) {
                return Ok(());
            }
        }
        self.last_generation += 1;
        let worker = SpeechWorker::spawn(
            self.last_generation,
            Arc::clone(&self.queue),
            Arc::clone(&self.factory),
            self.timings.poll_interval,
        )?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Queue `text` for speaking.  Accepted even while no worker runs; the
    /// next worker picks it up.
    pub fn enqueue(&self, text: impl Into<String>) -> Result<(), SpeechError> {
        self.queue.enqueue(text)
    }

    /// Drop all queued text.  An utterance already in progress finishes.
    pub fn flush(&self) -> usize {
        let dropped = self.queue.flush();
        if dropped > 0 {
            log::debug!("speech: flushed {dropped} queued task(s)");
        }
        dropped
    }

    /// Stop the current worker, waiting at most `timeout`.  Returns `true`
    /// when there was no worker or it was observed to exit.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        match self.worker.take() {
            Some(mut worker) => worker.stop(timeout),
            None => true,
        }
    }

    /// Stop with the configured shutdown timeout.
    pub fn shutdown(&mut self) -> bool {
        self.stop(self.timings.shutdown_timeout)
    }

    /// Replace the worker with a new one built from a fresh engine.  Queued
    /// text is kept.
    pub fn restart(&mut self) -> Result<(), SpeechError> {
        if !self.stop(self.timings.restart_timeout) {
            log::warn!("speech: previous worker still busy; starting a new one anyway");
        }
        self.start()
    }

    /// Silence speech: drop queued text, then restart so the next request
    /// is spoken by a fresh worker.
    pub fn stop_speaking(&mut self) -> Result<usize, SpeechError> {
        let dropped = self.flush();
        self.restart()?;
        Ok(dropped)
    }

    pub fn state(&self) -> WorkerState {
        self.worker
            .as_ref()
            .map(SpeechWorker::state)
            .unwrap_or_default()
    }

    pub fn readiness(&self) -> Readiness {
        self.worker
            .as_ref()
            .map(SpeechWorker::readiness)
            .unwrap_or_default()
    }

    /// Block until the current worker's engine is up or has failed.
    pub fn wait_ready(&self, timeout: Duration) -> Readiness {
        self.worker
            .as_ref()
            .map(|w| w.wait_ready(timeout))
            .unwrap_or_default()
    }

    /// `true` when a worker with a live engine is running.
    pub fn is_available(&self) -> bool {
        self.state() == WorkerState::Running && self.readiness().is_ready()
    }

    pub fn generation(&self) -> u64 {
        self.last_generation
    }

    /// Number of queued text tasks.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }
}

impl Drop for SpeechService {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for SpeechService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechService")
            .field("worker", &self.worker)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
