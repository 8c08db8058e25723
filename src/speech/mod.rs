//! Background text-to-speech.
//!
//! # Architecture
//!
//! ```text
//!  UI thread                          speech-worker-N thread
//! ┌───────────────────┐             ┌──────────────────────────────┐
//! │ SpeechService     │             │ factory.init() ─▶ engine      │
//! │  enqueue ─────────┼──▶ SpeechQueue ──pop_timeout(poll)──▶       │
//! │  flush            │  (Mutex +   │   Speak(text) ─▶ speak_blocking│
//! │  stop / restart ──┼─▶ Condvar)  │   Shutdown{N} ─▶ exit          │
//! │                   │             │   token cancelled ─▶ exit      │
//! │ CancellationToken ┼─────────────┼─▶ guards: dispose, Stopped     │
//! └───────────────────┘             └──────────────────────────────┘
//! ```
//!
//! The queue outlives workers; each restart creates a worker with a new
//! generation, a new token and a new engine.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pdf_retouch::config::SpeechConfig;
//! use pdf_retouch::speech::{CommandSpeechFactory, SpeechService, SpeechTimings};
//!
//! let config = SpeechConfig::default();
//! let mut speech = SpeechService::new(
//!     Arc::new(CommandSpeechFactory::from_config(&config)),
//!     SpeechTimings::from_config(&config),
//! );
//! speech.start().expect("spawn worker");
//! speech.enqueue("Hello from the speech worker").expect("non-empty");
//! ```

pub mod cancel;
pub mod engine;
pub mod queue;
pub mod service;
#[cfg(test)]
pub mod testing;
pub mod worker;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use cancel::CancellationToken;
pub use engine::{
    CommandSpeechEngine, CommandSpeechFactory, DisabledSpeech, SpeechEngine,
    SpeechEngineFactory, SpeechError,
};
pub use queue::{SpeechQueue, SpeechTask};
pub use service::{SpeechService, SpeechTimings};
pub use worker::{Readiness, SpeechWorker, WorkerState};
