//! Recording speech engine for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::speech::engine::{SpeechEngine, SpeechEngineFactory, SpeechError};

/// What every engine built by one [`RecordingFactory`] has done.
#[derive(Debug, Default)]
pub struct SpeechLog {
    spoken: Mutex<Vec<String>>,
    inits: AtomicUsize,
    disposals: AtomicUsize,
}

impl SpeechLog {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingFactory {
    log: Arc<SpeechLog>,
    fail_init: bool,
    fail_on: Option<String>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `init` fails.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Speaking exactly `text` fails.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub fn log(&self) -> Arc<SpeechLog> {
        Arc::clone(&self.log)
    }
}

struct RecordingEngine {
    log: Arc<SpeechLog>,
    fail_on: Option<String>,
}

impl SpeechEngine for RecordingEngine {
    fn speak_blocking(&mut self, text: &str) -> Result<(), SpeechError> {
        if self.fail_on.as_deref() == Some(text) {
            return Err(SpeechError::Utterance(format!("cannot say {text:?}")));
        }
        self.log.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn dispose(&mut self) {
        self.log.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

impl SpeechEngineFactory for RecordingFactory {
    fn init(&self) -> Result<Box<dyn SpeechEngine>, SpeechError> {
        self.log.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(SpeechError::Init("no voices installed".into()));
        }
        Ok(Box::new(RecordingEngine {
            log: Arc::clone(&self.log),
            fail_on: self.fail_on.clone(),
        }))
    }
}

/// Poll `cond` for up to five seconds.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
