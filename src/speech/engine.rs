//! Speech engine capability and the external-command implementation.
//!
//! [`SpeechEngineFactory::init`] runs on the worker thread, so a
//! [`SpeechEngine`] never crosses threads and need not be `Send`.  One
//! engine lives exactly as long as one worker; a restart asks the factory
//! for a new one.
//!
//! [`CommandSpeechEngine`] speaks by running a text-to-speech program
//! (`espeak-ng`, `say`, PowerShell System.Speech) once per utterance and
//! waiting for it to exit.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::config::{SpeechConfig, TextDelivery};

// ---------------------------------------------------------------------------
// SpeechError
// ---------------------------------------------------------------------------

/// All errors that can arise from the speech subsystem.
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    /// The engine could not be created.  Speech is disabled until a restart
    /// succeeds.
    #[error("speech engine unavailable: {0}")]
    Init(String),

    /// A single utterance failed.  The worker logs it and moves on.
    #[error("utterance failed: {0}")]
    Utterance(String),

    /// Blank text was submitted for speaking.
    #[error("nothing to speak: text is empty")]
    EmptyText,

    /// The worker thread could not be started.
    #[error("failed to spawn speech worker: {0}")]
    Spawn(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A live speech engine owned by one worker.
pub trait SpeechEngine {
    /// Speak `text` and return once the utterance has finished.
    fn speak_blocking(&mut self, text: &str) -> Result<(), SpeechError>;

    /// Release engine resources.  Called exactly once, when the worker exits.
    fn dispose(&mut self) {}
}

/// Creates a fresh [`SpeechEngine`] for each worker.
pub trait SpeechEngineFactory: Send + Sync {
    fn init(&self) -> Result<Box<dyn SpeechEngine>, SpeechError>;
}

// Compile-time assertion: both traits must stay object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechEngine>, _: Box<dyn SpeechEngineFactory>) {}
};

// ---------------------------------------------------------------------------
// CommandSpeechFactory
// ---------------------------------------------------------------------------

/// Builds [`CommandSpeechEngine`]s from a [`SpeechConfig`].
#[derive(Debug, Clone)]
pub struct CommandSpeechFactory {
    program: String,
    args: Vec<String>,
    delivery: TextDelivery,
}

impl CommandSpeechFactory {
    pub fn new(program: impl Into<String>, args: Vec<String>, delivery: TextDelivery) -> Self {
        Self {
            program: program.into(),
            args,
            delivery,
        }
    }

    pub fn from_config(config: &SpeechConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.text_delivery,
        )
    }
}

impl SpeechEngineFactory for CommandSpeechFactory {
    /// Resolve the program on `PATH`.  A missing program is an init failure
    /// rather than a failure on every later utterance.
    fn init(&self) -> Result<Box<dyn SpeechEngine>, SpeechError> {
        let program = which::which(&self.program).map_err(|e| {
            SpeechError::Init(format!(
                "`{}` not found ({e}); install it or set [speech].program in settings.toml",
                self.program
            ))
        })?;
        log::debug!("speech: using {}", program.display());
        Ok(Box::new(CommandSpeechEngine {
            program,
            args: self.args.clone(),
            delivery: self.delivery,
        }))
    }
}

/// Factory used when speech is switched off in settings: every init fails,
/// so the session runs with speech features disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSpeech;

impl SpeechEngineFactory for DisabledSpeech {
    fn init(&self) -> Result<Box<dyn SpeechEngine>, SpeechError> {
        Err(SpeechError::Init("speech is disabled in settings".into()))
    }
}

// ---------------------------------------------------------------------------
// CommandSpeechEngine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CommandSpeechEngine {
    program: PathBuf,
    args: Vec<String>,
    delivery: TextDelivery,
}

impl SpeechEngine for CommandSpeechEngine {
    fn speak_blocking(&mut self, text: &str) -> Result<(), SpeechError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        match self.delivery {
            TextDelivery::Argument => {
                // text starting with `-` must not be read as an option
                cmd.arg("--").arg(text).stdin(Stdio::null());
            }
            TextDelivery::Stdin => {
                cmd.stdin(Stdio::piped());
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SpeechError::Utterance(format!("spawn {}: {e}", self.program.display())))?;

        if let Some(mut stdin) = child.stdin.take() {
            // Dropping `stdin` closes the pipe so the program sees EOF.
            if let Err(err) = stdin.write_all(text.as_bytes()) {
                drop(stdin);
                // the child may still be running; reap it either way
                let _ = child.kill();
                let _ = child.wait();
                return Err(SpeechError::Utterance(format!("write text: {err}")));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SpeechError::Utterance(format!("wait: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::Utterance(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
