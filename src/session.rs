//! Editor session: the UI-thread controller.
//!
//! [`EditorSession`] owns the open document, the edit ledger, the current
//! selection, the page view and the speech service, and turns user actions
//! into calls on them.  Every user-visible outcome is published on the
//! [`StatusEvent`] channel; methods also return a `Result` so callers and
//! tests can react programmatically.
//!
//! # State machine
//!
//! ```text
//!            open ok
//! (no doc) ─────────▶ Viewing(page, mode) ──next/prev──▶ Viewing(page±1)
//!                        │  click (Select) ─▶ selection
//!                        │  replace ─▶ ledger += record, selection consumed
//!                        │  drag (Draw) ─▶ extract text ─▶ speech queue
//!                        │  begin_save ─▶ SavePending ─finish_save ok─▶ Viewing(0) on saved file
//!                        │                             └─ err ─▶ Viewing (unchanged)
//! ```
//!
//! The session never blocks except in [`stop_speaking`](EditorSession::stop_speaking),
//! [`close`](EditorSession::close) and the synchronous
//! [`save_as`](EditorSession::save_as), each bounded by configured timeouts
//! or by the save itself.  A background save uses
//! [`begin_save`](EditorSession::begin_save) → run the [`SaveJob`] elsewhere →
//! [`finish_save`](EditorSession::finish_save).

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::RgbaImage;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::{AppConfig, UnreadableImagePolicy};
use crate::document::{DocumentEngine, DocumentError, DocumentHandle, ImageRef};
use crate::geometry::{Point, Rect, Zoom};
use crate::ledger::{EditLedger, LedgerError, SaveError, SaveJob, SaveReport, SkipReason, Upsert};
use crate::preview::PageView;
use crate::selection::{hit_test, Selection};
use crate::speech::{Readiness, SpeechError, SpeechService};

/// How long startup and restart wait for the speech engine to come up.
const SPEECH_READY_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Mode / StatusEvent / SessionError
// ---------------------------------------------------------------------------

/// What a click or drag on the page does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Click selects an image for replacement.
    #[default]
    Select,
    /// Drag a rectangle to have its text read aloud.
    Draw,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Select => "select",
            Mode::Draw => "draw",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Mode::Select),
            "draw" | "read" => Ok(Mode::Draw),
            other => Err(format!("unknown mode `{other}` (expected select or draw)")),
        }
    }
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Info(String),
    Warning(String),
    Error(String),
}

impl std::fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusEvent::Info(msg) => write!(f, "{msg}"),
            StatusEvent::Warning(msg) => write!(f, "warning: {msg}"),
            StatusEvent::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("open a PDF first")]
    NoDocument,

    #[error("there are no image replacements to save")]
    NothingToSave,

    #[error("switch to {} mode first", .0.label())]
    WrongMode(Mode),

    #[error("click an image on the page to select it first")]
    NoSelection,

    #[error("read-aloud is unavailable")]
    SpeechUnavailable,

    #[error("a save is in progress")]
    SavePending,

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("save failed: {0}")]
    Save(#[from] SaveError),

    #[error(transparent)]
    Speech(#[from] SpeechError),
}

impl SessionError {
    /// `true` for refusals caused by the current UI state rather than by a
    /// failing operation.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SessionError::NoDocument
                | SessionError::NothingToSave
                | SessionError::WrongMode(_)
                | SessionError::NoSelection
                | SessionError::SpeechUnavailable
                | SessionError::SavePending
        )
    }
}

// ---------------------------------------------------------------------------
// EditorSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct OpenDocument {
    handle: DocumentHandle,
    path: PathBuf,
    page_count: usize,
}

pub struct EditorSession {
    engine: Box<dyn DocumentEngine>,
    doc: Option<OpenDocument>,
    page: usize,
    zoom: Zoom,
    click_tolerance_px: f32,
    mode: Mode,
    selection: Selection,
    ledger: EditLedger,
    view: PageView,
    speech: SpeechService,
    save_policy: UnreadableImagePolicy,
    pending_save: Option<PathBuf>,
    drag_start: Option<Point>,
    status: UnboundedSender<StatusEvent>,
}

impl EditorSession {
    /// Build a session and start the speech worker.  Speech failing to come
    /// up is reported on `status` and leaves read-aloud disabled.
    pub fn new(
        engine: Box<dyn DocumentEngine>,
        speech: SpeechService,
        config: &AppConfig,
        status: UnboundedSender<StatusEvent>,
    ) -> Self {
        let mut session = Self {
            engine,
            doc: None,
            page: 0,
            zoom: Zoom::new(config.view.zoom),
            click_tolerance_px: config.view.click_tolerance_px,
            mode: Mode::Select,
            selection: Selection::default(),
            ledger: EditLedger::new(),
            view: PageView::new(),
            speech,
            save_policy: config.save.unreadable_image,
            pending_save: None,
            drag_start: None,
            status,
        };
        session.start_speech();
        session
    }

    fn start_speech(&mut self) {
        if let Err(err) = self.speech.start() {
            self.notify(StatusEvent::Warning(format!("read-aloud disabled: {err}")));
            return;
        }
        match self.speech.wait_ready(SPEECH_READY_TIMEOUT) {
            Readiness::Ready => log::info!("session: read-aloud ready"),
            Readiness::Failed(err) => {
                self.notify(StatusEvent::Warning(format!("read-aloud disabled: {err}")))
            }
            Readiness::Pending => self.notify(StatusEvent::Warning(
                "read-aloud engine is slow to start; draw mode disabled for now".into(),
            )),
        }
    }

    fn notify(&self, event: StatusEvent) {
        match &event {
            StatusEvent::Info(msg) => log::info!("session: {msg}"),
            StatusEvent::Warning(msg) => log::warn!("session: {msg}"),
            StatusEvent::Error(msg) => log::error!("session: {msg}"),
        }
        // A closed receiver only means nobody is listening any more.
        let _ = self.status.send(event);
    }

    fn info(&self, msg: impl Into<String>) {
        self.notify(StatusEvent::Info(msg.into()));
    }

    /// Report `err` on the status channel and return it.
    fn fail<T>(&self, err: SessionError) -> Result<T, SessionError> {
        let event = if err.is_precondition() {
            StatusEvent::Warning(err.to_string())
        } else {
            StatusEvent::Error(err.to_string())
        };
        self.notify(event);
        Err(err)
    }

    fn require_doc(&self) -> Result<&OpenDocument, SessionError> {
        match &self.doc {
            Some(doc) => Ok(doc),
            None => self.fail(SessionError::NoDocument),
        }
    }

    fn require_no_pending_save(&self) -> Result<(), SessionError> {
        if self.pending_save.is_some() {
            return self.fail(SessionError::SavePending);
        }
        Ok(())
    }

    // ---- accessors ---

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.doc.as_ref().map_or(0, |d| d.page_count)
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.doc.as_ref().map(|d| d.path.as_path())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn selection(&self) -> Option<Rect> {
        self.selection.rect()
    }

    pub fn ledger(&self) -> &EditLedger {
        &self.ledger
    }

    pub fn view(&self) -> &PageView {
        &self.view
    }

    pub fn speech(&self) -> &SpeechService {
        &self.speech
    }

    pub fn is_speech_available(&self) -> bool {
        self.speech.is_available()
    }

    pub fn is_save_pending(&self) -> bool {
        self.pending_save.is_some()
    }

    /// One-line summary for a status bar.
    pub fn status_line(&self) -> String {
        let page = match &self.doc {
            Some(doc) => format!("page {}/{}", self.page + 1, doc.page_count),
            None => "no document".to_string(),
        };
        let saving = if self.pending_save.is_some() { " | saving" } else { "" };
        format!(
            "{page} | mode {} | {} pending edit(s) | speech {}{saving}",
            self.mode.label(),
            self.ledger.len(),
            self.speech.state().label()
        )
    }

    // ---- document lifecycle ---

    /// Open `path`, replacing the current document.  On failure the current
    /// document, page and ledger stay as they were.
    pub fn open(&mut self, path: &Path) -> Result<usize, SessionError> {
        self.require_no_pending_save()?;

        let handle = match self.engine.open(path) {
            Ok(handle) => handle,
            Err(err) => return self.fail(err.into()),
        };
        let page_count = match self.engine.page_count(handle) {
            Ok(n) => n,
            Err(err) => {
                let _ = self.engine.close(handle);
                return self.fail(err.into());
            }
        };

        self.adopt(handle, path.to_path_buf(), page_count);
        self.info(format!(
            "opened {} ({page_count} page(s))",
            display_name(path)
        ));
        Ok(page_count)
    }

    /// Make `handle` the live document at page 0 with a clean slate.
    fn adopt(&mut self, handle: DocumentHandle, path: PathBuf, page_count: usize) {
        if let Some(previous) = self.doc.take() {
            if let Err(err) = self.engine.close(previous.handle) {
                log::warn!("session: closing {} failed: {err}", previous.path.display());
            }
        }
        self.doc = Some(OpenDocument {
            handle,
            path,
            page_count,
        });
        self.page = 0;
        self.ledger.clear_all();
        self.selection.clear();
        self.drag_start = None;
        self.refresh();
    }

    /// Stop speech (bounded) and close the document.
    pub fn close(&mut self) {
        if !self.speech.shutdown() {
            log::warn!("session: speech worker did not stop in time");
        }
        if let Some(doc) = self.doc.take() {
            if let Err(err) = self.engine.close(doc.handle) {
                log::warn!("session: closing {} failed: {err}", doc.path.display());
            }
        }
        self.view.clear();
    }

    // ---- navigation ---

    /// Returns `true` when the page changed.
    pub fn next_page(&mut self) -> Result<bool, SessionError> {
        let count = self.require_doc()?.page_count;
        if self.page + 1 >= count {
            return Ok(false);
        }
        self.goto(self.page + 1);
        Ok(true)
    }

    /// Returns `true` when the page changed.
    pub fn prev_page(&mut self) -> Result<bool, SessionError> {
        self.require_doc()?;
        if self.page == 0 {
            return Ok(false);
        }
        self.goto(self.page - 1);
        Ok(true)
    }

    fn goto(&mut self, page: usize) {
        self.page = page;
        self.selection.clear();
        self.drag_start = None;
        self.refresh();
        self.info(format!("displayed page {}", page + 1));
    }

    // ---- mode ---

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), SessionError> {
        if mode == Mode::Draw && !self.speech.is_available() {
            return self.fail(SessionError::SpeechUnavailable);
        }
        self.mode = mode;
        self.selection.clear();
        self.drag_start = None;
        self.view.set_selection(None);
        self.view.set_drag(None);
        self.info(format!("mode: {}", mode.label()));
        Ok(())
    }

    // ---- selection & replace ---

    /// Select the image under a canvas-space click.  Clicking empty space
    /// clears the selection and returns `Ok(None)`.
    pub fn click(&mut self, canvas: Point) -> Result<Option<Rect>, SessionError> {
        let handle = self.require_doc()?.handle;
        if self.mode != Mode::Select {
            return self.fail(SessionError::WrongMode(Mode::Select));
        }

        self.selection.clear();
        self.view.set_selection(None);

        let regions = match self.engine.image_regions(handle, self.page) {
            Ok(regions) => regions,
            Err(err) => return self.fail(err.into()),
        };
        if regions.is_empty() {
            self.info("no images detected on this page");
            return Ok(None);
        }

        match hit_test(&regions, canvas, self.zoom, self.click_tolerance_px) {
            Some(rect) => {
                self.selection.select(rect);
                self.view.set_selection(Some(self.zoom.rect_to_canvas(rect)));
                self.info(format!("selected image at {rect}"));
                Ok(Some(rect))
            }
            None => {
                self.info("no image at clicked location");
                Ok(None)
            }
        }
    }

    /// Schedule `image` to replace the selected image.  Consumes the
    /// selection.
    pub fn replace_selected(&mut self, image: impl Into<ImageRef>) -> Result<Upsert, SessionError> {
        self.require_doc()?;
        self.require_no_pending_save()?;
        if self.mode != Mode::Select {
            return self.fail(SessionError::WrongMode(Mode::Select));
        }
        let Some(rect) = self.selection.take() else {
            return self.fail(SessionError::NoSelection);
        };

        let image = image.into();
        let label = image.label();
        let upsert = match self.ledger.add_or_replace(self.page, rect, image) {
            Ok(upsert) => upsert,
            Err(err) => {
                // rejected: the image stays selected
                self.selection.select(rect);
                return self.fail(err.into());
            }
        };
        self.refresh();
        self.info(format!("scheduled replacement: {label}"));
        Ok(upsert)
    }

    /// Drop every pending edit on the current page.
    pub fn clear_page_edits(&mut self) -> Result<usize, SessionError> {
        self.require_doc()?;
        self.require_no_pending_save()?;
        let removed = self.ledger.clear_page(self.page);
        self.refresh();
        self.info(format!(
            "cleared {removed} edit(s) on page {}",
            self.page + 1
        ));
        Ok(removed)
    }

    // ---- save ---

    /// Snapshot the ledger into a [`SaveJob`] and mark a save as pending.
    /// Ledger mutations are refused until [`finish_save`](Self::finish_save).
    pub fn begin_save(&mut self, destination: impl Into<PathBuf>) -> Result<SaveJob, SessionError> {
        let source = self.require_doc()?.path.clone();
        self.require_no_pending_save()?;
        if self.ledger.is_empty() {
            return self.fail(SessionError::NothingToSave);
        }

        let destination = destination.into();
        self.pending_save = Some(destination.clone());
        self.info("saving PDF...");
        Ok(SaveJob::new(
            source,
            destination,
            self.ledger.records().to_vec(),
            self.save_policy,
        ))
    }

    /// Apply the outcome of a save started with [`begin_save`](Self::begin_save).
    ///
    /// On success the saved file becomes the live document at page 0 and the
    /// ledger is cleared.  On failure nothing changes.
    pub fn finish_save(
        &mut self,
        outcome: Result<SaveReport, SaveError>,
    ) -> Result<SaveReport, SessionError> {
        self.pending_save = None;

        let report = match outcome {
            Ok(report) => report,
            Err(err) => return self.fail(err.into()),
        };

        let handle = match self.engine.open(&report.destination) {
            Ok(handle) => handle,
            Err(err) => {
                self.notify(StatusEvent::Error(format!(
                    "saved {} but could not reopen it: {err}",
                    report.destination.display()
                )));
                return Err(err.into());
            }
        };
        let page_count = match self.engine.page_count(handle) {
            Ok(n) => n,
            Err(err) => {
                let _ = self.engine.close(handle);
                return self.fail(err.into());
            }
        };

        for skipped in &report.skipped {
            let why = match &skipped.reason {
                SkipReason::PageOutOfRange { page_count } => {
                    format!("page {} does not exist (document has {page_count})", skipped.page + 1)
                }
                SkipReason::UnreadableImage(err) => err.to_string(),
            };
            self.notify(StatusEvent::Warning(format!("skipped edit {}: {why}", skipped.index + 1)));
        }

        self.adopt(handle, report.destination.clone(), page_count);
        self.info(format!("saved to {}", display_name(&report.destination)));
        Ok(report)
    }

    /// Save synchronously on this thread with the session's engine.
    pub fn save_as(&mut self, destination: impl Into<PathBuf>) -> Result<SaveReport, SessionError> {
        let job = self.begin_save(destination)?;
        let outcome = job.run(self.engine.as_mut());
        self.finish_save(outcome)
    }

    // ---- draw to read ---

    pub fn begin_draw(&mut self, canvas: Point) -> Result<(), SessionError> {
        self.require_doc()?;
        if self.mode != Mode::Draw {
            return self.fail(SessionError::WrongMode(Mode::Draw));
        }
        if !self.speech.is_available() {
            return self.fail(SessionError::SpeechUnavailable);
        }
        self.drag_start = Some(canvas);
        self.view.set_drag(Some(Rect::from_corners(canvas, canvas)));
        Ok(())
    }

    pub fn update_draw(&mut self, canvas: Point) {
        if let Some(start) = self.drag_start {
            self.view.set_drag(Some(Rect::from_corners(start, canvas)));
        }
    }

    /// Finish the gesture and read the dragged region.  Returns the queued
    /// text, or `None` when there was no gesture or no text.
    pub fn end_draw(&mut self, canvas: Point) -> Result<Option<String>, SessionError> {
        let Some(start) = self.drag_start.take() else {
            return Ok(None);
        };
        self.view.set_drag(None);
        let page_rect = self.zoom.rect_to_page(Rect::from_corners(start, canvas));
        self.read_region(page_rect)
    }

    /// Extract the text in `page_rect` on the current page and queue it for
    /// speech.
    pub fn read_region(&mut self, page_rect: Rect) -> Result<Option<String>, SessionError> {
        let handle = self.require_doc()?.handle;
        if !self.speech.is_available() {
            return self.fail(SessionError::SpeechUnavailable);
        }

        let text = match self.engine.extract_text(handle, self.page, page_rect) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                self.notify(StatusEvent::Error(format!("could not extract text: {err}")));
                return Err(err.into());
            }
        };
        if text.is_empty() {
            self.info("no text found in selection");
            return Ok(None);
        }

        if let Err(err) = self.speech.enqueue(text.clone()) {
            return self.fail(err.into());
        }
        self.info("queued text for speech");
        Ok(Some(text))
    }

    /// Drop queued speech and restart the worker.  Returns how many queued
    /// requests were dropped.
    pub fn stop_speaking(&mut self) -> Result<usize, SessionError> {
        if !self.speech.is_available() {
            return self.fail(SessionError::SpeechUnavailable);
        }
        let dropped = match self.speech.stop_speaking() {
            Ok(dropped) => dropped,
            Err(err) => return self.fail(err.into()),
        };
        if let Readiness::Failed(err) = self.speech.wait_ready(SPEECH_READY_TIMEOUT) {
            self.notify(StatusEvent::Warning(format!("read-aloud disabled: {err}")));
        }
        self.info("speech stopped");
        Ok(dropped)
    }

    // ---- rendering ---

    /// Re-render the current page and its pending edits into the view.
    pub fn render(&mut self) -> Result<(), SessionError> {
        let Some(doc) = &self.doc else {
            self.view.clear();
            return Ok(());
        };
        let base = self
            .engine
            .render(doc.handle, self.page, self.zoom.factor())?;

        let placeholders = self
            .view
            .rebuild(base, self.ledger.records_for_page(self.page), self.zoom);
        if placeholders > 0 {
            self.notify(StatusEvent::Warning(format!(
                "{placeholders} replacement image(s) could not be previewed"
            )));
        }
        self.view
            .set_selection(self.selection.rect().map(|r| self.zoom.rect_to_canvas(r)));
        Ok(())
    }

    /// Render, reporting failure on the status channel.
    fn refresh(&mut self) {
        if let Err(err) = self.render() {
            self.notify(StatusEvent::Error(format!("could not render page: {err}")));
        }
    }

    /// The composed page bitmap currently on display.
    pub fn compose(&self) -> Option<RgbaImage> {
        self.view.compose()
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        if let Some(doc) = self.doc.take() {
            let _ = self.engine.close(doc.handle);
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
