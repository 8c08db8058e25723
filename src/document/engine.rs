//! The document engine capability consumed by the editor.
//!
//! # Overview
//!
//! [`DocumentEngine`] is everything the editor needs from a PDF library:
//! open/close, page count, a bitmap per page, image bounding boxes, text in
//! a clip rectangle, and the two mutations used by save-commit
//! ([`paint_rect`](DocumentEngine::paint_rect) and
//! [`insert_image`](DocumentEngine::insert_image)) followed by
//! [`save`](DocumentEngine::save).
//!
//! The trait is object-safe so the session can hold a
//! `Box<dyn DocumentEngine>`.  The engine owns every open document; callers
//! only see opaque [`DocumentHandle`]s.
//!
//! All rectangles are in page coordinate space (points, top-left origin).

use std::path::Path;

use image::RgbaImage;
use thiserror::Error;

use crate::document::image_ref::{ImageRef, ReplacementImageError};
use crate::geometry::Rect;

// ---------------------------------------------------------------------------
// DocumentError
// ---------------------------------------------------------------------------

/// All errors that can arise from a document engine.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The file is missing, unreadable, encrypted or not a PDF.
    #[error("cannot open {path}: {reason}")]
    Open { path: String, reason: String },

    /// Filesystem failure while persisting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The PDF object model rejected an operation.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// The handle does not belong to an open document.
    #[error("invalid document handle {0}")]
    InvalidHandle(u64),

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },

    /// The replacement image passed to `insert_image` could not be decoded.
    #[error(transparent)]
    Image(#[from] ReplacementImageError),
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Opaque handle to a document opened by a [`DocumentEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(pub(crate) u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Bounding box of an image drawn on a page, in the order the engine
/// encountered it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRegion {
    pub bbox: Rect,
}

/// Opaque RGB fill colour, components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl FillColor {
    pub const WHITE: FillColor = FillColor {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };
}

// ---------------------------------------------------------------------------
// DocumentEngine trait
// ---------------------------------------------------------------------------

/// Object-safe interface to a PDF backend.
///
/// # Contract
///
/// - Every page-taking method returns [`DocumentError::PageOutOfRange`] for
///   `page >= page_count`.
/// - `open` must not disturb any other open document; a failed `open` leaves
///   the engine exactly as it was.
/// - `save` persists atomically: on error no partial file is left at `path`.
pub trait DocumentEngine {
    /// Open the PDF at `path` as a new, independent document.
    fn open(&mut self, path: &Path) -> Result<DocumentHandle, DocumentError>;

    fn page_count(&self, doc: DocumentHandle) -> Result<usize, DocumentError>;

    /// Rasterise `page` at `zoom` (bitmap size = page size × zoom).
    fn render(&self, doc: DocumentHandle, page: usize, zoom: f32)
        -> Result<RgbaImage, DocumentError>;

    /// Image bounding boxes on `page`, in content order.
    fn image_regions(
        &self,
        doc: DocumentHandle,
        page: usize,
    ) -> Result<Vec<ImageRegion>, DocumentError>;

    /// Text whose extent intersects `clip`.
    fn extract_text(
        &self,
        doc: DocumentHandle,
        page: usize,
        clip: Rect,
    ) -> Result<String, DocumentError>;

    /// Paint `rect` with an opaque fill, covering whatever was drawn there.
    fn paint_rect(
        &mut self,
        doc: DocumentHandle,
        page: usize,
        rect: Rect,
        color: FillColor,
    ) -> Result<(), DocumentError>;

    /// Draw `image` scaled to exactly fill `rect`.
    fn insert_image(
        &mut self,
        doc: DocumentHandle,
        page: usize,
        rect: Rect,
        image: &ImageRef,
    ) -> Result<(), DocumentError>;

    fn save(&mut self, doc: DocumentHandle, path: &Path) -> Result<(), DocumentError>;

    fn close(&mut self, doc: DocumentHandle) -> Result<(), DocumentError>;
}

// Compile-time assertion: Box<dyn DocumentEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn DocumentEngine>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
