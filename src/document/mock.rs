//! In-memory [`DocumentEngine`] test double.
//!
//! "Files" are registered up front with [`MockDocumentEngine::with_file`];
//! `open` copies the registered pages into a new document, mutations are
//! recorded as [`MockOp`]s, and `save` registers the edited pages as a new
//! file at the destination path so a later `open` sees them.
//!
//! Clones share state, so a test can keep one handle for inspection while
//! the session owns the other.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};

use crate::document::engine::{
    DocumentEngine, DocumentError, DocumentHandle, FillColor, ImageRegion,
};
use crate::document::image_ref::ImageRef;
use crate::geometry::Rect;

/// A mutation applied to a mock page.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    Paint(Rect),
    Insert(Rect, ImageRef),
}

#[derive(Debug, Clone)]
pub struct MockPage {
    /// Page size in points (`width`, `height`).
    pub size: (f32, f32),
    pub regions: Vec<Rect>,
    /// Text runs with their page-space extent.
    pub text: Vec<(Rect, String)>,
    pub ops: Vec<MockOp>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self {
            size: (200.0, 300.0),
            regions: Vec::new(),
            text: Vec::new(),
            ops: Vec::new(),
        }
    }
}

impl MockPage {
    pub fn with_regions(regions: impl IntoIterator<Item = Rect>) -> Self {
        Self {
            regions: regions.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, extent: Rect, text: impl Into<String>) -> Self {
        self.text.push((extent, text.into()));
        self
    }
}

#[derive(Default)]
struct MockState {
    files: HashMap<PathBuf, Vec<MockPage>>,
    open: HashMap<DocumentHandle, Vec<MockPage>>,
    next_handle: u64,
    fail_save: bool,
}

#[derive(Clone, Default)]
pub struct MockDocumentEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockDocumentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, pages: Vec<MockPage>) -> Self {
        self.state.lock().unwrap().files.insert(path.into(), pages);
        self
    }

    /// Make every subsequent `save` fail with an I/O error.
    pub fn set_fail_save(&self, fail: bool) {
        self.state.lock().unwrap().fail_save = fail;
    }

    /// Pages of a registered (or saved) file.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<MockPage>> {
        self.state.lock().unwrap().files.get(path.as_ref()).cloned()
    }

    pub fn open_documents(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    fn with_page<T>(
        &self,
        doc: DocumentHandle,
        page: usize,
        f: impl FnOnce(&mut MockPage) -> T,
    ) -> Result<T, DocumentError> {
        let mut state = self.state.lock().unwrap();
        let pages = state
            .open
            .get_mut(&doc)
            .ok_or(DocumentError::InvalidHandle(doc.raw()))?;
        let page_count = pages.len();
        let page = pages
            .get_mut(page)
            .ok_or(DocumentError::PageOutOfRange { page, page_count })?;
        Ok(f(page))
    }
}

impl DocumentEngine for MockDocumentEngine {
    fn open(&mut self, path: &Path) -> Result<DocumentHandle, DocumentError> {
        let mut state = self.state.lock().unwrap();
        let pages = state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| DocumentError::Open {
                path: path.display().to_string(),
                reason: "no such file".into(),
            })?;
        state.next_handle += 1;
        let handle = DocumentHandle(state.next_handle);
        state.open.insert(handle, pages);
        Ok(handle)
    }

    fn page_count(&self, doc: DocumentHandle) -> Result<usize, DocumentError> {
        self.state
            .lock()
            .unwrap()
            .open
            .get(&doc)
            .map(Vec::len)
            .ok_or(DocumentError::InvalidHandle(doc.raw()))
    }

    fn render(&self, doc: DocumentHandle, page: usize, zoom: f32) -> Result<RgbaImage, DocumentError> {
        self.with_page(doc, page, |p| {
            let w = (p.size.0 * zoom).round().max(1.0) as u32;
            let h = (p.size.1 * zoom).round().max(1.0) as u32;
            RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
        })
    }

    fn image_regions(&self, doc: DocumentHandle, page: usize) -> Result<Vec<ImageRegion>, DocumentError> {
        self.with_page(doc, page, |p| {
            p.regions
                .iter()
                .map(|&bbox| ImageRegion { bbox })
                .collect()
        })
    }

    fn extract_text(&self, doc: DocumentHandle, page: usize, clip: Rect) -> Result<String, DocumentError> {
        self.with_page(doc, page, |p| {
            p.text
                .iter()
                .filter(|(extent, _)| extent.intersects(&clip))
                .map(|(_, text)| text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    fn paint_rect(
        &mut self,
        doc: DocumentHandle,
        page: usize,
        rect: Rect,
        _color: FillColor,
    ) -> Result<(), DocumentError> {
        self.with_page(doc, page, |p| p.ops.push(MockOp::Paint(rect)))
    }

    fn insert_image(
        &mut self,
        doc: DocumentHandle,
        page: usize,
        rect: Rect,
        image: &ImageRef,
    ) -> Result<(), DocumentError> {
        image.load()?;
        self.with_page(doc, page, |p| p.ops.push(MockOp::Insert(rect, image.clone())))
    }

    fn save(&mut self, doc: DocumentHandle, path: &Path) -> Result<(), DocumentError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_save {
            return Err(DocumentError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "mock save failure",
            )));
        }
        let pages = state
            .open
            .get(&doc)
            .cloned()
            .ok_or(DocumentError::InvalidHandle(doc.raw()))?;
        state.files.insert(path.to_path_buf(), pages);
        Ok(())
    }

    fn close(&mut self, doc: DocumentHandle) -> Result<(), DocumentError> {
        self.state
            .lock()
            .unwrap()
            .open
            .remove(&doc)
            .map(|_| ())
            .ok_or(DocumentError::InvalidHandle(doc.raw()))
    }
}
