//! [`DocumentEngine`] backed by `lopdf`.
//!
//! # What it does
//!
//! | Operation | Implementation |
//! |-----------|----------------|
//! | `open` | `Document::load_mem`, page list + effective MediaBox per page |
//! | `render` | white page-sized bitmap, image footprints shaded grey |
//! | `image_regions` | walk the content stream tracking `q`/`Q`/`cm`; every `Do` of an image XObject yields the CTM-transformed unit square |
//! | `extract_text` | track the text matrix through `BT`…`ET`; keep shown strings whose approximate extent intersects the clip |
//! | `paint_rect` / `insert_image` | wrap the existing content in `q … Q` and append new operators |
//! | `save` | serialise to memory, write a sibling temp file, rename over the target |
//!
//! Rasterisation is deliberately coarse: it exists so the editor can show
//! page geometry and overlays without a native renderer.
//!
//! # Coordinates
//!
//! PDF user space has its origin at the bottom-left of the MediaBox with `y`
//! up; page space used by the editor has its origin at the top-left with `y`
//! down.  [`PageInfo`] converts between the two.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Encoding, Object, ObjectId, Stream};

use crate::document::engine::{
    DocumentEngine, DocumentError, DocumentHandle, FillColor, ImageRegion,
};
use crate::document::image_ref::ImageRef;
use crate::geometry::Rect;

impl From<lopdf::Error> for DocumentError {
    fn from(err: lopdf::Error) -> Self {
        DocumentError::Pdf(err.to_string())
    }
}

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Approximate glyph advance as a fraction of the font size.  Without font
/// metrics every glyph is treated as half an em wide.
const GLYPH_ADVANCE_EM: f32 = 0.5;

/// A `TJ` kerning adjustment more negative than this (thousandths of an em)
/// is read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

const PAGE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PAGE_FRAME: Rgba<u8> = Rgba([220, 220, 220, 255]);
const IMAGE_FOOTPRINT: Rgba<u8> = Rgba([200, 200, 200, 255]);

// ---------------------------------------------------------------------------
// Matrix
// ---------------------------------------------------------------------------

/// PDF affine matrix `[a b c d e f]`, row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let v: Vec<f32> = operands
            .iter()
            .map(|o| o.as_float().ok())
            .collect::<Option<_>>()?;
        Some(Matrix {
            a: v[0],
            b: v[1],
            c: v[2],
            d: v[3],
            e: v[4],
            f: v[5],
        })
    }

    /// `self × other`: apply `self` first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Axis-aligned bounds of the unit square under this matrix, in user
    /// space (`x0, y0, x1, y1` with `y` up).
    fn unit_square_bounds(&self) -> [f32; 4] {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(1.0, 0.0),
            self.apply(0.0, 1.0),
            self.apply(1.0, 1.0),
        ];
        let mut b = [f32::MAX, f32::MAX, f32::MIN, f32::MIN];
        for (x, y) in corners {
            b[0] = b[0].min(x);
            b[1] = b[1].min(y);
            b[2] = b[2].max(x);
            b[3] = b[3].max(y);
        }
        b
    }

    fn horizontal_scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

// ---------------------------------------------------------------------------
// PageInfo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct PageInfo {
    id: ObjectId,
    /// Effective MediaBox `[x0, y0, x1, y1]` in user space.
    media: [f32; 4],
}

impl PageInfo {
    fn width(&self) -> f32 {
        self.media[2] - self.media[0]
    }

    fn height(&self) -> f32 {
        self.media[3] - self.media[1]
    }

    /// User-space bounds (`y` up) → page-space rect (`y` down).
    fn to_page(&self, [x0, y0, x1, y1]: [f32; 4]) -> Rect {
        Rect::new(
            x0 - self.media[0],
            self.media[3] - y1,
            x1 - self.media[0],
            self.media[3] - y0,
        )
    }

    /// Page-space rect → `(x, y, width, height)` in user space, as used by
    /// the `re` operator and image placement.
    fn to_user(&self, r: Rect) -> (f32, f32, f32, f32) {
        (
            self.media[0] + r.x0,
            self.media[3] - r.y1,
            r.width(),
            r.height(),
        )
    }
}

// ---------------------------------------------------------------------------
// LopdfEngine
// ---------------------------------------------------------------------------

struct LoadedDocument {
    doc: Document,
    pages: Vec<PageInfo>,
}

/// Pure-Rust document engine.  Cheap to construct; a background save can
/// create its own instance instead of sharing the session's.
#[derive(Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, LoadedDocument>,
}

impl std::fmt::Debug for LopdfEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LopdfEngine")
            .field("open_documents", &self.docs.len())
            .finish_non_exhaustive()
    }
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn loaded(&self, handle: DocumentHandle) -> Result<&LoadedDocument, DocumentError> {
        self.docs
            .get(&handle)
            .ok_or(DocumentError::InvalidHandle(handle.raw()))
    }

    fn loaded_mut(&mut self, handle: DocumentHandle) -> Result<&mut LoadedDocument, DocumentError> {
        self.docs
            .get_mut(&handle)
            .ok_or(DocumentError::InvalidHandle(handle.raw()))
    }

    fn page(&self, handle: DocumentHandle, page: usize) -> Result<(&Document, PageInfo), DocumentError> {
        let loaded = self.loaded(handle)?;
        let info = page_info(loaded, page)?;
        Ok((&loaded.doc, info))
    }
}

fn page_info(loaded: &LoadedDocument, page: usize) -> Result<PageInfo, DocumentError> {
    loaded
        .pages
        .get(page)
        .copied()
        .ok_or(DocumentError::PageOutOfRange {
            page,
            page_count: loaded.pages.len(),
        })
}

impl DocumentEngine for LopdfEngine {
    fn open(&mut self, path: &Path) -> Result<DocumentHandle, DocumentError> {
        let open_err = |reason: String| DocumentError::Open {
            path: path.display().to_string(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| open_err(e.to_string()))?;
        let doc = Document::load_mem(&bytes).map_err(|e| open_err(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(open_err("encrypted PDFs are not supported".into()));
        }

        let pages: Vec<PageInfo> = doc
            .get_pages()
            .into_values()
            .map(|id| PageInfo {
                id,
                media: media_box(&doc, id),
            })
            .collect();
        if pages.is_empty() {
            return Err(open_err("document has no pages".into()));
        }

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        log::debug!(
            "lopdf: opened {} as handle {} ({} pages)",
            path.display(),
            handle.raw(),
            pages.len()
        );
        self.docs.insert(
            handle,
            LoadedDocument { doc, pages },
        );
        Ok(handle)
    }

    fn page_count(&self, doc: DocumentHandle) -> Result<usize, DocumentError> {
        Ok(self.loaded(doc)?.pages.len())
    }

    fn render(&self, doc: DocumentHandle, page: usize, zoom: f32) -> Result<RgbaImage, DocumentError> {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        let (_, info) = self.page(doc, page)?;

        let width = (info.width() * zoom).round().max(1.0) as u32;
        let height = (info.height() * zoom).round().max(1.0) as u32;
        let mut bitmap = RgbaImage::from_pixel(width, height, PAGE_BACKGROUND);

        for region in self.image_regions(doc, page)? {
            let (x0, y0, x1, y1) = Rect::new(
                region.bbox.x0 * zoom,
                region.bbox.y0 * zoom,
                region.bbox.x1 * zoom,
                region.bbox.y1 * zoom,
            )
            .to_pixels();
            fill_pixels(&mut bitmap, x0, y0, x1, y1, IMAGE_FOOTPRINT);
        }

        if width >= 4 && height >= 4 {
            for x in 0..width {
                bitmap.put_pixel(x, 0, PAGE_FRAME);
                bitmap.put_pixel(x, height - 1, PAGE_FRAME);
            }
            for y in 0..height {
                bitmap.put_pixel(0, y, PAGE_FRAME);
                bitmap.put_pixel(width - 1, y, PAGE_FRAME);
            }
        }

        Ok(bitmap)
    }

    fn image_regions(&self, doc: DocumentHandle, page: usize) -> Result<Vec<ImageRegion>, DocumentError> {
        let (document, info) = self.page(doc, page)?;
        let image_names = image_xobject_names(document, info.id);
        if image_names.is_empty() {
            return Ok(Vec::new());
        }

        let mut regions = Vec::new();
        let mut ctm = Matrix::IDENTITY;
        let mut stack: Vec<Matrix> = Vec::new();

        for op in page_operations(document, info.id)? {
            match op.operator.as_str() {
                "q" => stack.push(ctm),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        ctm = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(&op.operands) {
                        ctm = m.then(&ctm);
                    }
                }
                "Do" => {
                    let name = op.operands.first().and_then(|o| o.as_name().ok());
                    if let Some(name) = name.filter(|n| image_names.contains(*n)) {
                        let bbox = info.to_page(ctm.unit_square_bounds());
                        log::trace!(
                            "lopdf: image /{} at {bbox}",
                            String::from_utf8_lossy(name)
                        );
                        regions.push(ImageRegion { bbox });
                    }
                }
                _ => {}
            }
        }

        Ok(regions)
    }

    fn extract_text(&self, doc: DocumentHandle, page: usize, clip: Rect) -> Result<String, DocumentError> {
        let (document, info) = self.page(doc, page)?;
        let mut scanner = TextScanner::new(info, clip, page_fonts(document, info.id));
        for op in page_operations(document, info.id)? {
            scanner.step(&op);
        }
        Ok(scanner.finish())
    }

    fn paint_rect(
        &mut self,
        doc: DocumentHandle,
        page: usize,
        rect: Rect,
        color: FillColor,
    ) -> Result<(), DocumentError> {
        let loaded = self.loaded_mut(doc)?;
        let info = page_info(loaded, page)?;
        let (x, y, w, h) = info.to_user(rect);

        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new("rg", vec![color.r.into(), color.g.into(), color.b.into()]),
            Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ];
        append_page_operations(&mut loaded.doc, info.id, ops)
    }

    fn insert_image(
        &mut self,
        doc: DocumentHandle,
        page: usize,
        rect: Rect,
        image: &ImageRef,
    ) -> Result<(), DocumentError> {
        let decoded = image.load()?;
        let loaded = self.loaded_mut(doc)?;
        let info = page_info(loaded, page)?;

        let xobject = image_xobject(&mut loaded.doc, &decoded)?;
        let xobject_id = loaded.doc.add_object(xobject);

        materialise_inherited_resources(&mut loaded.doc, info.id)?;
        let name = free_xobject_name(&loaded.doc, info.id);
        loaded.doc.add_xobject(info.id, name.as_bytes(), xobject_id)?;

        let (x, y, w, h) = info.to_user(rect);
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    w.into(),
                    0.0f32.into(),
                    0.0f32.into(),
                    h.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ];
        append_page_operations(&mut loaded.doc, info.id, ops)
    }

    fn save(&mut self, doc: DocumentHandle, path: &Path) -> Result<(), DocumentError> {
        let loaded = self.loaded_mut(doc)?;
        let mut bytes = Vec::new();
        loaded.doc.save_to(&mut bytes)?;
        write_atomically(path, &bytes)?;
        log::debug!("lopdf: saved handle {} to {}", doc.raw(), path.display());
        Ok(())
    }

    fn close(&mut self, doc: DocumentHandle) -> Result<(), DocumentError> {
        self.docs
            .remove(&doc)
            .map(|_| ())
            .ok_or(DocumentError::InvalidHandle(doc.raw()))
    }
}

// ---------------------------------------------------------------------------
// Page helpers
// ---------------------------------------------------------------------------

/// Effective MediaBox of a page, following `Parent` links for inherited
/// values.
fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let mut current = Some(page_id);
    let mut seen = HashSet::new();
    while let Some(id) = current {
        if !seen.insert(id) {
            break;
        }
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        let parsed = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|obj| doc.dereference(obj).ok())
            .and_then(|(_, obj)| obj.as_array().ok())
            .and_then(|array| {
                if array.len() != 4 {
                    return None;
                }
                let v: Vec<f32> = array
                    .iter()
                    .map(|o| o.as_float().ok())
                    .collect::<Option<_>>()?;
                Some([
                    v[0].min(v[2]),
                    v[1].min(v[3]),
                    v[0].max(v[2]),
                    v[1].max(v[3]),
                ])
            });
        if let Some(media) = parsed {
            return media;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    DEFAULT_MEDIA_BOX
}

fn page_operations(doc: &Document, page_id: ObjectId) -> Result<Vec<Operation>, DocumentError> {
    let raw = doc.get_page_content(page_id)?;
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    Ok(Content::decode(&raw)?.operations)
}

/// The nearest `Resources` dictionary for a page: its own, or the one
/// inherited through `Parent` links.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = Some(page_id);
    let mut seen = HashSet::new();
    while let Some(id) = current {
        if !seen.insert(id) {
            return None;
        }
        let node = doc.get_dictionary(id).ok()?;
        if let Ok(resources) = node.get(b"Resources") {
            return doc
                .dereference(resources)
                .ok()
                .and_then(|(_, obj)| obj.as_dict().ok());
        }
        current = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// The page's effective `/XObject` dictionary.
fn page_xobjects(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    effective_resources(doc, page_id)
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|obj| doc.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_dict().ok())
}

/// First `RtIm{n}` not already bound in the page's XObjects.  Names from
/// earlier saves of the same file stay taken.
fn free_xobject_name(doc: &Document, page_id: ObjectId) -> String {
    let taken = page_xobjects(doc, page_id);
    let mut n = 1u32;
    loop {
        let name = format!("RtIm{n}");
        if !taken.is_some_and(|xobjects| xobjects.has(name.as_bytes())) {
            return name;
        }
        n += 1;
    }
}

/// Names of XObjects in the page's effective resources whose subtype is
/// `Image`.
fn image_xobject_names(doc: &Document, page_id: ObjectId) -> HashSet<Vec<u8>> {
    let Some(xobjects) = page_xobjects(doc, page_id) else {
        return HashSet::new();
    };

    xobjects
        .iter()
        .filter(|(_, value)| {
            doc.dereference(value)
                .ok()
                .and_then(|(_, obj)| obj.as_stream().ok())
                .and_then(|stream| stream.dict.get(b"Subtype").ok())
                .and_then(|subtype| subtype.as_name().ok())
                .is_some_and(|subtype| subtype == b"Image")
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Append `ops` after the page's existing content.  The existing content is
/// wrapped in `q … Q` so that a graphics state it leaves behind (an
/// unbalanced `cm`, a clip) cannot leak into the appended operators.
fn append_page_operations(
    doc: &mut Document,
    page_id: ObjectId,
    ops: Vec<Operation>,
) -> Result<(), DocumentError> {
    let existing = doc.get_page_content(page_id)?;
    let appended = Content { operations: ops }.encode()?;

    let mut content = Vec::with_capacity(existing.len() + appended.len() + 8);
    content.extend_from_slice(b"q\n");
    content.extend_from_slice(&existing);
    content.extend_from_slice(b"\nQ\n");
    content.extend_from_slice(&appended);

    let mut stream = Stream::new(Dictionary::new(), content);
    stream.compress()?;
    let stream_id = doc.add_object(stream);

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Reference(stream_id));
    Ok(())
}

/// If the page has no `Resources` of its own, copy the inherited dictionary
/// onto it so that adding an XObject does not hide inherited fonts.
fn materialise_inherited_resources(doc: &mut Document, page_id: ObjectId) -> Result<(), DocumentError> {
    if doc.get_dictionary(page_id)?.has(b"Resources") {
        return Ok(());
    }
    if let Some(resources) = effective_resources(doc, page_id).cloned() {
        doc.get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Resources", Object::Dictionary(resources));
    }
    Ok(())
}

/// Build an RGB image XObject, with a soft mask when the source has alpha.
fn image_xobject(doc: &mut Document, image: &image::DynamicImage) -> Result<Stream, DocumentError> {
    let width = i64::from(image.width());
    let height = i64::from(image.height());

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };

    if image.color().has_alpha() {
        let alpha: Vec<u8> = image.to_rgba8().pixels().map(|p| p[3]).collect();
        let mut smask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        );
        smask.compress()?;
        let smask_id = doc.add_object(smask);
        dict.set("SMask", Object::Reference(smask_id));
    }

    let mut stream = Stream::new(dict, image.to_rgb8().into_raw());
    stream.compress()?;
    Ok(stream)
}

fn fill_pixels(bitmap: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let (w, h) = (i64::from(bitmap.width()), i64::from(bitmap.height()));
    for y in y0.clamp(0, h)..y1.clamp(0, h) {
        for x in x0.clamp(0, w)..x1.clamp(0, w) {
            bitmap.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), DocumentError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".into());
    let temp_path: PathBuf = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    fs::write(&temp_path, bytes)?;
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Text extraction
// ---------------------------------------------------------------------------

/// How strings shown with one font become text.
struct FontText<'a> {
    encoding: Option<Encoding<'a>>,
    /// Type0 fonts show two-byte glyph codes; without a usable map those
    /// codes are not text.
    composite: bool,
}

impl<'a> FontText<'a> {
    fn new(doc: &'a Document, font: &'a Dictionary) -> Self {
        let composite = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Type0");
        // A simple font with neither entry uses its built-in encoding, which
        // Latin-1 approximates.
        let described = font.has(b"Encoding") || font.has(b"ToUnicode");
        let encoding = if described && font.type_is(b"Font") {
            match font.get_font_encoding(doc) {
                Ok(encoding) => Some(encoding),
                Err(err) => {
                    log::debug!("lopdf: font encoding unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };
        Self { encoding, composite }
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        if let Some(encoding) = &self.encoding {
            match Document::decode_text(encoding, bytes) {
                Ok(text) => return Some(text),
                Err(err) => log::debug!("lopdf: cannot decode shown string: {err}"),
            }
        }
        (!self.composite).then(|| decode_pdf_string(bytes))
    }
}

/// Text decoding for every font name the page can select with `Tf`.
fn page_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontText<'_>> {
    let mut fonts: HashMap<Vec<u8>, &Dictionary> = doc
        .get_page_fonts(page_id)
        .map(|found| found.into_iter().collect())
        .unwrap_or_default();

    // `get_page_fonts` misses an inherited Resources dictionary held inline.
    let inherited = effective_resources(doc, page_id)
        .and_then(|resources| resources.get(b"Font").ok())
        .and_then(|obj| doc.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_dict().ok());
    if let Some(inherited) = inherited {
        for (name, value) in inherited.iter() {
            let font = doc
                .dereference(value)
                .ok()
                .and_then(|(_, obj)| obj.as_dict().ok());
            if let Some(font) = font {
                fonts.entry(name.clone()).or_insert(font);
            }
        }
    }

    fonts
        .into_iter()
        .map(|(name, font)| (name, FontText::new(doc, font)))
        .collect()
}

/// Minimal text-state machine: enough to place each shown string on the page.
struct TextScanner<'a> {
    page: PageInfo,
    clip: Rect,
    fonts: HashMap<Vec<u8>, FontText<'a>>,
    font: Option<Vec<u8>>,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f32,
    leading: f32,
    out: String,
    last_baseline: Option<f32>,
}

impl<'a> TextScanner<'a> {
    fn new(page: PageInfo, clip: Rect, fonts: HashMap<Vec<u8>, FontText<'a>>) -> Self {
        Self {
            page,
            clip,
            fonts,
            font: None,
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            out: String::new(),
            last_baseline: None,
        }
    }

    fn step(&mut self, op: &Operation) {
        let num = |i: usize| op.operands.get(i).and_then(|o| o.as_float().ok());
        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(saved) = self.ctm_stack.pop() {
                    self.ctm = saved;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    self.ctm = m.then(&self.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                    self.font = Some(name.to_vec());
                }
                if let Some(size) = num(1) {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let Some(l) = num(0) {
                    self.leading = l;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line();
                if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.next_line();
                if let Some(bytes) = op.operands.get(2).and_then(|o| o.as_str().ok()) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(items) = op.operands.first().and_then(|o| o.as_array().ok()) {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Ok(adjust) = other.as_float() {
                                    self.kern(adjust);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn kern(&mut self, adjust: f32) {
        let tx = -adjust / 1000.0 * self.font_size;
        self.tm = Matrix::translate(tx, 0.0).then(&self.tm);
        if adjust < TJ_SPACE_THRESHOLD && !self.out.ends_with([' ', '\n']) && !self.out.is_empty() {
            let trm = self.tm.then(&self.ctm);
            if self.extent(&trm, 1).intersects(&self.clip) {
                self.out.push(' ');
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self.font.as_ref().and_then(|name| self.fonts.get(name)) {
            Some(font) => font.decode(bytes),
            None => Some(decode_pdf_string(bytes)),
        }
    }

    fn show(&mut self, bytes: &[u8]) {
        let Some(decoded) = self.decode(bytes) else {
            // glyph codes with no text still move the pen
            let advance = (bytes.len() / 2) as f32 * GLYPH_ADVANCE_EM * self.font_size;
            self.tm = Matrix::translate(advance, 0.0).then(&self.tm);
            return;
        };
        let text: String = decoded.chars().filter(|c| !c.is_control()).collect();
        let glyphs = text.chars().count();
        let trm = self.tm.then(&self.ctm);
        let extent = self.extent(&trm, glyphs);

        if !text.is_empty() && extent.intersects(&self.clip) {
            let size = (self.font_size * trm.vertical_scale()).abs().max(1.0);
            if let Some(prev) = self.last_baseline {
                if (prev - extent.y1).abs() > size * 0.5 && !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
            }
            self.out.push_str(&text);
            self.last_baseline = Some(extent.y1);
        }

        let advance = glyphs as f32 * GLYPH_ADVANCE_EM * self.font_size;
        self.tm = Matrix::translate(advance, 0.0).then(&self.tm);
    }

    /// Approximate page-space extent of `glyphs` glyphs shown at `trm`.
    fn extent(&self, trm: &Matrix, glyphs: usize) -> Rect {
        let (x, y) = trm.apply(0.0, 0.0);
        let size = (self.font_size * trm.vertical_scale()).abs().max(1.0);
        let width = glyphs as f32 * GLYPH_ADVANCE_EM * self.font_size.abs() * trm.horizontal_scale();
        self.page
            .to_page([x, y - 0.2 * size, x + width.max(0.1), y + 0.8 * size])
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Fallback for strings whose font gives no usable encoding.  UTF-16BE when
/// it carries a BOM, otherwise each byte is taken as a Latin-1 code point.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
