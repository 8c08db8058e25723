//! Page view: the rendered page plus in-memory previews of pending edits.
//!
//! [`PageView`] owns every bitmap currently on display.  Each
//! [`rebuild`](PageView::rebuild) drops the previous set and decodes the
//! replacement images for the page again, so nothing outlives the render
//! that produced it.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::geometry::{Rect, Zoom};
use crate::ledger::ImageModification;

const PLACEHOLDER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SELECTION_OUTLINE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const DRAG_OUTLINE: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// One overlay bitmap placed on the canvas.
#[derive(Debug, Clone)]
pub struct DisplayedImage {
    /// Canvas-space pixel bounds `(x0, y0, x1, y1)`.
    pub bounds: (i64, i64, i64, i64),
    pub bitmap: RgbaImage,
    /// `true` when the replacement could not be decoded and a white box is
    /// shown instead.
    pub placeholder: bool,
}

#[derive(Debug, Default)]
pub struct PageView {
    base: Option<RgbaImage>,
    overlays: Vec<DisplayedImage>,
    /// Selected image, canvas space.
    selection: Option<Rect>,
    /// In-progress draw gesture, canvas space.
    drag: Option<Rect>,
}

impl PageView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything on display with `base` and overlays for `records`.
    ///
    /// Returns the number of records shown as placeholders.
    pub fn rebuild<'a>(
        &mut self,
        base: RgbaImage,
        records: impl IntoIterator<Item = &'a ImageModification>,
        zoom: Zoom,
    ) -> usize {
        self.overlays.clear();
        self.base = Some(base);

        for record in records {
            let bounds = zoom.rect_to_canvas(record.rect).to_pixels();
            let (x0, y0, x1, y1) = bounds;
            let (w, h) = ((x1 - x0).max(0) as u32, (y1 - y0).max(0) as u32);
            if w == 0 || h == 0 {
                continue;
            }

            let overlay = match record.image.load() {
                Ok(img) => DisplayedImage {
                    bounds,
                    bitmap: imageops::resize(&img.to_rgba8(), w, h, FilterType::Lanczos3),
                    placeholder: false,
                },
                Err(err) => {
                    log::warn!("preview: {err}; showing placeholder");
                    DisplayedImage {
                        bounds,
                        bitmap: RgbaImage::from_pixel(w, h, PLACEHOLDER),
                        placeholder: true,
                    }
                }
            };
            self.overlays.push(overlay);
        }

        self.overlays.iter().filter(|o| o.placeholder).count()
    }

    /// Drop every displayed bitmap.
    pub fn clear(&mut self) {
        self.base = None;
        self.overlays.clear();
        self.selection = None;
        self.drag = None;
    }

    pub fn set_selection(&mut self, canvas_rect: Option<Rect>) {
        self.selection = canvas_rect;
    }

    pub fn set_drag(&mut self, canvas_rect: Option<Rect>) {
        self.drag = canvas_rect;
    }

    pub fn overlays(&self) -> &[DisplayedImage] {
        &self.overlays
    }

    pub fn has_page(&self) -> bool {
        self.base.is_some()
    }

    /// Flatten the page, overlays and outlines into one bitmap.
    pub fn compose(&self) -> Option<RgbaImage> {
        let mut canvas = self.base.clone()?;
        for overlay in &self.overlays {
            imageops::overlay(&mut canvas, &overlay.bitmap, overlay.bounds.0, overlay.bounds.1);
        }
        if let Some(rect) = self.selection {
            outline(&mut canvas, rect, 3, SELECTION_OUTLINE);
        }
        if let Some(rect) = self.drag {
            outline(&mut canvas, rect, 2, DRAG_OUTLINE);
        }
        Some(canvas)
    }
}

/// Stroke `rect` with a border `width` pixels wide, drawn inside the rect.
///
/// Only the part of the rect that overlaps the canvas is visited; edges
/// lying off-canvas are not drawn.
fn outline(canvas: &mut RgbaImage, rect: Rect, width: i64, color: Rgba<u8>) {
    let (x0, y0, x1, y1) = rect.to_pixels();
    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));
    let (cx0, cx1) = (x0.clamp(0, cw), x1.clamp(0, cw));
    let (cy0, cy1) = (y0.clamp(0, ch), y1.clamp(0, ch));
    for y in cy0..cy1 {
        for x in cx0..cx1 {
            let on_edge = x - x0 < width || x1 - 1 - x < width || y - y0 < width || y1 - 1 - y < width;
            if on_edge {
                canvas.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}
