//! Image selection: the current selected rectangle and click hit-testing.

use crate::document::ImageRegion;
use crate::geometry::{Point, Rect, Zoom};

/// At most one selected image rectangle, in page space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Selection {
    rect: Option<Rect>,
}

impl Selection {
    pub fn select(&mut self, rect: Rect) {
        self.rect = Some(rect);
    }

    pub fn clear(&mut self) {
        self.rect = None;
    }

    /// Remove and return the selection.
    pub fn take(&mut self) -> Option<Rect> {
        self.rect.take()
    }

    pub fn rect(&self) -> Option<Rect> {
        self.rect
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_none()
    }
}

/// Find the image under a click.
///
/// `click` is in canvas space.  Each region is grown by `tolerance_px`
/// canvas pixels (converted to page space) before the containment test.
/// Regions are tried in the order the engine reported them; the first hit
/// wins.  Returns the region's unbuffered bounds.
pub fn hit_test(regions: &[ImageRegion], click: Point, zoom: Zoom, tolerance_px: f32) -> Option<Rect> {
    let point = zoom.point_to_page(click);
    let margin = zoom.length_to_page(tolerance_px);
    regions
        .iter()
        .map(|region| region.bbox)
        .find(|bbox| bbox.expanded(margin).contains(point))
}
