//! A single pending image replacement.

use crate::document::ImageRef;
use crate::geometry::Rect;

/// Replace whatever image occupies `rect` on `page` with `image`.
///
/// `rect` is the source image's bounds as reported by the document engine,
/// in page space.  Together with `page` it is the record's identity in the
/// ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageModification {
    pub page: usize,
    pub rect: Rect,
    pub image: ImageRef,
}

impl ImageModification {
    pub fn new(page: usize, rect: Rect, image: impl Into<ImageRef>) -> Self {
        Self {
            page,
            rect,
            image: image.into(),
        }
    }

    /// `true` when this record addresses the same `(page, rect)` pair.
    pub fn targets(&self, page: usize, rect: &Rect) -> bool {
        self.page == page && self.rect == *rect
    }
}
