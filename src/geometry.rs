//! Page-space geometry and the page ↔ canvas mapping.
//!
//! All rectangles stored by the editor live in **page coordinate space**:
//! PDF points with the origin at the top-left corner of the page and `y`
//! growing downwards.  A rendering surface converts with a single scalar
//! [`Zoom`] applied to both axes:
//!
//! ```text
//! canvas = page × zoom          page = canvas ÷ zoom
//! ```
//!
//! # Example
//!
//! ```rust
//! use pdf_retouch::geometry::{Point, Rect, Zoom};
//!
//! let zoom = Zoom::new(1.5);
//! let rect = Rect::new(10.0, 10.0, 50.0, 50.0);
//! assert_eq!(zoom.rect_to_canvas(rect), Rect::new(15.0, 15.0, 75.0, 75.0));
//! assert_eq!(zoom.point_to_page(Point::new(15.0, 30.0)), Point::new(10.0, 20.0));
//! ```

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// A 2-D point.  The coordinate space (page or canvas) is implied by context.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// ---------------------------------------------------------------------------
// Rect
// ---------------------------------------------------------------------------

/// An axis-aligned rectangle given by its four bounds.
///
/// Equality is exact float equality, which is what the edit ledger keys on:
/// two records address the same image only when the engine reported the same
/// bounds for it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build a rectangle from two arbitrary corners (e.g. the press and
    /// release points of a drag), normalising so that `x0 <= x1`, `y0 <= y1`.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x0: a.x.min(b.x),
            y0: a.y.min(b.y),
            x1: a.x.max(b.x),
            y1: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// `true` when all bounds are finite and the rectangle has a positive
    /// area (`x0 < x1` and `y0 < y1`).
    pub fn is_valid(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite())
            && self.x0 < self.x1
            && self.y0 < self.y1
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x0 && p.x <= self.x1 && p.y >= self.y0 && p.y <= self.y1
    }

    /// `true` when the two rectangles share any area or edge.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1 && self.y0 <= other.y1 && other.y0 <= self.y1
    }

    /// Integer pixel bounds `(x0, y0, x1, y1)`, truncated towards zero.
    pub fn to_pixels(&self) -> (i64, i64, i64, i64) {
        (
            self.x0 as i64,
            self.y0 as i64,
            self.x1 as i64,
            self.y1 as i64,
        )
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rect({:.1}, {:.1}, {:.1}, {:.1})",
            self.x0, self.y0, self.x1, self.y1
        )
    }
}

// ---------------------------------------------------------------------------
// Zoom
// ---------------------------------------------------------------------------

/// Scalar page → canvas multiplier.
///
/// Non-finite or non-positive factors are replaced with `1.0` so that the
/// inverse mapping never divides by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom(f32);

impl Zoom {
    pub fn new(factor: f32) -> Self {
        if factor.is_finite() && factor > 0.0 {
            Self(factor)
        } else {
            Self(1.0)
        }
    }

    pub fn factor(&self) -> f32 {
        self.0
    }

    pub fn rect_to_canvas(&self, r: Rect) -> Rect {
        Rect::new(r.x0 * self.0, r.y0 * self.0, r.x1 * self.0, r.y1 * self.0)
    }

    pub fn rect_to_page(&self, r: Rect) -> Rect {
        Rect::new(r.x0 / self.0, r.y0 / self.0, r.x1 / self.0, r.y1 / self.0)
    }

    pub fn point_to_page(&self, p: Point) -> Point {
        Point::new(p.x / self.0, p.y / self.0)
    }

    /// Convert a canvas-space length (e.g. a click tolerance in pixels) to
    /// page space.
    pub fn length_to_page(&self, len: f32) -> f32 {
        len / self.0
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Self(1.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Rect ---

    #[test]
    fn from_corners_normalises_any_drag_direction() {
        let r = Rect::from_corners(Point::new(50.0, 10.0), Point::new(10.0, 40.0));
        assert_eq!(r, Rect::new(10.0, 10.0, 50.0, 40.0));
    }

    #[test]
    fn degenerate_rect_is_invalid() {
        assert!(!Rect::new(10.0, 10.0, 10.0, 20.0).is_valid());
        assert!(!Rect::new(10.0, 30.0, 20.0, 20.0).is_valid());
        assert!(!Rect::new(f32::NAN, 0.0, 1.0, 1.0).is_valid());
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn expanded_grows_every_side() {
        let r = Rect::new(10.0, 10.0, 20.0, 20.0).expanded(2.0);
        assert_eq!(r, Rect::new(8.0, 8.0, 22.0, 22.0));
    }

    #[test]
    fn contains_is_inclusive_on_edges() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains(Point::new(0.0, 10.0)));
        assert!(r.contains(Point::new(5.0, 5.0)));
        assert!(!r.contains(Point::new(10.1, 5.0)));
    }

    #[test]
    fn intersects_detects_overlap_and_separation() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 15.0, 15.0)));
        assert!(!a.intersects(&Rect::new(11.0, 0.0, 20.0, 10.0)));
    }

    // ---- Zoom ---

    #[test]
    fn zoom_round_trips_through_canvas_space() {
        let zoom = Zoom::new(2.0);
        let r = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(zoom.rect_to_page(zoom.rect_to_canvas(r)), r);
    }

    #[test]
    fn zoom_rejects_non_positive_factor() {
        assert_eq!(Zoom::new(0.0).factor(), 1.0);
        assert_eq!(Zoom::new(-3.0).factor(), 1.0);
        assert_eq!(Zoom::new(f32::INFINITY).factor(), 1.0);
    }

    #[test]
    fn length_to_page_divides_by_factor() {
        let zoom = Zoom::new(1.5);
        assert!((zoom.length_to_page(8.0) - 8.0 / 1.5).abs() < f32::EPSILON);
    }
}
