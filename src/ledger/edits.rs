//! [`EditLedger`]: ordered pending replacements, unique per `(page, rect)`.

use thiserror::Error;

use crate::document::ImageRef;
use crate::geometry::Rect;
use crate::ledger::record::ImageModification;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The source rectangle is degenerate or not finite.
    #[error("invalid source rectangle {0}")]
    InvalidRect(Rect),
}

/// Result of [`EditLedger::add_or_replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new record was appended at this index.
    Inserted(usize),
    /// The existing record at this index had its image swapped.
    Replaced(usize),
}

/// Pending image replacements for the open document, in the order they
/// were first scheduled.
#[derive(Debug, Clone, Default)]
pub struct EditLedger {
    records: Vec<ImageModification>,
}

impl EditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `image` to replace the image at `rect` on `page`.
    ///
    /// A record already targeting the same `(page, rect)` keeps its position
    /// and takes the new image; otherwise the record is appended.
    pub fn add_or_replace(
        &mut self,
        page: usize,
        rect: Rect,
        image: impl Into<ImageRef>,
    ) -> Result<Upsert, LedgerError> {
        if !rect.is_valid() {
            return Err(LedgerError::InvalidRect(rect));
        }
        let image = image.into();

        if let Some(index) = self.records.iter().position(|r| r.targets(page, &rect)) {
            self.records[index].image = image;
            return Ok(Upsert::Replaced(index));
        }
        self.records.push(ImageModification { page, rect, image });
        Ok(Upsert::Inserted(self.records.len() - 1))
    }

    /// Remove every record on `page`; returns how many were removed.
    pub fn clear_page(&mut self, page: usize) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.page != page);
        before - self.records.len()
    }

    pub fn clear_all(&mut self) {
        self.records.clear();
    }

    /// Records on `page`, in ledger order.  The iterator is cheap to clone,
    /// so callers can walk it more than once.
    pub fn records_for_page(
        &self,
        page: usize,
    ) -> impl Iterator<Item = &ImageModification> + Clone + '_ {
        self.records.iter().filter(move |r| r.page == page)
    }

    pub fn records(&self) -> &[ImageModification] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x0: f32, y0: f32, x1: f32, y1: f32) -> Rect {
        Rect::new(x0, y0, x1, y1)
    }

    // ---- add_or_replace ---

    #[test]
    fn same_page_and_rect_replaces_in_place() {
        let mut ledger = EditLedger::new();
        let rect = r(10.0, 10.0, 50.0, 50.0);
        assert_eq!(ledger.add_or_replace(0, rect, "a.png"), Ok(Upsert::Inserted(0)));
        assert_eq!(ledger.add_or_replace(0, rect, "b.png"), Ok(Upsert::Replaced(0)));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.records()[0].image, ImageRef::from("b.png"));
    }

    #[test]
    fn replacement_keeps_ledger_order() {
        let mut ledger = EditLedger::new();
        ledger.add_or_replace(0, r(0.0, 0.0, 1.0, 1.0), "first.png").unwrap();
        ledger.add_or_replace(1, r(0.0, 0.0, 1.0, 1.0), "second.png").unwrap();
        ledger.add_or_replace(0, r(0.0, 0.0, 1.0, 1.0), "first-v2.png").unwrap();

        let labels: Vec<_> = ledger.records().iter().map(|m| m.image.label()).collect();
        assert_eq!(labels, ["first-v2.png", "second.png"]);
    }

    #[test]
    fn same_rect_on_other_page_is_a_new_record() {
        let mut ledger = EditLedger::new();
        let rect = r(10.0, 10.0, 50.0, 50.0);
        ledger.add_or_replace(0, rect, "a.png").unwrap();
        assert_eq!(ledger.add_or_replace(1, rect, "a.png"), Ok(Upsert::Inserted(1)));
    }

    #[test]
    fn degenerate_rect_is_rejected() {
        let mut ledger = EditLedger::new();
        let bad = r(10.0, 10.0, 10.0, 50.0);
        assert_eq!(
            ledger.add_or_replace(0, bad, "a.png"),
            Err(LedgerError::InvalidRect(bad))
        );
        assert!(ledger.is_empty());
    }

    /// Mixed insert/replace sequence: pairs stay unique and the last write
    /// for each pair wins.
    #[test]
    fn pairs_stay_unique_under_mixed_sequence() {
        let mut ledger = EditLedger::new();
        let rects = [r(0.0, 0.0, 5.0, 5.0), r(5.0, 5.0, 9.0, 9.0), r(1.0, 2.0, 3.0, 4.0)];
        let mut last = std::collections::HashMap::new();

        for step in 0..60usize {
            let page = step * 7 % 3;
            let rect_idx = step * 5 % rects.len();
            let name = format!("img-{step}.png");
            ledger
                .add_or_replace(page, rects[rect_idx], name.as_str())
                .unwrap();
            last.insert((page, rect_idx), name);
        }

        assert_eq!(ledger.len(), last.len());
        for ((page, rect_idx), name) in &last {
            let matching: Vec<_> = ledger
                .records()
                .iter()
                .filter(|m| m.targets(*page, &rects[*rect_idx]))
                .collect();
            assert_eq!(matching.len(), 1);
            assert_eq!(matching[0].image.label(), *name);
        }
    }

    // ---- clear_page / clear_all ---

    #[test]
    fn clear_page_removes_only_that_page() {
        let mut ledger = EditLedger::new();
        ledger.add_or_replace(0, r(0.0, 0.0, 1.0, 1.0), "a.png").unwrap();
        ledger.add_or_replace(1, r(0.0, 0.0, 1.0, 1.0), "b.png").unwrap();
        ledger.add_or_replace(0, r(2.0, 2.0, 3.0, 3.0), "c.png").unwrap();
        ledger.add_or_replace(2, r(0.0, 0.0, 1.0, 1.0), "d.png").unwrap();

        assert_eq!(ledger.clear_page(0), 2);
        let labels: Vec<_> = ledger.records().iter().map(|m| m.image.label()).collect();
        assert_eq!(labels, ["b.png", "d.png"]);
        assert_eq!(ledger.clear_page(0), 0);
    }

    #[test]
    fn clear_all_empties() {
        let mut ledger = EditLedger::new();
        ledger.add_or_replace(0, r(0.0, 0.0, 1.0, 1.0), "a.png").unwrap();
        ledger.clear_all();
        assert!(ledger.is_empty());
    }

    // ---- records_for_page ---

    #[test]
    fn records_for_page_is_restartable_and_ordered() {
        let mut ledger = EditLedger::new();
        ledger.add_or_replace(1, r(0.0, 0.0, 1.0, 1.0), "a.png").unwrap();
        ledger.add_or_replace(0, r(0.0, 0.0, 1.0, 1.0), "x.png").unwrap();
        ledger.add_or_replace(1, r(2.0, 2.0, 3.0, 3.0), "b.png").unwrap();

        let iter = ledger.records_for_page(1);
        let first: Vec<_> = iter.clone().map(|m| m.image.label()).collect();
        let second: Vec<_> = iter.map(|m| m.image.label()).collect();
        assert_eq!(first, ["a.png", "b.png"]);
        assert_eq!(first, second);
        assert_eq!(ledger.records_for_page(5).count(), 0);
    }
}
