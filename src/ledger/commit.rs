//! Save-commit: apply a ledger snapshot to a fresh copy of the document.
//!
//! # Algorithm
//!
//! 1. **Preflight**: decode every replacement image.  Under
//!    [`UnreadableImagePolicy::Abort`] any failure ends the job here with
//!    [`SaveError::ReplacementImages`]; under `Skip` those records are set
//!    aside.
//! 2. Open `source` as a new document (the live document is never touched).
//! 3. For each record in ledger order: skip it if its page does not exist,
//!    otherwise paint its rectangle white and draw the image into it.
//! 4. Save the copy to `destination` (atomic in the engine).
//! 5. Close the copy, whatever happened.
//!
//! A [`SaveJob`] owns everything it needs, so it can run on a blocking pool
//! with its own engine while the session keeps the ledger untouched until
//! the outcome is known.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::UnreadableImagePolicy;
use crate::document::{DocumentEngine, DocumentError, DocumentHandle, FillColor, ReplacementImageError};
use crate::ledger::record::ImageModification;

// ---------------------------------------------------------------------------
// Errors and report
// ---------------------------------------------------------------------------

/// A ledger record whose replacement image failed to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFailure {
    /// Position in the ledger snapshot.
    pub index: usize,
    pub page: usize,
    pub error: ReplacementImageError,
}

impl fmt::Display for ImageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}: {}", self.page + 1, self.error)
    }
}

fn list_failures(failures: &[ImageFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SaveError {
    /// The source document could not be opened as a fresh copy.
    #[error("cannot open {} for saving: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    /// One or more replacement images could not be decoded and the policy
    /// is to abort.
    #[error("{count} replacement image(s) unreadable: {list}", count = .failures.len(), list = list_failures(.failures))]
    ReplacementImages { failures: Vec<ImageFailure> },

    /// The engine rejected a paint or insert on the copy.
    #[error("applying edit on page {} failed: {source}", .page + 1)]
    Apply {
        page: usize,
        #[source]
        source: DocumentError,
    },

    /// Writing the destination file failed.
    #[error("cannot write {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

/// Why a record was left out of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The record's page is beyond the end of the document.
    PageOutOfRange { page_count: usize },
    /// The image failed to decode under [`UnreadableImagePolicy::Skip`].
    UnreadableImage(ReplacementImageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub index: usize,
    pub page: usize,
    pub reason: SkipReason,
}

/// What a successful save did.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub destination: PathBuf,
    pub applied: usize,
    pub skipped: Vec<SkippedRecord>,
}

// ---------------------------------------------------------------------------
// SaveJob
// ---------------------------------------------------------------------------

/// A self-contained save-commit.
#[derive(Debug, Clone)]
pub struct SaveJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub records: Vec<ImageModification>,
    pub policy: UnreadableImagePolicy,
}

impl SaveJob {
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        records: Vec<ImageModification>,
        policy: UnreadableImagePolicy,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            records,
            policy,
        }
    }

    pub fn run(self, engine: &mut dyn DocumentEngine) -> Result<SaveReport, SaveError> {
        let mut skipped = self.preflight()?;

        let doc = engine.open(&self.source).map_err(|source| SaveError::Open {
            path: self.source.clone(),
            source,
        })?;

        let result = self.apply(engine, doc, &mut skipped);
        if let Err(err) = engine.close(doc) {
            log::warn!("save: closing working copy failed: {err}");
        }
        let applied = result?;

        log::info!(
            "save: wrote {} ({} applied, {} skipped)",
            self.destination.display(),
            applied,
            skipped.len()
        );
        Ok(SaveReport {
            destination: self.destination,
            applied,
            skipped,
        })
    }

    /// Decode every replacement image up front.
    fn preflight(&self) -> Result<Vec<SkippedRecord>, SaveError> {
        let failures: Vec<ImageFailure> = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                record.image.load().err().map(|error| ImageFailure {
                    index,
                    page: record.page,
                    error,
                })
            })
            .collect();

        if failures.is_empty() {
            return Ok(Vec::new());
        }
        match self.policy {
            UnreadableImagePolicy::Abort => Err(SaveError::ReplacementImages { failures }),
            UnreadableImagePolicy::Skip => Ok(failures
                .into_iter()
                .map(|f| {
                    log::warn!("save: skipping record {}: {}", f.index, f.error);
                    SkippedRecord {
                        index: f.index,
                        page: f.page,
                        reason: SkipReason::UnreadableImage(f.error),
                    }
                })
                .collect()),
        }
    }

    fn apply(
        &self,
        engine: &mut dyn DocumentEngine,
        doc: DocumentHandle,
        skipped: &mut Vec<SkippedRecord>,
    ) -> Result<usize, SaveError> {
        let page_count = engine.page_count(doc).map_err(|source| SaveError::Open {
            path: self.source.clone(),
            source,
        })?;

        let unreadable: Vec<usize> = skipped.iter().map(|s| s.index).collect();
        let mut applied = 0;

        for (index, record) in self.records.iter().enumerate() {
            if unreadable.contains(&index) {
                continue;
            }
            if record.page >= page_count {
                log::warn!(
                    "save: skipping record {index}: page {} beyond page count {page_count}",
                    record.page
                );
                skipped.push(SkippedRecord {
                    index,
                    page: record.page,
                    reason: SkipReason::PageOutOfRange { page_count },
                });
                continue;
            }

            let apply_err = |source| SaveError::Apply {
                page: record.page,
                source,
            };
            engine
                .paint_rect(doc, record.page, record.rect, FillColor::WHITE)
                .map_err(apply_err)?;
            engine
                .insert_image(doc, record.page, record.rect, &record.image)
                .map_err(apply_err)?;
            applied += 1;
        }

        skipped.sort_by_key(|s| s.index);
        engine
            .save(doc, &self.destination)
            .map_err(|source| SaveError::Persist {
                path: self.destination.clone(),
                source,
            })?;
        Ok(applied)
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::image_ref::png_bytes;
    use crate::document::{ImageRef, MockDocumentEngine, MockOp, MockPage};
    use crate::geometry::Rect;

    fn png() -> ImageRef {
        ImageRef::from_bytes(png_bytes(2, 2, [10, 20, 30, 255]))
    }

    fn broken() -> ImageRef {
        ImageRef::from_bytes(b"not an image".to_vec())
    }

    fn three_pages() -> MockDocumentEngine {
        MockDocumentEngine::new().with_file(
            "in.pdf",
            vec![MockPage::default(), MockPage::default(), MockPage::default()],
        )
    }

    const RECT: Rect = Rect::new(10.0, 10.0, 50.0, 50.0);

    #[test]
    fn applies_paint_then_insert_in_ledger_order() {
        let mut engine = three_pages();
        let records = vec![
            ImageModification::new(1, RECT, png()),
            ImageModification::new(0, RECT, png()),
        ];
        let report = SaveJob::new("in.pdf", "out.pdf", records, UnreadableImagePolicy::Abort)
            .run(&mut engine)
            .expect("save");

        assert_eq!(report.applied, 2);
        assert!(report.skipped.is_empty());
        let saved = engine.file("out.pdf").expect("saved");
        assert_eq!(saved[1].ops, vec![MockOp::Paint(RECT), MockOp::Insert(RECT, png())]);
        assert_eq!(saved[0].ops.len(), 2);
        assert_eq!(engine.open_documents(), 0, "working copy closed");
    }

    #[test]
    fn source_file_is_left_untouched() {
        let mut engine = three_pages();
        SaveJob::new(
            "in.pdf",
            "out.pdf",
            vec![ImageModification::new(0, RECT, png())],
            UnreadableImagePolicy::Abort,
        )
        .run(&mut engine)
        .expect("save");
        assert!(engine.file("in.pdf").expect("source")[0].ops.is_empty());
    }

    #[test]
    fn out_of_range_page_is_skipped_and_save_succeeds() {
        let mut engine = three_pages();
        let records = vec![
            ImageModification::new(5, RECT, png()),
            ImageModification::new(2, RECT, png()),
        ];
        let report = SaveJob::new("in.pdf", "out.pdf", records, UnreadableImagePolicy::Abort)
            .run(&mut engine)
            .expect("save");

        assert_eq!(report.applied, 1);
        assert_eq!(
            report.skipped,
            vec![SkippedRecord {
                index: 0,
                page: 5,
                reason: SkipReason::PageOutOfRange { page_count: 3 },
            }]
        );
        assert_eq!(engine.file("out.pdf").expect("saved")[2].ops.len(), 2);
    }

    // ---- unreadable images ---

    #[test]
    fn abort_policy_lists_every_failure_and_writes_nothing() {
        let mut engine = three_pages();
        let records = vec![
            ImageModification::new(0, RECT, broken()),
            ImageModification::new(1, RECT, png()),
            ImageModification::new(2, RECT, broken()),
        ];
        let err = SaveJob::new("in.pdf", "out.pdf", records, UnreadableImagePolicy::Abort)
            .run(&mut engine)
            .unwrap_err();

        match err {
            SaveError::ReplacementImages { failures } => {
                let indices: Vec<_> = failures.iter().map(|f| f.index).collect();
                assert_eq!(indices, [0, 2]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(engine.file("out.pdf").is_none());
        assert_eq!(engine.open_documents(), 0);
    }

    #[test]
    fn skip_policy_leaves_record_out_entirely() {
        let mut engine = three_pages();
        let records = vec![
            ImageModification::new(0, RECT, broken()),
            ImageModification::new(1, RECT, png()),
        ];
        let report = SaveJob::new("in.pdf", "out.pdf", records, UnreadableImagePolicy::Skip)
            .run(&mut engine)
            .expect("save");

        assert_eq!(report.applied, 1);
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::UnreadableImage(_)
        ));
        let saved = engine.file("out.pdf").expect("saved");
        assert!(saved[0].ops.is_empty(), "no white box without an image");
        assert_eq!(saved[1].ops.len(), 2);
    }

    // ---- failures ---

    #[test]
    fn missing_source_is_open_error() {
        let mut engine = MockDocumentEngine::new();
        let err = SaveJob::new("gone.pdf", "out.pdf", vec![], UnreadableImagePolicy::Abort)
            .run(&mut engine)
            .unwrap_err();
        assert!(matches!(err, SaveError::Open { .. }));
    }

    #[test]
    fn persist_failure_still_closes_copy() {
        let mut engine = three_pages();
        engine.set_fail_save(true);
        let err = SaveJob::new(
            "in.pdf",
            "out.pdf",
            vec![ImageModification::new(0, RECT, png())],
            UnreadableImagePolicy::Abort,
        )
        .run(&mut engine)
        .unwrap_err();

        assert!(matches!(err, SaveError::Persist { .. }));
        assert!(err.to_string().contains("out.pdf"));
        assert_eq!(engine.open_documents(), 0);
    }

    #[test]
    fn replacement_images_error_message_counts_failures() {
        let err = SaveError::ReplacementImages {
            failures: vec![ImageFailure {
                index: 0,
                page: 2,
                error: ReplacementImageError::Unreadable {
                    image: "b.png".into(),
                    reason: "missing".into(),
                },
            }],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("1 replacement image(s)"));
        assert!(msg.contains("page 3") && msg.contains("b.png"));
    }
}
